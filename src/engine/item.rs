use std::time::{Duration, Instant};

use super::config::{NORMAL_ITEM_VALUE, SPECIAL_ITEM_LIFETIME_MS, SPECIAL_ITEM_VALUE};
use super::snake::Point;

/// Item variants. A special item carries its spawn instant for expiry checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    Normal,
    Special { spawned_at: Instant },
}

/// A consumable item occupying one grid cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Item {
    pub pos: Point,
    pub kind: ItemKind,
}

impl Item {
    pub fn normal(pos: Point) -> Self {
        Item {
            pos,
            kind: ItemKind::Normal,
        }
    }

    pub fn special(pos: Point, spawned_at: Instant) -> Self {
        Item {
            pos,
            kind: ItemKind::Special { spawned_at },
        }
    }

    /// Score granted on consumption.
    pub fn value(&self) -> i32 {
        match self.kind {
            ItemKind::Normal => NORMAL_ITEM_VALUE,
            ItemKind::Special { .. } => SPECIAL_ITEM_VALUE,
        }
    }

    /// True once a special item has outlived its fixed lifetime. Normal items
    /// never expire.
    pub fn should_expire(&self, now: Instant) -> bool {
        match self.kind {
            ItemKind::Normal => false,
            ItemKind::Special { spawned_at } => {
                now.duration_since(spawned_at) > Duration::from_millis(SPECIAL_ITEM_LIFETIME_MS)
            }
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            ItemKind::Normal => "normal",
            ItemKind::Special { .. } => "special",
        }
    }
}
