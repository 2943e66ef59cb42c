use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use super::config::*;
use super::item::Item;

/// A grid-aligned position in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Point { x, y }
    }
}

/// Movement direction of the snake head.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// Unit step in pixel coordinates.
    fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -CELL),
            Direction::Down => (0, CELL),
            Direction::Left => (-CELL, 0),
            Direction::Right => (CELL, 0),
        }
    }
}

/// The player-controlled snake: ordered body (head first), direction, score
/// and growth state. All mutation happens inside one tick's synchronous
/// sequence; the controller owns the only instance.
pub struct Snake {
    /// Head is the front element. Never empty after construction.
    body: VecDeque<Point>,
    direction: Direction,
    score: i32,
    pending_growth: bool,
    /// Mirror of `body.len()`, advanced on growth events.
    length: usize,
    /// Consumptions since the last special-item expiry. Every 4th consumption
    /// makes a special item eligible to spawn.
    special_trigger: u32,
}

impl Snake {
    pub fn new() -> Self {
        let mut snake = Snake {
            body: VecDeque::new(),
            direction: Direction::Right,
            score: 0,
            pending_growth: false,
            length: 0,
            special_trigger: 0,
        };
        snake.reset();
        snake
    }

    /// Restore the fixed initial configuration. Only called between sessions.
    pub fn reset(&mut self) {
        self.body.clear();
        for i in 0..INITIAL_LENGTH as i32 {
            self.body
                .push_back(Point::new(START_X - i * CELL, START_Y));
        }
        self.direction = Direction::Right;
        self.score = 0;
        self.pending_growth = false;
        self.length = INITIAL_LENGTH;
        self.special_trigger = 0;
    }

    /// Commit a direction change. A change to the exact opposite of the
    /// current direction is ignored; anything else is accepted.
    pub fn set_direction(&mut self, dir: Direction) {
        if dir == self.direction.opposite() {
            return;
        }
        self.direction = dir;
    }

    /// Advance one cell in the current direction. The new head is inserted at
    /// the front; the tail is dropped unless a growth is pending, in which
    /// case the flag clears and the body nets one extra segment.
    pub fn advance(&mut self) {
        let (dx, dy) = self.direction.delta();
        let head = self.head();
        self.body.push_front(Point::new(head.x + dx, head.y + dy));

        if self.pending_growth {
            self.pending_growth = false;
            self.length += 1;
        } else {
            self.body.pop_back();
        }
    }

    /// True when the head has left the playable area or sits on another
    /// body segment. Checked once per tick, after `advance`.
    pub fn is_defeated(&self) -> bool {
        let head = self.head();
        if head.x < 0 || head.x >= WIDTH || head.y < 0 || head.y >= HEIGHT {
            return true;
        }
        self.body.iter().skip(1).any(|&seg| seg == head)
    }

    /// Try to consume the given item. Succeeds iff the head sits on it:
    /// the item's value is added to the score, the trigger counter advances
    /// and a growth is marked for the next `advance`. Callers must call this
    /// at most once per distinct item per tick.
    pub fn consume(&mut self, item: &Item) -> bool {
        if item.pos != self.head() {
            return false;
        }
        self.score += item.value();
        self.special_trigger += 1;
        self.pending_growth = true;
        true
    }

    /// All cells covered by the body, for placement checks.
    pub fn occupancy(&self) -> HashSet<Point> {
        self.body.iter().copied().collect()
    }

    pub fn head(&self) -> Point {
        *self.body.front().expect("snake body is never empty")
    }

    pub fn segments(&self) -> Vec<Point> {
        self.body.iter().copied().collect()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn special_trigger(&self) -> u32 {
        self.special_trigger
    }

    /// Reset the consumption counter after a special item expires unclaimed.
    pub fn reset_special_trigger(&mut self) {
        self.special_trigger = 0;
    }
}

impl Default for Snake {
    fn default() -> Self {
        Snake::new()
    }
}
