use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::metrics::{
    ITEMS_EATEN_TOTAL, SESSIONS_ENDED_TOTAL, SESSIONS_STARTED_TOTAL, STORE_WRITE_FAILURES_TOTAL,
};

use super::item::Item;
use super::snake::{Direction, Snake};
use super::spawner::Spawner;

/// Terminal status a session is closed with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Completed,
    Failed,
    Paused,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Failed => "FAILED",
            SessionStatus::Paused => "PAUSED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemEventKind {
    Normal,
    Big,
}

impl ItemEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemEventKind::Normal => "NORMAL",
            ItemEventKind::Big => "BIG",
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store write failed: {0}")]
    WriteFailed(String),
}

/// Persistence boundary for the session lifecycle. The simulation only ever
/// writes through this trait; reads for the API go straight to the database.
#[allow(async_fn_in_trait)]
pub trait SessionStore {
    async fn create_player(&self, username: &str) -> Result<i64, StoreError>;
    async fn start_session(&self, player_id: i64) -> Result<i64, StoreError>;
    #[allow(clippy::too_many_arguments)]
    async fn end_session(
        &self,
        session_id: i64,
        score: i32,
        snake_length: i32,
        items_eaten: i32,
        special_items_eaten: i32,
        status: SessionStatus,
    ) -> Result<(), StoreError>;
    async fn record_item_event(
        &self,
        session_id: i64,
        kind: ItemEventKind,
        value: i32,
        x: i32,
        y: i32,
    ) -> Result<(), StoreError>;
    async fn evaluate_achievements(&self, session_id: i64, score: i32) -> Result<(), StoreError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    GameOver,
}

/// Owns the whole simulation for one player: snake, items, spawner and the
/// open session row. Driven by `tick` at a fixed cadence; direction changes
/// arrive between ticks and are applied at the start of the next one.
///
/// Store failures are logged and counted but never stop the simulation.
pub struct SessionController<S: SessionStore> {
    store: S,
    player_id: i64,
    session_id: Option<i64>,
    snake: Snake,
    spawner: Spawner,
    normal_item: Option<Item>,
    special_item: Option<Item>,
    pending_direction: Option<Direction>,
    state: SessionState,
    normal_eaten: i32,
    special_eaten: i32,
}

impl<S: SessionStore> SessionController<S> {
    pub async fn start(store: S, player_id: i64, spawner: Spawner) -> Self {
        let mut controller = SessionController {
            store,
            player_id,
            session_id: None,
            snake: Snake::new(),
            spawner,
            normal_item: None,
            special_item: None,
            pending_direction: None,
            state: SessionState::Running,
            normal_eaten: 0,
            special_eaten: 0,
        };
        controller.open_session().await;
        controller.ensure_normal_item();
        controller
    }

    /// Queue a direction change for the next tick. The last change before a
    /// tick wins.
    pub fn set_direction(&mut self, dir: Direction) {
        self.pending_direction = Some(dir);
    }

    /// Advance the simulation by one step. `now` is injected so expiry can be
    /// tested without waiting out real time.
    pub async fn tick(&mut self, now: Instant) {
        if self.state != SessionState::Running {
            return;
        }

        if let Some(dir) = self.pending_direction.take() {
            self.snake.set_direction(dir);
        }

        self.expire_special(now);
        self.try_consume().await;
        self.snake.advance();

        if self.snake.is_defeated() {
            self.state = SessionState::GameOver;
            info!(
                score = self.snake.score(),
                length = self.snake.length(),
                "session over"
            );
            self.close_session(SessionStatus::Failed).await;
            return;
        }

        self.maybe_spawn_special(now);
        self.ensure_normal_item();
    }

    /// Begin a fresh session after a defeat. No-op while one is running.
    pub async fn restart(&mut self) {
        if self.state != SessionState::GameOver {
            return;
        }
        self.snake.reset();
        self.normal_item = None;
        self.special_item = None;
        self.pending_direction = None;
        self.normal_eaten = 0;
        self.special_eaten = 0;
        self.state = SessionState::Running;
        self.open_session().await;
        self.ensure_normal_item();
    }

    /// Close the open session as interrupted, for shutdown paths.
    pub async fn close_paused(&mut self) {
        if self.state == SessionState::Running {
            self.state = SessionState::GameOver;
            self.close_session(SessionStatus::Paused).await;
        }
    }

    async fn open_session(&mut self) {
        match self.store.start_session(self.player_id).await {
            Ok(session_id) => {
                info!(session_id, player_id = self.player_id, "session started");
                SESSIONS_STARTED_TOTAL.inc();
                self.session_id = Some(session_id);
            }
            Err(e) => {
                warn!("failed to open session: {e}");
                STORE_WRITE_FAILURES_TOTAL.inc();
                self.session_id = None;
            }
        }
    }

    async fn close_session(&mut self, status: SessionStatus) {
        let Some(session_id) = self.session_id.take() else {
            return;
        };
        let score = self.snake.score();
        if let Err(e) = self
            .store
            .end_session(
                session_id,
                score,
                self.snake.length() as i32,
                self.normal_eaten,
                self.special_eaten,
                status,
            )
            .await
        {
            warn!(session_id, "failed to close session: {e}");
            STORE_WRITE_FAILURES_TOTAL.inc();
            return;
        }
        SESSIONS_ENDED_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();

        if let Err(e) = self.store.evaluate_achievements(session_id, score).await {
            warn!(session_id, "achievement evaluation failed: {e}");
            STORE_WRITE_FAILURES_TOTAL.inc();
        }
    }

    /// Remove an expired special item. The consumption counter resets so the
    /// next special needs four fresh consumptions.
    fn expire_special(&mut self, now: Instant) {
        if let Some(item) = self.special_item {
            if item.should_expire(now) {
                info!("special item expired");
                self.special_item = None;
                self.snake.reset_special_trigger();
            }
        }
    }

    async fn try_consume(&mut self) {
        if let Some(item) = self.normal_item {
            if self.snake.consume(&item) {
                self.normal_item = None;
                self.normal_eaten += 1;
                ITEMS_EATEN_TOTAL.with_label_values(&["normal"]).inc();
                self.record_event(ItemEventKind::Normal, &item).await;
                return;
            }
        }
        if let Some(item) = self.special_item {
            if self.snake.consume(&item) {
                self.special_item = None;
                self.special_eaten += 1;
                ITEMS_EATEN_TOTAL.with_label_values(&["special"]).inc();
                self.record_event(ItemEventKind::Big, &item).await;
            }
        }
    }

    async fn record_event(&mut self, kind: ItemEventKind, item: &Item) {
        let Some(session_id) = self.session_id else {
            return;
        };
        if let Err(e) = self
            .store
            .record_item_event(session_id, kind, item.value(), item.pos.x, item.pos.y)
            .await
        {
            warn!(session_id, "failed to record item event: {e}");
            STORE_WRITE_FAILURES_TOTAL.inc();
        }
    }

    /// Spawn a special item once the consumption counter reaches a multiple
    /// of the trigger interval. Consuming the special bumps the counter off
    /// the multiple, so it cannot re-trigger until four more consumptions.
    fn maybe_spawn_special(&mut self, now: Instant) {
        let trigger = self.snake.special_trigger();
        if trigger == 0
            || trigger % super::config::SPECIAL_TRIGGER_INTERVAL != 0
            || self.special_item.is_some()
        {
            return;
        }
        match self.spawner.place(&self.occupied_cells()) {
            Ok(pos) => {
                info!(x = pos.x, y = pos.y, "special item spawned");
                self.special_item = Some(Item::special(pos, now));
            }
            Err(e) => warn!("could not place special item: {e}"),
        }
    }

    /// Keep exactly one normal item on the grid while no special is up.
    /// Retried every tick, so a failed placement heals once cells free up.
    fn ensure_normal_item(&mut self) {
        if self.normal_item.is_some() || self.special_item.is_some() {
            return;
        }
        match self.spawner.place(&self.occupied_cells()) {
            Ok(pos) => self.normal_item = Some(Item::normal(pos)),
            Err(e) => warn!("could not place normal item: {e}"),
        }
    }

    fn occupied_cells(&self) -> HashSet<super::snake::Point> {
        let mut occupied = self.snake.occupancy();
        if let Some(item) = self.normal_item {
            occupied.insert(item.pos);
        }
        if let Some(item) = self.special_item {
            occupied.insert(item.pos);
        }
        occupied
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snake(&self) -> &Snake {
        &self.snake
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    pub fn items(&self) -> Vec<Item> {
        self.normal_item
            .iter()
            .chain(self.special_item.iter())
            .copied()
            .collect()
    }

    pub fn normal_eaten(&self) -> i32 {
        self.normal_eaten
    }

    pub fn special_eaten(&self) -> i32 {
        self.special_eaten
    }
}
