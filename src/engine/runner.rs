use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::info;

use crate::metrics::{ACTIVE_SESSIONS, TICK_DURATION_MS};

use super::config::TICK_MS;
use super::item::Item;
use super::session::{SessionController, SessionState, SessionStore};
use super::snake::{Direction, Point};

/// Control messages sent from API handlers into the tick loop.
#[derive(Clone, Copy, Debug)]
pub enum SessionCommand {
    SetDirection(Direction),
    Restart,
    Quit,
}

#[derive(Clone, Debug, Serialize)]
pub struct ItemSnapshot {
    pub x: i32,
    pub y: i32,
    pub kind: &'static str,
    pub value: i32,
}

impl From<Item> for ItemSnapshot {
    fn from(item: Item) -> Self {
        ItemSnapshot {
            x: item.pos.x,
            y: item.pos.y,
            kind: item.kind_label(),
            value: item.value(),
        }
    }
}

/// Read-only view of the simulation published after every tick.
#[derive(Clone, Debug, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub score: i32,
    pub length: usize,
    pub head: Point,
    pub body: Vec<Point>,
    pub items: Vec<ItemSnapshot>,
    pub items_eaten: i32,
    pub special_items_eaten: i32,
    pub session_id: Option<i64>,
    pub started_at: String,
}

/// Drives one `SessionController` at the fixed tick cadence. Commands arrive
/// over an mpsc channel and are drained once per tick; the latest snapshot is
/// published over a watch channel so any number of readers can observe it
/// without touching the simulation.
pub struct SessionRunner<S: SessionStore> {
    controller: SessionController<S>,
    commands: mpsc::Receiver<SessionCommand>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    started_at: String,
}

impl<S: SessionStore> SessionRunner<S> {
    pub fn new(
        controller: SessionController<S>,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> (Self, watch::Receiver<SessionSnapshot>) {
        let started_at = chrono::Utc::now().to_rfc3339();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(snapshot_of(&controller, started_at.clone()));
        let runner = SessionRunner {
            controller,
            commands,
            snapshot_tx,
            started_at,
        };
        (runner, snapshot_rx)
    }

    pub async fn run(mut self) {
        ACTIVE_SESSIONS.set(1);
        let mut ticker = interval(Duration::from_millis(TICK_MS));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        'main: loop {
            ticker.tick().await;

            loop {
                match self.commands.try_recv() {
                    Ok(SessionCommand::SetDirection(dir)) => self.controller.set_direction(dir),
                    Ok(SessionCommand::Restart) => {
                        self.controller.restart().await;
                        self.started_at = chrono::Utc::now().to_rfc3339();
                    }
                    Ok(SessionCommand::Quit) => break 'main,
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break 'main,
                }
            }

            let tick_start = Instant::now();
            self.controller.tick(tick_start).await;
            TICK_DURATION_MS.observe(tick_start.elapsed().as_secs_f64() * 1000.0);

            self.publish();
        }

        info!("session runner shutting down");
        self.controller.close_paused().await;
        self.publish();
        ACTIVE_SESSIONS.set(0);
    }

    fn publish(&self) {
        // Receivers may all be gone during shutdown; that is fine.
        let _ = self
            .snapshot_tx
            .send(snapshot_of(&self.controller, self.started_at.clone()));
    }
}

fn snapshot_of<S: SessionStore>(
    controller: &SessionController<S>,
    started_at: String,
) -> SessionSnapshot {
    let snake = controller.snake();
    SessionSnapshot {
        state: controller.state(),
        score: snake.score(),
        length: snake.length(),
        head: snake.head(),
        body: snake.segments(),
        items: controller.items().into_iter().map(Into::into).collect(),
        items_eaten: controller.normal_eaten(),
        special_items_eaten: controller.special_eaten(),
        session_id: controller.session_id(),
        started_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::session::{ItemEventKind, SessionStatus, StoreError};
    use crate::engine::spawner::Spawner;

    struct NullStore;

    impl SessionStore for NullStore {
        async fn create_player(&self, _username: &str) -> Result<i64, StoreError> {
            Ok(1)
        }
        async fn start_session(&self, _player_id: i64) -> Result<i64, StoreError> {
            Ok(1)
        }
        async fn end_session(
            &self,
            _session_id: i64,
            _score: i32,
            _snake_length: i32,
            _items_eaten: i32,
            _special_items_eaten: i32,
            _status: SessionStatus,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn record_item_event(
            &self,
            _session_id: i64,
            _kind: ItemEventKind,
            _value: i32,
            _x: i32,
            _y: i32,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn evaluate_achievements(
            &self,
            _session_id: i64,
            _score: i32,
        ) -> Result<(), StoreError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_runner_ticks_and_quits() {
        let controller = SessionController::start(NullStore, 1, Spawner::new(Some(5))).await;
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (runner, snapshots) = SessionRunner::new(controller, commands_rx);

        assert_eq!(snapshots.borrow().head, Point::new(40, 60));

        let handle = tokio::spawn(runner.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(snapshots.borrow().session_id, Some(1));
        commands_tx.send(SessionCommand::Quit).await.unwrap();
        handle.await.unwrap();

        // At 150ms per tick the snake has moved at least twice in 500ms
        let snapshot = snapshots.borrow();
        assert!(snapshot.head.x >= 80, "head at {:?}", snapshot.head);
        // Shutdown closes the session; the final snapshot reflects that
        assert_eq!(snapshot.session_id, None);
    }

    #[tokio::test]
    async fn test_runner_applies_direction_commands() {
        let controller = SessionController::start(NullStore, 1, Spawner::new(Some(6))).await;
        let (commands_tx, commands_rx) = mpsc::channel(8);
        let (runner, snapshots) = SessionRunner::new(controller, commands_rx);

        commands_tx
            .send(SessionCommand::SetDirection(Direction::Down))
            .await
            .unwrap();
        let handle = tokio::spawn(runner.run());
        tokio::time::sleep(Duration::from_millis(500)).await;
        commands_tx.send(SessionCommand::Quit).await.unwrap();
        handle.await.unwrap();

        let snapshot = snapshots.borrow();
        assert_eq!(snapshot.head.x, 40);
        assert!(snapshot.head.y > 60, "head at {:?}", snapshot.head);
    }
}
