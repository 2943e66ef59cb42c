// Database access layer (SQLite via sqlx).

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::engine::session::{ItemEventKind, SessionStatus, SessionStore, StoreError};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Player {
    pub player_id: i64,
    pub username: String,
    pub level: i64,
    pub total_score: i64,
    pub total_games: i64,
    pub highest_score: i64,
    pub register_date: String,
    pub last_login: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct GameSession {
    pub session_id: i64,
    pub player_id: i64,
    pub start_time: String,
    pub end_time: Option<String>,
    pub score: i64,
    pub snake_length: i64,
    pub items_eaten: i64,
    pub special_items_eaten: i64,
    pub duration_secs: Option<i64>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ItemEvent {
    pub event_id: i64,
    pub session_id: i64,
    pub kind: String,
    pub value: i64,
    pub position_x: i64,
    pub position_y: i64,
    pub eaten_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub username: String,
    pub best_score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PlayerStats {
    pub username: String,
    pub level: i64,
    pub total_score: i64,
    pub total_games: i64,
    pub highest_score: i64,
    pub games_played: i64,
    pub avg_score: f64,
    pub best_score: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Achievement {
    pub name: String,
    pub description: String,
    pub score_required: i64,
    pub unlock_date: String,
}

/// Single-session achievements, awarded once per player.
const ACHIEVEMENTS: [(i32, &str, &str); 3] = [
    (100, "Century Scorer", "Reach 100 points in a single session"),
    (200, "Double Century", "Reach 200 points in a single session"),
    (500, "High Five Hundred", "Reach 500 points in a single session"),
];

/// Player level derived from lifetime score.
fn level_for_total_score(total_score: i64) -> i64 {
    match total_score {
        s if s >= 1000 => 5,
        s if s >= 500 => 4,
        s if s >= 200 => 3,
        s if s >= 100 => 2,
        _ => 1,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::WriteFailed(e.to_string())
    }
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        // One connection only: with `sqlite::memory:` every pooled connection
        // would otherwise see its own private database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                player_id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL UNIQUE,
                level INTEGER NOT NULL DEFAULT 1,
                total_score INTEGER NOT NULL DEFAULT 0,
                total_games INTEGER NOT NULL DEFAULT 0,
                highest_score INTEGER NOT NULL DEFAULT 0,
                register_date TEXT NOT NULL DEFAULT (datetime('now')),
                last_login TEXT,
                status TEXT NOT NULL DEFAULT 'ACTIVE'
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS game_sessions (
                session_id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(player_id) ON DELETE CASCADE,
                start_time TEXT NOT NULL DEFAULT (datetime('now')),
                end_time TEXT,
                score INTEGER NOT NULL DEFAULT 0,
                snake_length INTEGER NOT NULL DEFAULT 0,
                items_eaten INTEGER NOT NULL DEFAULT 0,
                special_items_eaten INTEGER NOT NULL DEFAULT 0,
                duration_secs INTEGER,
                status TEXT NOT NULL DEFAULT 'OPEN'
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS item_events (
                event_id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id INTEGER NOT NULL REFERENCES game_sessions(session_id) ON DELETE CASCADE,
                kind TEXT NOT NULL,
                value INTEGER NOT NULL,
                position_x INTEGER NOT NULL,
                position_y INTEGER NOT NULL,
                eaten_time TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS achievements (
                achievement_id INTEGER PRIMARY KEY AUTOINCREMENT,
                player_id INTEGER NOT NULL REFERENCES players(player_id) ON DELETE CASCADE,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                score_required INTEGER NOT NULL DEFAULT 0,
                unlock_date TEXT NOT NULL DEFAULT (datetime('now')),
                UNIQUE(player_id, name)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_config (
                config_key TEXT PRIMARY KEY,
                config_value TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                last_modified TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_player ON game_sessions(player_id)",
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_session ON item_events(session_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            INSERT OR IGNORE INTO system_config (config_key, config_value, description) VALUES
                ('game_speed_ms', '150', 'Tick cadence in milliseconds'),
                ('special_item_lifetime_ms', '5000', 'Special item lifetime in milliseconds')
        "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ── Read queries (API surface) ────────────────────────────────────

    /// Top scores across closed sessions, best session per active player.
    pub async fn get_leaderboard(&self) -> Result<Vec<LeaderboardEntry>, sqlx::Error> {
        sqlx::query_as::<_, LeaderboardEntry>(
            r#"
            SELECT p.username AS username, MAX(s.score) AS best_score
            FROM players p
            JOIN game_sessions s ON s.player_id = p.player_id
            WHERE p.status = 'ACTIVE' AND s.end_time IS NOT NULL
            GROUP BY p.player_id
            ORDER BY best_score DESC
            LIMIT 10
        "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_player(&self, player_id: i64) -> Result<Option<Player>, sqlx::Error> {
        sqlx::query_as::<_, Player>("SELECT * FROM players WHERE player_id = ?")
            .bind(player_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Aggregate statistics over a player's closed sessions.
    pub async fn get_player_stats(
        &self,
        player_id: i64,
    ) -> Result<Option<PlayerStats>, sqlx::Error> {
        sqlx::query_as::<_, PlayerStats>(
            r#"
            SELECT p.username, p.level, p.total_score, p.total_games, p.highest_score,
                   COUNT(s.session_id) AS games_played,
                   COALESCE(AVG(s.score), 0.0) AS avg_score,
                   COALESCE(MAX(s.score), 0) AS best_score
            FROM players p
            LEFT JOIN game_sessions s
                   ON s.player_id = p.player_id AND s.end_time IS NOT NULL
            WHERE p.player_id = ?
            GROUP BY p.player_id
        "#,
        )
        .bind(player_id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn get_player_achievements(
        &self,
        player_id: i64,
    ) -> Result<Vec<Achievement>, sqlx::Error> {
        sqlx::query_as::<_, Achievement>(
            r#"
            SELECT name, description, score_required, unlock_date
            FROM achievements
            WHERE player_id = ?
            ORDER BY unlock_date DESC, achievement_id DESC
        "#,
        )
        .bind(player_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_session(&self, session_id: i64) -> Result<Option<GameSession>, sqlx::Error> {
        sqlx::query_as::<_, GameSession>("SELECT * FROM game_sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn session_item_events(
        &self,
        session_id: i64,
    ) -> Result<Vec<ItemEvent>, sqlx::Error> {
        sqlx::query_as::<_, ItemEvent>(
            "SELECT * FROM item_events WHERE session_id = ? ORDER BY event_id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
    }

    pub async fn get_config(&self, key: &str) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar("SELECT config_value FROM system_config WHERE config_key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO system_config (config_key, config_value, last_modified)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(config_key) DO UPDATE
                SET config_value = excluded.config_value,
                    last_modified = excluded.last_modified
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ── Write path (session lifecycle) ────────────────────────────────────

impl SessionStore for Database {
    /// Registers a username, or touches `last_login` if it already exists.
    async fn create_player(&self, username: &str) -> Result<i64, StoreError> {
        let player_id = sqlx::query_scalar(
            r#"
            INSERT INTO players (username, last_login) VALUES (?, datetime('now'))
            ON CONFLICT(username) DO UPDATE SET last_login = datetime('now')
            RETURNING player_id
        "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;
        Ok(player_id)
    }

    async fn start_session(&self, player_id: i64) -> Result<i64, StoreError> {
        let session_id = sqlx::query_scalar(
            "INSERT INTO game_sessions (player_id) VALUES (?) RETURNING session_id",
        )
        .bind(player_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(session_id)
    }

    /// Closes a session exactly once and folds its result into the player's
    /// lifetime aggregates, atomically. Closing an already-closed session is
    /// an error.
    async fn end_session(
        &self,
        session_id: i64,
        score: i32,
        snake_length: i32,
        items_eaten: i32,
        special_items_eaten: i32,
        status: SessionStatus,
    ) -> Result<(), StoreError> {
        // One transaction: a session must never end up closed without its
        // score folded into the player aggregates.
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE game_sessions
            SET end_time = datetime('now'),
                score = ?,
                snake_length = ?,
                items_eaten = ?,
                special_items_eaten = ?,
                duration_secs = CAST(strftime('%s', 'now') AS INTEGER)
                              - CAST(strftime('%s', start_time) AS INTEGER),
                status = ?
            WHERE session_id = ? AND end_time IS NULL
        "#,
        )
        .bind(score)
        .bind(snake_length)
        .bind(items_eaten)
        .bind(special_items_eaten)
        .bind(status.as_str())
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::WriteFailed(format!(
                "session {session_id} is unknown or already closed"
            )));
        }

        sqlx::query(
            r#"
            UPDATE players
            SET total_score = total_score + ?,
                total_games = total_games + 1,
                highest_score = MAX(highest_score, ?)
            WHERE player_id = (SELECT player_id FROM game_sessions WHERE session_id = ?)
        "#,
        )
        .bind(score)
        .bind(score)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        let total_score: i64 = sqlx::query_scalar(
            r#"
            SELECT total_score FROM players
            WHERE player_id = (SELECT player_id FROM game_sessions WHERE session_id = ?)
        "#,
        )
        .bind(session_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            UPDATE players SET level = ?
            WHERE player_id = (SELECT player_id FROM game_sessions WHERE session_id = ?)
        "#,
        )
        .bind(level_for_total_score(total_score))
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn record_item_event(
        &self,
        session_id: i64,
        kind: ItemEventKind,
        value: i32,
        x: i32,
        y: i32,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO item_events (session_id, kind, value, position_x, position_y)
            VALUES (?, ?, ?, ?, ?)
        "#,
        )
        .bind(session_id)
        .bind(kind.as_str())
        .bind(value)
        .bind(x)
        .bind(y)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Awards every achievement whose threshold the session score reached.
    /// The UNIQUE(player_id, name) constraint makes re-evaluation idempotent.
    async fn evaluate_achievements(&self, session_id: i64, score: i32) -> Result<(), StoreError> {
        let player_id: i64 =
            sqlx::query_scalar("SELECT player_id FROM game_sessions WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await?;

        for (threshold, name, description) in ACHIEVEMENTS {
            if score < threshold {
                continue;
            }
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO achievements (player_id, name, description, score_required)
                VALUES (?, ?, ?, ?)
            "#,
            )
            .bind(player_id)
            .bind(name)
            .bind(description)
            .bind(threshold)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_create_player_is_idempotent_per_username() {
        let db = test_db().await;
        let id1 = db.create_player("alice").await.unwrap();
        let id2 = db.create_player("alice").await.unwrap();
        assert_eq!(id1, id2);

        let id3 = db.create_player("bob").await.unwrap();
        assert_ne!(id1, id3);

        let player = db.get_player(id1).await.unwrap().unwrap();
        assert_eq!(player.username, "alice");
        assert_eq!(player.level, 1);
        assert_eq!(player.status, "ACTIVE");
        assert!(player.last_login.is_some());
    }

    #[tokio::test]
    async fn test_session_lifecycle_updates_aggregates() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();
        let session_id = db.start_session(player_id).await.unwrap();

        let open = db.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(open.status, "OPEN");
        assert!(open.end_time.is_none());

        db.end_session(session_id, 42, 10, 12, 6, SessionStatus::Failed)
            .await
            .unwrap();

        let closed = db.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(closed.status, "FAILED");
        assert_eq!(closed.score, 42);
        assert_eq!(closed.snake_length, 10);
        assert_eq!(closed.items_eaten, 12);
        assert_eq!(closed.special_items_eaten, 6);
        assert!(closed.end_time.is_some());
        assert!(closed.duration_secs.is_some());

        let player = db.get_player(player_id).await.unwrap().unwrap();
        assert_eq!(player.total_score, 42);
        assert_eq!(player.total_games, 1);
        assert_eq!(player.highest_score, 42);
        assert_eq!(player.level, 1);
    }

    #[tokio::test]
    async fn test_double_close_is_rejected() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();
        let session_id = db.start_session(player_id).await.unwrap();

        db.end_session(session_id, 10, 5, 10, 0, SessionStatus::Completed)
            .await
            .unwrap();
        let err = db
            .end_session(session_id, 99, 9, 99, 9, SessionStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));

        // The rejected close left no trace: session row and aggregates are
        // exactly what the first close wrote
        let session = db.get_session(session_id).await.unwrap().unwrap();
        assert_eq!(session.score, 10);
        assert_eq!(session.status, "COMPLETED");
        let player = db.get_player(player_id).await.unwrap().unwrap();
        assert_eq!(player.total_games, 1);
        assert_eq!(player.total_score, 10);
        assert_eq!(player.highest_score, 10);
    }

    #[tokio::test]
    async fn test_level_follows_lifetime_score() {
        assert_eq!(level_for_total_score(0), 1);
        assert_eq!(level_for_total_score(99), 1);
        assert_eq!(level_for_total_score(100), 2);
        assert_eq!(level_for_total_score(200), 3);
        assert_eq!(level_for_total_score(500), 4);
        assert_eq!(level_for_total_score(999), 4);
        assert_eq!(level_for_total_score(1000), 5);

        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();

        let s1 = db.start_session(player_id).await.unwrap();
        db.end_session(s1, 150, 20, 30, 12, SessionStatus::Failed)
            .await
            .unwrap();
        assert_eq!(db.get_player(player_id).await.unwrap().unwrap().level, 2);

        let s2 = db.start_session(player_id).await.unwrap();
        db.end_session(s2, 400, 40, 80, 32, SessionStatus::Failed)
            .await
            .unwrap();
        let player = db.get_player(player_id).await.unwrap().unwrap();
        assert_eq!(player.total_score, 550);
        assert_eq!(player.level, 4);
        assert_eq!(player.highest_score, 400);
    }

    #[tokio::test]
    async fn test_item_events_are_recorded_in_order() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();
        let session_id = db.start_session(player_id).await.unwrap();

        db.record_item_event(session_id, ItemEventKind::Normal, 1, 100, 200)
            .await
            .unwrap();
        db.record_item_event(session_id, ItemEventKind::Big, 5, 300, 400)
            .await
            .unwrap();

        let events = db.session_item_events(session_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, "NORMAL");
        assert_eq!(events[0].value, 1);
        assert_eq!(events[0].position_x, 100);
        assert_eq!(events[1].kind, "BIG");
        assert_eq!(events[1].value, 5);
        assert_eq!(events[1].position_y, 400);
    }

    #[tokio::test]
    async fn test_achievements_unlock_once() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();
        let session_id = db.start_session(player_id).await.unwrap();

        db.evaluate_achievements(session_id, 250).await.unwrap();
        let unlocked = db.get_player_achievements(player_id).await.unwrap();
        assert_eq!(unlocked.len(), 2);
        assert!(unlocked.iter().any(|a| a.name == "Century Scorer"));
        assert!(unlocked.iter().any(|a| a.name == "Double Century"));

        // Re-evaluating the same thresholds adds nothing
        db.evaluate_achievements(session_id, 250).await.unwrap();
        assert_eq!(db.get_player_achievements(player_id).await.unwrap().len(), 2);

        // A later, higher score unlocks only the missing tier
        let s2 = db.start_session(player_id).await.unwrap();
        db.evaluate_achievements(s2, 600).await.unwrap();
        let unlocked = db.get_player_achievements(player_id).await.unwrap();
        assert_eq!(unlocked.len(), 3);
        assert!(unlocked.iter().any(|a| a.name == "High Five Hundred"));
    }

    #[tokio::test]
    async fn test_achievement_below_threshold_unlocks_nothing() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();
        let session_id = db.start_session(player_id).await.unwrap();

        db.evaluate_achievements(session_id, 99).await.unwrap();
        assert!(db.get_player_achievements(player_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_leaderboard_orders_and_limits() {
        let db = test_db().await;

        for i in 0..12 {
            let player_id = db.create_player(&format!("player{i}")).await.unwrap();
            let session_id = db.start_session(player_id).await.unwrap();
            db.end_session(session_id, i * 10, 5, 10, 0, SessionStatus::Failed)
                .await
                .unwrap();
        }

        let board = db.get_leaderboard().await.unwrap();
        assert_eq!(board.len(), 10);
        assert_eq!(board[0].username, "player11");
        assert_eq!(board[0].best_score, 110);
        for pair in board.windows(2) {
            assert!(pair[0].best_score >= pair[1].best_score);
        }
    }

    #[tokio::test]
    async fn test_leaderboard_takes_best_session_and_skips_open_ones() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();

        let s1 = db.start_session(player_id).await.unwrap();
        db.end_session(s1, 30, 5, 10, 0, SessionStatus::Failed)
            .await
            .unwrap();
        let s2 = db.start_session(player_id).await.unwrap();
        db.end_session(s2, 80, 9, 20, 5, SessionStatus::Failed)
            .await
            .unwrap();
        // Open session with default score 0 must not appear
        db.start_session(player_id).await.unwrap();

        let board = db.get_leaderboard().await.unwrap();
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].best_score, 80);
    }

    #[tokio::test]
    async fn test_player_stats_aggregate_closed_sessions() {
        let db = test_db().await;
        let player_id = db.create_player("alice").await.unwrap();

        assert!(db.get_player_stats(999).await.unwrap().is_none());

        // No sessions yet: zeroed aggregates
        let stats = db.get_player_stats(player_id).await.unwrap().unwrap();
        assert_eq!(stats.games_played, 0);
        assert_eq!(stats.avg_score, 0.0);
        assert_eq!(stats.best_score, 0);

        let s1 = db.start_session(player_id).await.unwrap();
        db.end_session(s1, 20, 5, 15, 1, SessionStatus::Failed)
            .await
            .unwrap();
        let s2 = db.start_session(player_id).await.unwrap();
        db.end_session(s2, 40, 8, 30, 2, SessionStatus::Failed)
            .await
            .unwrap();
        // Still open, excluded from the aggregates
        db.start_session(player_id).await.unwrap();

        let stats = db.get_player_stats(player_id).await.unwrap().unwrap();
        assert_eq!(stats.username, "alice");
        assert_eq!(stats.games_played, 2);
        assert_eq!(stats.avg_score, 30.0);
        assert_eq!(stats.best_score, 40);
        assert_eq!(stats.total_score, 60);
        assert_eq!(stats.total_games, 2);
        assert_eq!(stats.highest_score, 40);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let db = test_db().await;
        assert_eq!(
            db.get_config("game_speed_ms").await.unwrap().as_deref(),
            Some("150")
        );
        assert!(db.get_config("missing").await.unwrap().is_none());

        db.set_config("game_speed_ms", "100").await.unwrap();
        assert_eq!(
            db.get_config("game_speed_ms").await.unwrap().as_deref(),
            Some("100")
        );
    }
}
