// HTTP API routes (session view, controls, leaderboard, player stats).

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::db::Database;
use crate::engine::runner::{SessionCommand, SessionSnapshot};
use crate::engine::snake::Direction;
use crate::metrics;

// ── Request types ─────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct DirectionRequest {
    pub direction: Direction,
}

// ── Shared application state ─────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub commands: mpsc::Sender<SessionCommand>,
    pub snapshot: watch::Receiver<SessionSnapshot>,
}

// ── Error helper ──────────────────────────────────────────────────────

fn json_error(status: StatusCode, msg: &str) -> impl IntoResponse {
    (status, Json(json!({ "error": msg })))
}

fn internal_error(e: sqlx::Error) -> impl IntoResponse {
    tracing::error!("Database error: {e}");
    json_error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
}

// ── Router ────────────────────────────────────────────────────────────

pub fn router(
    db: Arc<Database>,
    commands: mpsc::Sender<SessionCommand>,
    snapshot: watch::Receiver<SessionSnapshot>,
) -> Router {
    let state = AppState {
        db,
        commands,
        snapshot,
    };

    Router::new()
        // Session view and controls
        .route("/api/game", get(get_game))
        .route("/api/game/direction", post(set_direction))
        .route("/api/game/restart", post(restart_game))
        // Persistence reads
        .route("/api/leaderboard", get(get_leaderboard))
        .route("/api/players/{id}", get(get_player))
        .route("/api/players/{id}/stats", get(get_player_stats))
        .route("/api/players/{id}/achievements", get(get_player_achievements))
        // Observability
        .route("/metrics", get(get_metrics))
        .with_state(state)
}

// ── Session handlers ──────────────────────────────────────────────────

async fn get_game(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    (StatusCode::OK, Json(json!(snapshot)))
}

async fn set_direction(
    State(state): State<AppState>,
    Json(req): Json<DirectionRequest>,
) -> impl IntoResponse {
    match state
        .commands
        .send(SessionCommand::SetDirection(req.direction))
        .await
    {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "ok" }))).into_response(),
        Err(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "Session is not running")
            .into_response(),
    }
}

async fn restart_game(State(state): State<AppState>) -> impl IntoResponse {
    match state.commands.send(SessionCommand::Restart).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "ok" }))).into_response(),
        Err(_) => json_error(StatusCode::SERVICE_UNAVAILABLE, "Session is not running")
            .into_response(),
    }
}

// ── Persistence handlers ──────────────────────────────────────────────

async fn get_leaderboard(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.get_leaderboard().await {
        Ok(entries) => (StatusCode::OK, Json(json!(entries))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_player(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.get_player(id).await {
        Ok(Some(player)) => (StatusCode::OK, Json(json!(player))).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_player_stats(State(state): State<AppState>, Path(id): Path<i64>) -> impl IntoResponse {
    match state.db.get_player_stats(id).await {
        Ok(Some(stats)) => (StatusCode::OK, Json(json!(stats))).into_response(),
        Ok(None) => json_error(StatusCode::NOT_FOUND, "Player not found").into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

async fn get_player_achievements(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.db.get_player_achievements(id).await {
        Ok(unlocked) => (StatusCode::OK, Json(json!(unlocked))).into_response(),
        Err(e) => internal_error(e).into_response(),
    }
}

// ── Observability ─────────────────────────────────────────────────────

async fn get_metrics() -> impl IntoResponse {
    (StatusCode::OK, metrics::gather_metrics())
}
