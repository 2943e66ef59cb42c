use axum::{routing::get, Json, Router};
use rand::Rng;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use snake_backend::api;
use snake_backend::config::Config;
use snake_backend::db::Database;
use snake_backend::engine::runner::{SessionCommand, SessionRunner};
use snake_backend::engine::session::{SessionController, SessionStore};
use snake_backend::engine::spawner::Spawner;
use snake_backend::metrics;

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok", "service": "snake-backend" }))
}

fn generate_player_name() -> String {
    let n: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("Player_{n}")
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    metrics::register_metrics();

    let config = Config::load();

    let db = Database::new(&config.database_url)
        .await
        .expect("Failed to initialize database");
    let db = Arc::new(db);

    let player_name = config.player_name.unwrap_or_else(generate_player_name);
    let player_id = db
        .create_player(&player_name)
        .await
        .expect("Failed to register player");
    tracing::info!(player_id, player_name, "player ready");

    let controller =
        SessionController::start((*db).clone(), player_id, Spawner::new(config.rng_seed)).await;
    let (commands_tx, commands_rx) = mpsc::channel::<SessionCommand>(32);
    let (runner, snapshot_rx) = SessionRunner::new(controller, commands_rx);
    let runner_handle = tokio::spawn(runner.run());

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(api::router(db, commands_tx.clone(), snapshot_rx))
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("Failed to bind port");

    tracing::info!("snake backend listening on port {}", config.port);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .await
            .expect("Failed to start server");
    });

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for shutdown signal");
    tracing::info!("shutting down");

    // Let the runner close the open session before the process exits
    let _ = commands_tx.send(SessionCommand::Quit).await;
    let _ = runner_handle.await;
    server.abort();
}
