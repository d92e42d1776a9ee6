pub mod args;
pub mod directory;
pub mod dispatcher;
pub mod registry;
pub mod socket;
pub mod state;

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::prelude::*;

use crate::state::ServerState;

/// How often the expiry sweep runs.
pub const SWEEP_INTERVAL_SECS: u64 = 30 * 60;

pub fn setup_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imposter_server=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(false)
                .with_target(false),
        )
        .init();
}

pub async fn run(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let state = ServerState::new();
    spawn_sweeper(state.clone());

    let app = app(state);
    info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/lobby/:code", get(lobby_status_handler))
        .route("/ws", get(socket::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn spawn_sweeper(state: ServerState) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(SWEEP_INTERVAL_SECS));
        // The first tick completes immediately; skip it so a fresh server
        // doesn't sweep at startup.
        interval.tick().await;
        loop {
            interval.tick().await;
            let expired = state
                .registry
                .lock()
                .unwrap()
                .sweep_expired(chrono::Utc::now());
            for code in expired {
                info!(%code, "lobby deleted (expired)");
            }
        }
    });
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received, closing server");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    lobbies: usize,
    connections: usize,
    timestamp: DateTime<Utc>,
}

/// Liveness probe: active lobby and connection counts.
async fn health_handler(State(state): State<ServerState>) -> Json<HealthResponse> {
    let lobbies = state.registry.lock().unwrap().len();
    let connections = state.directory.lock().unwrap().len();
    Json(HealthResponse {
        status: "ok",
        lobbies,
        connections,
        timestamp: Utc::now(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LobbyStatus {
    code: String,
    player_count: usize,
    phase: String,
    host_id: String,
}

/// Lightweight lobby status for ops and debugging.
async fn lobby_status_handler(
    State(state): State<ServerState>,
    Path(code): Path<String>,
) -> impl IntoResponse {
    let lobby = state.registry.lock().unwrap().get(&code);
    match lobby {
        Some(lobby) => {
            let lobby = lobby.lock().unwrap();
            Json(LobbyStatus {
                code: lobby.code.clone(),
                player_count: lobby.players.len(),
                phase: lobby.phase.to_string(),
                host_id: lobby.host_id.clone(),
            })
            .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Lobby not found" })),
        )
            .into_response(),
    }
}
