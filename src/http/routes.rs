//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::require_admin;
use crate::util::time::uptime_secs;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Build the operational router
pub fn build_router(state: AppState) -> Router {
    let public_routes = Router::new().route("/health", get(health_handler));

    let admin_routes = Router::new()
        .route(
            "/players/:id",
            get(player_handler).delete(remove_player_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    ticks: u64,
    snapshot_count: usize,
    tracked_players: usize,
    vehicles: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        ticks: state.session.ticks(),
        snapshot_count: state.lag.snapshot_count(),
        tracked_players: state.gate.player_count(),
        vehicles: state.roster.len(),
    })
}

// ============================================================================
// Moderation endpoints
// ============================================================================

#[derive(Serialize)]
struct PlayerResponse {
    player_id: Uuid,
    suspicion_count: u32,
    banned: bool,
    last_input_time: Option<f64>,
    average_ping_ms: Option<f32>,
    vehicle_registered: bool,
}

async fn player_handler(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
) -> Result<Json<PlayerResponse>, ApiError> {
    let validation = state.gate.state(&player_id);
    let average_ping_ms = state.lag.average_ping_ms(&player_id);
    let vehicle_registered = state.roster.get(&player_id).is_some();

    if validation.is_none() && average_ping_ms.is_none() && !vehicle_registered {
        return Err(ApiError::NotFound(format!("Player {} not tracked", player_id)));
    }

    Ok(Json(PlayerResponse {
        player_id,
        suspicion_count: validation.as_ref().map(|v| v.suspicion_count).unwrap_or(0),
        banned: validation.as_ref().map(|v| v.banned).unwrap_or(false),
        last_input_time: validation.and_then(|v| v.last_input_time),
        average_ping_ms,
        vehicle_registered,
    }))
}

async fn remove_player_handler(
    State(state): State<AppState>,
    Path(player_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !state.remove_player(&player_id) {
        return Err(ApiError::NotFound(format!("Player {} not tracked", player_id)));
    }
    info!(player_id = %player_id, "Player state cleared");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
