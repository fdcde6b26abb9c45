//! HTTP route definitions

use axum::{
    extract::{Extension, Query, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::app::AppState;
use crate::http::middleware::{with_identity, PlayerIdentity};
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;
use crate::ws::protocol::MatchKind;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    // Public routes (no identity resolution required)
    let public_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/match/join", get(join_match_handler));

    // Routes operating on a player-or-guest identity
    let identified_routes = Router::new()
        .route("/match/create", post(create_match_handler))
        .route("/match/random", post(join_random_handler))
        .route("/player/stats", get(player_stats_handler))
        .route("/player/name", post(change_name_handler))
        .layer(middleware::from_fn_with_state(state.clone(), with_identity));

    Router::new()
        .merge(public_routes)
        .merge(identified_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
    })
}

// ============================================================================
// Match endpoints
// ============================================================================

#[derive(Serialize)]
struct MatchCreatedResponse {
    id: Uuid,
}

async fn create_match_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<PlayerIdentity>,
) -> Json<MatchCreatedResponse> {
    let handle = state.matchmaking.create_match(MatchKind::PrivateInvite).await;

    tracing::info!(
        match_id = %handle.id,
        player_id = %identity.player_id,
        "Match created over HTTP"
    );

    Json(MatchCreatedResponse { id: handle.id })
}

#[derive(Deserialize)]
struct JoinMatchQuery {
    id: Uuid,
}

async fn join_match_handler(
    State(state): State<AppState>,
    Query(query): Query<JoinMatchQuery>,
) -> Result<StatusCode, AppError> {
    let Some(handle) = state.match_registry.get(&query.id) else {
        return Err(AppError::BadRequest("invalid code".to_string()));
    };

    if !handle.accepts_joins() {
        return Err(AppError::BadRequest(
            "match has already started".to_string(),
        ));
    }

    Ok(StatusCode::OK)
}

async fn join_random_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<PlayerIdentity>,
) -> Result<Json<MatchCreatedResponse>, AppError> {
    let handle = state
        .matchmaking
        .request_random_match()
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    tracing::info!(
        match_id = %handle.id,
        player_id = %identity.player_id,
        "Random match assigned"
    );

    Ok(Json(MatchCreatedResponse { id: handle.id }))
}

// ============================================================================
// Player endpoints
// ============================================================================

#[derive(Serialize)]
struct PlayerStatsResponse {
    name: String,
    avg_speed: f64,
    best_speed: f64,
    avg_accuracy: f64,
    matches_played: u32,
    matches_won: u32,
    points: f64,
}

async fn player_stats_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<PlayerIdentity>,
) -> Result<Json<PlayerStatsResponse>, AppError> {
    let record = state
        .stats_store
        .fetch(identity.player_id)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("no stats recorded".to_string()))?;

    Ok(Json(PlayerStatsResponse {
        name: record.name,
        avg_speed: record.avg_speed,
        best_speed: record.best_speed,
        avg_accuracy: record.avg_accuracy,
        matches_played: record.matches_played,
        matches_won: record.matches_won,
        points: record.points,
    }))
}

#[derive(Deserialize)]
struct ChangeNameRequest {
    name: String,
}

async fn change_name_handler(
    State(state): State<AppState>,
    Extension(identity): Extension<PlayerIdentity>,
    Json(req): Json<ChangeNameRequest>,
) -> Result<StatusCode, AppError> {
    if req.name.trim().is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }

    state
        .stats_store
        .rename(identity.player_id, req.name.trim())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(StatusCode::OK)
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
