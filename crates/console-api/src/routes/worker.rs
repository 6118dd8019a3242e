//! Worker management endpoints

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use console_core::WorkerStatus;
use serde::Serialize;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Worker status response
#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub worker: WorkerStatus,
    pub cache_name: String,
    pub origin: String,
    pub assets: Vec<String>,
    /// Every cache generation currently in storage
    pub caches: Vec<String>,
    /// Entry count of the current generation
    pub entries: usize,
}

async fn build_status(state: &AppState) -> Result<StatusResponse, ApiError> {
    let caches = state.storage.keys().await?;
    let entries = if caches.iter().any(|name| name == state.config.cache_name()) {
        state
            .storage
            .open(state.config.cache_name())
            .await?
            .keys()
            .await?
            .len()
    } else {
        0
    };

    Ok(StatusResponse {
        worker: state.host.status(),
        cache_name: state.config.cache_name().to_string(),
        origin: state.config.origin().origin().ascii_serialization(),
        assets: state.config.assets().iter().map(|u| u.to_string()).collect(),
        caches,
        entries,
    })
}

/// GET /_worker/status
async fn status(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    Ok(Json(build_status(&state).await?))
}

/// GET /_worker/entries - keys of the current cache generation
async fn entries(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    if !state.storage.has(state.config.cache_name()).await? {
        return Ok(Json(Vec::new()));
    }
    let cache = state.storage.open(state.config.cache_name()).await?;
    Ok(Json(cache.keys().await?))
}

/// POST /_worker/update - re-install and re-activate
async fn update(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    info!("Worker update requested");
    state.host.update().await?;
    Ok(Json(build_status(&state).await?))
}

/// Create worker management routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/_worker/status", get(status))
        .route("/_worker/entries", get(entries))
        .route("/_worker/update", post(update))
}
