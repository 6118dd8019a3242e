//! API error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use console_core::CoreError;
use serde_json::json;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] console_storage::StorageError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Core(e) => match e {
                // The fetch failed and there was no cached copy to fall back on
                CoreError::Network(_) | CoreError::Proxy(_) => {
                    (StatusCode::BAD_GATEWAY, "FETCH_FAILED", e.to_string())
                }
                CoreError::InstallFailed { .. } => {
                    (StatusCode::BAD_GATEWAY, "INSTALL_FAILED", e.to_string())
                }
                CoreError::InvalidUrl(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    e.to_string(),
                ),
            },
            ApiError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                e.to_string(),
            ),
        };

        if status.is_server_error() {
            warn!("{}: {}", code, message);
        }

        let body = axum::Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
