//! Fetch interception
//!
//! Every request that no other route claims is turned into a fetch event.
//! If the worker answers, that response is written back; otherwise the
//! request goes to the network unmodified.

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::Uri,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use console_core::{FetchOutcome, FetchRequest, WorkerConfig};
use console_storage::CachedResponse;
use tracing::debug;
use url::Url;

use crate::error::ApiError;
use crate::state::AppState;

/// Largest request body buffered for forwarding (16 MiB)
const MAX_REQUEST_BODY: usize = 16 * 1024 * 1024;

/// Fallback handler for all non-management routes
pub async fn intercept(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let url = request_url(&state.config, &parts.uri)?;
    let body = to_bytes(body, MAX_REQUEST_BODY)
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read request body: {}", e)))?;

    let fetch = FetchRequest::new(parts.method, url)
        .with_headers(parts.headers)
        .with_body(body);

    let response = match state.host.dispatch_fetch(fetch).await? {
        FetchOutcome::Respond(response) => response,
        FetchOutcome::Passthrough(request) => {
            debug!("Forwarding {} {}", request.method, request.url);
            state.network.fetch(&request).await?
        }
    };

    Ok(into_response(response))
}

/// Absolute-form URIs are taken as-is; anything else is resolved against
/// the console origin.
fn request_url(config: &WorkerConfig, uri: &Uri) -> Result<Url, ApiError> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Url::parse(&uri.to_string())
            .map_err(|e| ApiError::BadRequest(format!("Invalid request URI {}: {}", uri, e)));
    }

    let target = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Ok(config.resolve(target)?)
}

fn into_response(response: CachedResponse) -> Response {
    let response: axum::http::Response<Bytes> = response.into();
    response.map(Body::from).into_response()
}
