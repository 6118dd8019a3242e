//! Console Cache HTTP API
//!
//! This crate provides the Axum-based front end: every request that is
//! not a worker management route becomes a fetch event for the cache
//! worker.

pub mod error;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::{AppState, MetricsHandle};
