//! Console Cache Core
//!
//! This crate provides the cache worker for the admin console: the
//! install / activate / fetch lifecycle handlers implementing a
//! stale-while-revalidate policy, and the host that dispatches them.

pub mod config;
pub mod error;
pub mod network;
pub mod request;
pub mod worker;

pub use config::{DEFAULT_ASSETS, DEFAULT_CACHE_NAME, WorkerConfig};
pub use error::CoreError;
pub use network::Network;
pub use request::{FetchRequest, cache_key};
pub use worker::{
    CacheWorker, ClientControl, FetchOutcome, HostConfig, WorkerHandler, WorkerHost, WorkerState,
    WorkerStatus,
};
