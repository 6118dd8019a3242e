//! Cache worker lifecycle
//!
//! `handler` defines the per-event interface, `cache_worker` implements
//! it for the admin console, and `host` dispatches the events.

mod cache_worker;
mod handler;
mod host;

pub use cache_worker::CacheWorker;
pub use handler::{ClientControl, FetchOutcome, WorkerHandler};
pub use host::{HostConfig, WorkerHost, WorkerState, WorkerStatus};
