//! Lifecycle handler interface

use async_trait::async_trait;
use console_storage::CachedResponse;

use crate::error::CoreError;
use crate::request::FetchRequest;

/// Result of handling a fetch event
#[derive(Debug)]
pub enum FetchOutcome {
    /// The handler did not intercept; default network handling applies
    Passthrough(FetchRequest),
    /// The handler answered the request
    Respond(CachedResponse),
}

/// Client control offered by the host to lifecycle handlers
pub trait ClientControl: Send + Sync {
    /// Activate the installed worker without waiting for open clients to close
    fn skip_waiting(&self);

    /// Take control of open clients without a reload
    fn claim_clients(&self);
}

/// One handler per lifecycle event.
///
/// The host awaits `install` and `activate` to completion before moving the
/// worker to the next state; `fetch` may run concurrently for many requests.
#[async_trait]
pub trait WorkerHandler: Send + Sync {
    async fn install(&self, clients: &dyn ClientControl) -> Result<(), CoreError>;

    async fn activate(&self, clients: &dyn ClientControl) -> Result<(), CoreError>;

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, CoreError>;
}
