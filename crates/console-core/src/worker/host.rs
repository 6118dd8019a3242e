//! Worker host
//!
//! Plays the part of the runtime that owns a cache worker: it dispatches
//! install and activate in order, applies the retry policy for a failed
//! install, and only routes fetches to the worker once a version has been
//! activated.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::handler::{ClientControl, FetchOutcome, WorkerHandler};
use crate::error::CoreError;
use crate::request::FetchRequest;

/// Lifecycle state of the most recently dispatched worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Registered, no event dispatched yet
    Parsed,
    Installing,
    /// Installed, waiting to be activated
    Installed,
    Activating,
    /// Active and controlling clients
    Activated,
    /// Install or activation failed for good
    Redundant,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host retry policy
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Install attempts before the worker is marked redundant
    pub install_attempts: u32,
    /// Delay between install attempts
    pub install_retry_delay: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            install_attempts: 3,
            install_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Snapshot of the host state
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    /// Whether some version is active and intercepting fetches
    pub controlling: bool,
    pub skip_waiting: bool,
    pub clients_claimed: bool,
    pub install_attempts: u32,
    pub installed_at: Option<DateTime<Utc>>,
    pub activated_at: Option<DateTime<Utc>>,
}

struct HostState {
    state: WorkerState,
    controlling: bool,
    skip_waiting: bool,
    clients_claimed: bool,
    install_attempts: u32,
    installed_at: Option<DateTime<Utc>>,
    activated_at: Option<DateTime<Utc>>,
}

/// Dispatches lifecycle events to a worker handler.
///
/// A failed update leaves the previously activated version in control, so
/// fetch interception only stops if no version ever activated.
pub struct WorkerHost {
    handler: Arc<dyn WorkerHandler>,
    config: HostConfig,
    state: RwLock<HostState>,
    lifecycle: Mutex<()>,
}

impl WorkerHost {
    pub fn new(handler: Arc<dyn WorkerHandler>, config: HostConfig) -> Self {
        Self {
            handler,
            config,
            state: RwLock::new(HostState {
                state: WorkerState::Parsed,
                controlling: false,
                skip_waiting: false,
                clients_claimed: false,
                install_attempts: 0,
                installed_at: None,
                activated_at: None,
            }),
            lifecycle: Mutex::new(()),
        }
    }

    /// Install then activate the worker.
    ///
    /// No client outlives this process, so an installed worker never has
    /// pages to wait for and is activated right away.
    pub async fn start(&self) -> Result<(), CoreError> {
        let _lifecycle = self.lifecycle.lock().await;

        {
            let mut state = self.state.write();
            state.skip_waiting = false;
            state.clients_claimed = false;
        }

        self.install_with_retry().await?;
        self.activate().await
    }

    /// Re-run the lifecycle for the current configuration, refreshing
    /// the pre-cached assets
    pub async fn update(&self) -> Result<(), CoreError> {
        info!("Updating cache worker");
        self.start().await
    }

    async fn install_with_retry(&self) -> Result<(), CoreError> {
        let attempts = self.config.install_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.set_state(WorkerState::Installing);
            self.state.write().install_attempts = attempt;

            match self.handler.install(self).await {
                Ok(()) => {
                    {
                        let mut state = self.state.write();
                        state.state = WorkerState::Installed;
                        state.installed_at = Some(Utc::now());
                    }
                    metrics::counter!("console_cache_installs_total").increment(1);
                    info!("Worker installed (attempt {}/{})", attempt, attempts);
                    return Ok(());
                }
                Err(e) if attempt < attempts => {
                    warn!(
                        "Install attempt {}/{} failed: {}; retrying in {:?}",
                        attempt, attempts, e, self.config.install_retry_delay
                    );
                    tokio::time::sleep(self.config.install_retry_delay).await;
                }
                Err(e) => {
                    error!("Install failed after {} attempts: {}", attempts, e);
                    metrics::counter!("console_cache_install_failures_total").increment(1);
                    self.set_state(WorkerState::Redundant);
                    return Err(e);
                }
            }
        }
    }

    async fn activate(&self) -> Result<(), CoreError> {
        self.set_state(WorkerState::Activating);

        match self.handler.activate(self).await {
            Ok(()) => {
                {
                    let mut state = self.state.write();
                    state.state = WorkerState::Activated;
                    state.controlling = true;
                    state.activated_at = Some(Utc::now());
                }
                metrics::counter!("console_cache_activations_total").increment(1);
                info!("Worker activated");
                Ok(())
            }
            Err(e) => {
                error!("Activation failed: {}", e);
                self.set_state(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Dispatch a fetch event. Until a version is active every request
    /// passes through untouched.
    pub async fn dispatch_fetch(&self, request: FetchRequest) -> Result<FetchOutcome, CoreError> {
        if !self.is_controlling() {
            debug!("No active worker, passing {} through", request.url);
            metrics::counter!("console_cache_passthrough_total").increment(1);
            return Ok(FetchOutcome::Passthrough(request));
        }

        let outcome = self.handler.fetch(request).await?;
        match &outcome {
            FetchOutcome::Respond(_) => {
                metrics::counter!("console_cache_intercepted_total").increment(1)
            }
            FetchOutcome::Passthrough(_) => {
                metrics::counter!("console_cache_passthrough_total").increment(1)
            }
        }
        Ok(outcome)
    }

    pub fn is_controlling(&self) -> bool {
        self.state.read().controlling
    }

    pub fn state(&self) -> WorkerState {
        self.state.read().state
    }

    pub fn status(&self) -> WorkerStatus {
        let state = self.state.read();
        WorkerStatus {
            state: state.state,
            controlling: state.controlling,
            skip_waiting: state.skip_waiting,
            clients_claimed: state.clients_claimed,
            install_attempts: state.install_attempts,
            installed_at: state.installed_at,
            activated_at: state.activated_at,
        }
    }

    fn set_state(&self, next: WorkerState) {
        let mut state = self.state.write();
        debug!("Worker state {} -> {}", state.state, next);
        state.state = next;
    }
}

impl ClientControl for WorkerHost {
    fn skip_waiting(&self) {
        self.state.write().skip_waiting = true;
    }

    fn claim_clients(&self) {
        self.state.write().clients_claimed = true;
    }
}
