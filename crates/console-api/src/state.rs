//! Application state

use console_core::{Network, WorkerConfig, WorkerHost};
use console_storage::CacheStorage;
use std::sync::Arc;

/// Prometheus handle used to render `/_worker/metrics`
pub type MetricsHandle = metrics_exporter_prometheus::PrometheusHandle;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub host: Arc<WorkerHost>,
    pub network: Arc<dyn Network>,
    pub storage: Arc<dyn CacheStorage>,
    pub config: Arc<WorkerConfig>,
}

impl AppState {
    pub fn new(
        host: Arc<WorkerHost>,
        network: Arc<dyn Network>,
        storage: Arc<dyn CacheStorage>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            host,
            network,
            storage,
            config,
        }
    }
}
