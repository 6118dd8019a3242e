//! Console Cache - offline stale-while-revalidate cache for the admin console

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;

use config::Config;
use console_api::{AppState, create_router};
use console_core::{CacheWorker, WorkerConfig, WorkerHost};
use console_proxy::{OriginClient, OriginClientConfig};
use console_storage::{CacheStorage, LocalStorage, MemoryStorage};

/// Console Cache - offline cache in front of the admin console
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,

    /// Bind address
    #[arg(long, env = "CONSOLE_CACHE_BIND")]
    bind: Option<String>,

    /// Port
    #[arg(short, long, env = "CONSOLE_CACHE_PORT")]
    port: Option<u16>,

    /// Admin console origin URL
    #[arg(long, env = "CONSOLE_CACHE_ORIGIN")]
    origin: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(origin) = args.origin {
        config.origin.url = origin;
    }
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    let addr = config.server.socket_addr()?;

    init_logging(&config.logging.level, &config.logging.format);

    info!("Starting Console Cache v{}", env!("CARGO_PKG_VERSION"));

    let metrics_handle = if config.metrics.enabled {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        Some(Arc::new(handle))
    } else {
        None
    };

    let worker_config = Arc::new(WorkerConfig::new(
        &config.origin.url,
        config.worker.cache_name.clone(),
        &config.worker.assets,
    )?);

    let storage: Arc<dyn CacheStorage> = match config.storage.backend.as_str() {
        "local" => Arc::new(LocalStorage::new(&config.storage.local.path).await?),
        _ => Arc::new(MemoryStorage::new()),
    };

    let origin = Arc::new(OriginClient::new(OriginClientConfig {
        url: config.origin.url.clone(),
        skip_tls_verify: config.origin.skip_tls_verify,
        timeout: config.origin.timeout(),
    })?);

    match origin.ping().await {
        Ok(true) => info!("Origin {} is reachable", config.origin.url),
        Ok(false) => warn!("Origin {} answered with a server error", config.origin.url),
        Err(e) => warn!("Origin {} is unreachable: {}", config.origin.url, e),
    }

    let worker = Arc::new(CacheWorker::new(
        worker_config.clone(),
        storage.clone(),
        origin.clone(),
    ));
    let host = Arc::new(WorkerHost::new(worker, config.host_config()));

    // Serve even if install fails; requests then pass straight through
    if let Err(e) = host.start().await {
        error!("Cache worker did not activate: {}", e);
    }

    let state = AppState::new(host, origin, storage, worker_config);

    let app = create_router(state, metrics_handle).layer(TraceLayer::new_for_http());

    info!("Listening on {}", addr);
    info!("Origin: {}", config.origin.url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Initialize logging
fn init_logging(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
