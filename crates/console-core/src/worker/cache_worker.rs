//! Stale-while-revalidate cache worker

use async_trait::async_trait;
use console_storage::{Cache, CacheStorage, CachedResponse};
use futures::future::try_join_all;
use http::{Method, header};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::handler::{ClientControl, FetchOutcome, WorkerHandler};
use crate::config::WorkerConfig;
use crate::error::CoreError;
use crate::network::Network;
use crate::request::FetchRequest;

/// Cache worker for the admin console.
///
/// Pre-caches the configured assets on install, drops other cache
/// generations on activate and answers same-origin GET requests
/// stale-while-revalidate.
pub struct CacheWorker {
    config: Arc<WorkerConfig>,
    storage: Arc<dyn CacheStorage>,
    network: Arc<dyn Network>,
}

impl CacheWorker {
    pub fn new(
        config: Arc<WorkerConfig>,
        storage: Arc<dyn CacheStorage>,
        network: Arc<dyn Network>,
    ) -> Self {
        info!(
            "Initializing cache worker (cache: {}, assets: {})",
            config.cache_name(),
            config.assets().len()
        );

        Self {
            config,
            storage,
            network,
        }
    }

    /// Only same-origin GET requests are intercepted
    pub fn should_intercept(&self, request: &FetchRequest) -> bool {
        request.method == Method::GET && self.config.is_same_origin(&request.url)
    }

    /// Fetch every asset, then store them all. Nothing is stored unless
    /// every fetch succeeded with a 2xx status.
    async fn precache(&self, cache: &dyn Cache) -> Result<usize, CoreError> {
        let network = &self.network;
        let fetches = self.config.assets().iter().map(|url| async move {
            let request = FetchRequest::get(url.clone());
            let response = network.fetch(&request).await?;
            if !response.is_ok() {
                return Err(CoreError::InstallFailed {
                    url: url.to_string(),
                    status: response.status.as_u16(),
                });
            }
            debug!("Fetched asset {} ({} bytes)", url, response.size());
            Ok::<_, CoreError>((request.cache_key(), shareable(response)))
        });

        let entries = try_join_all(fetches).await?;
        let count = entries.len();
        cache.put_all(entries).await?;

        Ok(count)
    }
}

#[async_trait]
impl WorkerHandler for CacheWorker {
    async fn install(&self, clients: &dyn ClientControl) -> Result<(), CoreError> {
        info!("Installing cache {}", self.config.cache_name());

        // Activation must not wait for pages still on an older version
        clients.skip_waiting();

        let cache = self.storage.open(self.config.cache_name()).await?;
        let count = self.precache(cache.as_ref()).await?;

        info!("Pre-cached {} assets in {}", count, self.config.cache_name());
        Ok(())
    }

    async fn activate(&self, clients: &dyn ClientControl) -> Result<(), CoreError> {
        let current = self.config.cache_name();
        let stale: Vec<String> = self
            .storage
            .keys()
            .await?
            .into_iter()
            .filter(|name| name != current)
            .collect();

        let storage = &self.storage;
        try_join_all(stale.iter().map(|name| async move {
            debug!("Deleting stale cache {}", name);
            storage.delete(name).await
        }))
        .await?;

        if !stale.is_empty() {
            info!("Deleted {} stale caches: {}", stale.len(), stale.join(", "));
        }
        info!("Activated cache {}", current);

        clients.claim_clients();
        Ok(())
    }

    async fn fetch(&self, request: FetchRequest) -> Result<FetchOutcome, CoreError> {
        if !self.should_intercept(&request) {
            debug!("Not intercepting {} {}", request.method, request.url);
            return Ok(FetchOutcome::Passthrough(request));
        }

        let key = request.cache_key();
        let cache = self.storage.open(self.config.cache_name()).await?;
        let cached = cache.match_key(&key).await?;

        let refresh = tokio::spawn(revalidate(
            cache,
            self.network.clone(),
            request,
            key.clone(),
            cached.clone(),
        ));

        match cached {
            Some(response) => {
                // The refresh task keeps running detached
                debug!("Cache hit for {}, refreshing in background", key);
                metrics::counter!("console_cache_hits_total").increment(1);
                Ok(FetchOutcome::Respond(response))
            }
            None => {
                debug!("Cache miss for {}, waiting on network", key);
                metrics::counter!("console_cache_misses_total").increment(1);
                let response = refresh
                    .await
                    .map_err(|e| CoreError::Task(e.to_string()))??;
                Ok(FetchOutcome::Respond(response))
            }
        }
    }
}

/// One cache serves every client, so cookies set for one requester must
/// never be replayed to another.
fn shareable(mut response: CachedResponse) -> CachedResponse {
    response.headers.remove(header::SET_COOKIE);
    response
}

/// Fetch a fresh copy and store it. On network failure resolve with the
/// stale copy if there is one.
async fn revalidate(
    cache: Arc<dyn Cache>,
    network: Arc<dyn Network>,
    request: FetchRequest,
    key: String,
    stale: Option<CachedResponse>,
) -> Result<CachedResponse, CoreError> {
    match network.fetch(&request).await {
        Ok(response) => {
            match cache.put(&key, shareable(response.clone())).await {
                Ok(()) => debug!("Refreshed {} ({})", key, response.status),
                Err(e) => warn!("Failed to store refreshed {}: {}", key, e),
            }
            Ok(response)
        }
        Err(e) => {
            metrics::counter!("console_cache_refresh_failures_total").increment(1);
            match stale {
                Some(stale) => {
                    warn!("Refresh of {} failed, keeping cached copy: {}", key, e);
                    Ok(stale)
                }
                None => {
                    warn!("Fetch of {} failed with no cached copy: {}", key, e);
                    Err(e)
                }
            }
        }
    }
}
