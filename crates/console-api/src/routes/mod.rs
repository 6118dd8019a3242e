//! API routes

mod health;
mod intercept;
pub mod metrics;
mod worker;

use axum::{Router, extract::DefaultBodyLimit};
use std::sync::Arc;

use crate::state::{AppState, MetricsHandle};

/// Create the main router
pub fn create_router(state: AppState, metrics_handle: Option<Arc<MetricsHandle>>) -> Router {
    let mut router = Router::new()
        // Health check
        .merge(health::routes())
        // Worker management
        .merge(worker::routes())
        // Everything else is a fetch event
        .fallback(intercept::intercept)
        .with_state(state)
        .layer(DefaultBodyLimit::max(16 * 1024 * 1024));

    if let Some(handle) = metrics_handle {
        router = router.merge(metrics::routes(handle));
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request, StatusCode};
    use bytes::Bytes;
    use console_core::{
        CacheWorker, CoreError, FetchRequest, HostConfig, Network, WorkerConfig, WorkerHost,
    };
    use console_storage::{CacheStorage, CachedResponse, MemoryStorage};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    /// Origin double that echoes the method and path
    #[derive(Default)]
    struct EchoNetwork {
        offline: AtomicBool,
        seen: Mutex<Vec<(Method, String)>>,
    }

    #[async_trait]
    impl Network for EchoNetwork {
        async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, CoreError> {
            self.seen
                .lock()
                .unwrap()
                .push((request.method.clone(), request.url.to_string()));
            if self.offline.load(Ordering::SeqCst) {
                return Err(CoreError::Network("connection refused".to_string()));
            }
            Ok(CachedResponse::ok(format!(
                "{} {}",
                request.method,
                request.url.path()
            )))
        }
    }

    struct Harness {
        router: Router,
        host: Arc<WorkerHost>,
        network: Arc<EchoNetwork>,
        storage: Arc<MemoryStorage>,
    }

    fn harness() -> Harness {
        let config = Arc::new(
            WorkerConfig::new("http://localhost:5000", "admin-console-v1", &["/admin"]).unwrap(),
        );
        let storage = Arc::new(MemoryStorage::new());
        let network = Arc::new(EchoNetwork::default());
        let worker = Arc::new(CacheWorker::new(
            config.clone(),
            storage.clone(),
            network.clone(),
        ));
        let host = Arc::new(WorkerHost::new(
            worker,
            HostConfig {
                install_attempts: 1,
                install_retry_delay: Duration::ZERO,
            },
        ));
        let state = AppState::new(host.clone(), network.clone(), storage.clone(), config);

        Harness {
            router: create_router(state, None),
            host,
            network,
            storage,
        }
    }

    async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Bytes) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body)
    }

    #[tokio::test]
    async fn test_passthrough_before_activation() {
        let h = harness();

        let (status, body) = send(&h.router, Method::GET, "/admin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "GET /admin");
        // Nothing was cached because the worker was not active
        assert!(h.storage.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_serves_precached_page_offline() {
        let h = harness();
        h.host.start().await.unwrap();

        h.network.offline.store(true, Ordering::SeqCst);
        let (status, body) = send(&h.router, Method::GET, "/admin").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "GET /admin");
    }

    #[tokio::test]
    async fn test_uncached_page_offline_is_bad_gateway() {
        let h = harness();
        h.host.start().await.unwrap();

        h.network.offline.store(true, Ordering::SeqCst);
        let (status, body) = send(&h.router, Method::GET, "/leads").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "FETCH_FAILED");
    }

    #[tokio::test]
    async fn test_post_is_forwarded_not_cached() {
        let h = harness();
        h.host.start().await.unwrap();

        let (status, body) = send(&h.router, Method::POST, "/admin/employees").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "POST /admin/employees");

        let cache = h.storage.open("admin-console-v1").await.unwrap();
        assert!(
            cache
                .match_key("http://localhost:5000/admin/employees")
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            h.network
                .seen
                .lock()
                .unwrap()
                .contains(&(Method::POST, "http://localhost:5000/admin/employees".to_string()))
        );
    }

    #[tokio::test]
    async fn test_status_and_entries() {
        let h = harness();
        h.storage.open("admin-console-v0").await.unwrap();
        h.host.start().await.unwrap();

        let (status, body) = send(&h.router, Method::GET, "/_worker/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "activated");
        assert_eq!(json["cache_name"], "admin-console-v1");
        assert_eq!(json["caches"], serde_json::json!(["admin-console-v1"]));
        assert_eq!(json["entries"], 1);

        let (_, body) = send(&h.router, Method::GET, "/_worker/entries").await;
        let keys: Vec<String> = serde_json::from_slice(&body).unwrap();
        assert_eq!(keys, vec!["http://localhost:5000/admin"]);
    }

    #[tokio::test]
    async fn test_update_endpoint_reinstalls() {
        let h = harness();
        h.host.start().await.unwrap();
        let before = h.network.seen.lock().unwrap().len();

        let (status, body) = send(&h.router, Method::POST, "/_worker/update").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["state"], "activated");
        assert_eq!(h.network.seen.lock().unwrap().len(), before + 1);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness();
        let (status, body) = send(&h.router, Method::GET, "/_worker/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["worker"], "parsed");
    }
}
