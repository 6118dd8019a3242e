//! Network fetch seam

use async_trait::async_trait;
use console_proxy::OriginClient;
use console_storage::CachedResponse;

use crate::error::CoreError;
use crate::request::FetchRequest;

/// Issues real network requests on behalf of the worker.
///
/// Implementations resolve with whatever response the server sent,
/// whatever its status; an `Err` means the request never completed.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, CoreError>;
}

#[async_trait]
impl Network for OriginClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<CachedResponse, CoreError> {
        let response = OriginClient::fetch(
            self,
            request.method.clone(),
            &request.url,
            &request.headers,
            request.body.clone(),
        )
        .await?;

        Ok(CachedResponse::from(response))
    }
}
