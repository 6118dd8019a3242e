//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] console_storage::StorageError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] console_proxy::ProxyError),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to pre-cache {url}: status {status}")]
    InstallFailed { url: String, status: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Task failed: {0}")]
    Task(String),
}
