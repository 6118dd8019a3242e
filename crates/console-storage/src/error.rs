//! Storage error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cache not found: {0}")]
    NotFound(String),

    #[error("Invalid header in stored entry: {0}")]
    InvalidHeader(String),
}
