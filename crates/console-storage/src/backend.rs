//! Cache storage traits

use async_trait::async_trait;
use std::sync::Arc;

use crate::entry::CachedResponse;
use crate::error::StorageError;

/// Storage for a set of named caches owned by one origin.
///
/// Cache names are returned in creation order. Opening a name that does
/// not exist creates it.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Open (or create) the cache with the given name
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError>;

    /// Check if a cache with the given name exists
    async fn has(&self, name: &str) -> Result<bool, StorageError>;

    /// Delete a cache and all its entries; returns whether it existed
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;

    /// List all cache names
    async fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Look a key up in every cache, oldest cache first
    async fn match_any(&self, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        for name in self.keys().await? {
            let cache = self.open(&name).await?;
            if let Some(response) = cache.match_key(key).await? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}

/// A single named cache of request key to response.
///
/// Writes to the same key are last-write-wins.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Name of this cache
    fn name(&self) -> &str;

    /// Get the response stored for a key
    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StorageError>;

    /// Store a response for a key, replacing any previous entry
    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StorageError>;

    /// Store a batch of already fetched responses
    async fn put_all(&self, entries: Vec<(String, CachedResponse)>) -> Result<(), StorageError> {
        for (key, response) in entries {
            self.put(&key, response).await?;
        }
        Ok(())
    }

    /// Delete the entry for a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// List all keys in this cache
    async fn keys(&self) -> Result<Vec<String>, StorageError>;
}

/// Compute the hex SHA256 of a cache name or key, used for file names
pub fn key_digest(key: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}
