//! In-memory cache storage

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use crate::backend::{Cache, CacheStorage};
use crate::entry::CachedResponse;
use crate::error::StorageError;

/// Cache storage held entirely in memory
#[derive(Default)]
pub struct MemoryStorage {
    caches: RwLock<Vec<Arc<MemoryCache>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        if let Some(cache) = self.caches.read().iter().find(|c| c.name == name) {
            return Ok(cache.clone());
        }

        let mut caches = self.caches.write();
        // Another opener may have won the race between the two locks
        if let Some(cache) = caches.iter().find(|c| c.name == name) {
            return Ok(cache.clone());
        }

        debug!("Creating cache {}", name);
        let cache = Arc::new(MemoryCache::new(name));
        caches.push(cache.clone());
        Ok(cache)
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.caches.read().iter().any(|c| c.name == name))
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut caches = self.caches.write();
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.caches.read().iter().map(|c| c.name.clone()).collect())
    }
}

/// A named cache held in memory
pub struct MemoryCache {
    name: String,
    entries: RwLock<BTreeMap<String, CachedResponse>>,
}

impl MemoryCache {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), response);
        Ok(())
    }

    async fn put_all(&self, entries: Vec<(String, CachedResponse)>) -> Result<(), StorageError> {
        self.entries.write().extend(entries);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.entries.read().keys().cloned().collect())
    }
}
