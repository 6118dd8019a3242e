//! Local disk cache storage

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::backend::{Cache, CacheStorage, key_digest};
use crate::entry::{CachedResponse, EntryMetadata};
use crate::error::StorageError;

const DESCRIPTOR_FILE: &str = "cache.json";
const ENTRY_EXTENSION: &str = "entry";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Descriptor written once per cache directory
#[derive(Debug, Serialize, Deserialize)]
struct CacheDescriptor {
    name: String,
    created_at: DateTime<Utc>,
}

/// Local disk cache storage
///
/// Layout:
/// `<base_path>/caches/<sha256(name)>/cache.json` describes a cache,
/// `<sha256(key)>.entry` holds one entry, head and body together, so a
/// single rename replaces it.
pub struct LocalStorage {
    caches_path: PathBuf,
}

impl LocalStorage {
    /// Create a new local storage backend
    pub async fn new(base_path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        let caches_path = base_path.join("caches");

        fs::create_dir_all(&caches_path).await?;

        info!("Initialized local cache storage at {:?}", base_path);

        Ok(Self { caches_path })
    }

    fn cache_dir(&self, name: &str) -> PathBuf {
        self.caches_path.join(key_digest(name))
    }

    async fn read_descriptor(dir: &Path) -> Result<Option<CacheDescriptor>, StorageError> {
        match fs::read(dir.join(DESCRIPTOR_FILE)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl CacheStorage for LocalStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Cache>, StorageError> {
        let dir = self.cache_dir(name);

        if Self::read_descriptor(&dir).await?.is_none() {
            debug!("Creating cache {} at {:?}", name, dir);
            fs::create_dir_all(&dir).await?;

            let descriptor = CacheDescriptor {
                name: name.to_string(),
                created_at: Utc::now(),
            };
            write_atomic(&dir.join(DESCRIPTOR_FILE), &serde_json::to_vec(&descriptor)?).await?;
        }

        Ok(Arc::new(LocalCache {
            name: name.to_string(),
            dir,
        }))
    }

    async fn has(&self, name: &str) -> Result<bool, StorageError> {
        Ok(Self::read_descriptor(&self.cache_dir(name)).await?.is_some())
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let dir = self.cache_dir(name);
        debug!("Deleting cache {} at {:?}", name, dir);

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut descriptors = Vec::new();
        let mut dirs = fs::read_dir(&self.caches_path).await?;

        while let Some(dir) = dirs.next_entry().await? {
            if !dir.file_type().await?.is_dir() {
                continue;
            }
            match Self::read_descriptor(&dir.path()).await {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                // Half-created or concurrently deleted cache
                Ok(None) => {}
                Err(e) => warn!("Skipping unreadable cache at {:?}: {}", dir.path(), e),
            }
        }

        descriptors.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.name.cmp(&b.name))
        });

        Ok(descriptors.into_iter().map(|d| d.name).collect())
    }
}

/// A named cache stored in one directory
pub struct LocalCache {
    name: String,
    dir: PathBuf,
}

impl LocalCache {
    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", key_digest(key), ENTRY_EXTENSION))
    }

    async fn ensure_exists(&self) -> Result<(), StorageError> {
        if !fs::try_exists(&self.dir).await? {
            return Err(StorageError::NotFound(self.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for LocalCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn match_key(&self, key: &str) -> Result<Option<CachedResponse>, StorageError> {
        let data = match fs::read(self.entry_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io(e)),
        };

        let (meta, body) = decode_entry(Bytes::from(data))?;
        Ok(Some(meta.into_response(body)?))
    }

    async fn put(&self, key: &str, response: CachedResponse) -> Result<(), StorageError> {
        debug!("Storing {} in cache {} ({} bytes)", key, self.name, response.size());

        self.ensure_exists().await?;

        write_atomic(&self.entry_path(key), &encode_entry(key, &response)?).await
    }

    /// Every entry is staged before any is renamed into place. If a rename
    /// fails, entries already renamed are removed again.
    async fn put_all(&self, entries: Vec<(String, CachedResponse)>) -> Result<(), StorageError> {
        debug!("Storing {} entries in cache {}", entries.len(), self.name);

        self.ensure_exists().await?;

        let mut staged = Vec::with_capacity(entries.len());
        for (key, response) in &entries {
            let path = self.entry_path(key);
            let temp_path = match encode_entry(key, response) {
                Ok(data) => stage(&path, &data).await,
                Err(e) => Err(e),
            };
            match temp_path {
                Ok(temp_path) => staged.push((temp_path, path)),
                Err(e) => {
                    discard(staged.iter().map(|(temp, _)| temp)).await;
                    return Err(e);
                }
            }
        }

        for (i, (temp_path, path)) in staged.iter().enumerate() {
            if let Err(e) = fs::rename(temp_path, path).await {
                warn!(
                    "Failed to commit {:?} in cache {}, rolling back: {}",
                    path, self.name, e
                );
                discard(staged[..i].iter().map(|(_, path)| path)).await;
                discard(staged[i..].iter().map(|(temp, _)| temp)).await;
                return Err(StorageError::Io(e));
            }
        }

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut files = match fs::read_dir(&self.dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(keys),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(file) = files.next_entry().await? {
            let path = file.path();
            let is_entry = file.file_type().await?.is_file()
                && path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION);
            if !is_entry {
                continue;
            }

            let data = fs::read(&path).await?;
            let (meta, _) = decode_entry(Bytes::from(data))?;
            keys.push(meta.key);
        }

        keys.sort();
        Ok(keys)
    }
}

/// An entry file is its JSON head, a newline, then the raw body. Compact
/// JSON never contains a raw newline, so the first one ends the head.
fn encode_entry(key: &str, response: &CachedResponse) -> Result<Vec<u8>, StorageError> {
    let meta = EntryMetadata::from_response(key, response);
    let mut data = serde_json::to_vec(&meta)?;
    data.reserve(response.body.len() + 1);
    data.push(b'\n');
    data.extend_from_slice(&response.body);
    Ok(data)
}

fn decode_entry(data: Bytes) -> Result<(EntryMetadata, Bytes), StorageError> {
    let split = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| StorageError::InvalidHeader("entry has no head".to_string()))?;
    let meta = serde_json::from_slice(&data[..split])?;
    Ok((meta, data.slice(split + 1..)))
}

/// Write data to a temp file next to `path` and return the temp path
async fn stage(path: &Path, data: &[u8]) -> Result<PathBuf, StorageError> {
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_path = path.with_extension(format!("{}.{}.tmp", std::process::id(), seq));

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(StorageError::Io(e));
    }

    Ok(temp_path)
}

async fn commit(temp_path: &Path, path: &Path) -> Result<(), StorageError> {
    if let Err(e) = fs::rename(temp_path, path).await {
        let _ = fs::remove_file(temp_path).await;
        return Err(StorageError::Io(e));
    }
    Ok(())
}

/// Best-effort removal
async fn discard<'a>(paths: impl Iterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = fs::remove_file(path).await {
            debug!("Failed to remove {:?}: {}", path, e);
        }
    }
}

/// Write a file atomically using a temp file in the same directory
async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let temp_path = stage(path, data).await?;
    commit(&temp_path, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, HeaderValue, StatusCode};

    fn html(body: &'static str) -> CachedResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/html"));
        CachedResponse::new(StatusCode::OK, headers, Bytes::from_static(body.as_bytes()))
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let storage = LocalStorage::new(dir.path()).await.unwrap();
            let cache = storage.open("admin-console-v1").await.unwrap();
            cache.put("http://localhost:5000/admin", html("<h1>admin</h1>")).await.unwrap();
        }

        let storage = LocalStorage::new(dir.path()).await.unwrap();
        assert!(storage.has("admin-console-v1").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["admin-console-v1"]);

        let cache = storage.open("admin-console-v1").await.unwrap();
        let hit = cache.match_key("http://localhost:5000/admin").await.unwrap().unwrap();
        assert_eq!(hit.body, "<h1>admin</h1>");
        assert_eq!(hit.content_type(), Some("text/html"));
        assert_eq!(cache.keys().await.unwrap(), vec!["http://localhost:5000/admin"]);
    }

    #[tokio::test]
    async fn test_delete_cache_and_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let old = storage.open("admin-console-v0").await.unwrap();
        old.put("k", html("old")).await.unwrap();
        let current = storage.open("admin-console-v1").await.unwrap();
        current.put("k", html("new")).await.unwrap();

        let mut names = storage.keys().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["admin-console-v0", "admin-console-v1"]);

        assert!(storage.delete("admin-console-v0").await.unwrap());
        assert!(!storage.delete("admin-console-v0").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["admin-console-v1"]);

        // Writing through a handle to a deleted cache fails
        assert!(old.put("k", html("late")).await.is_err());

        assert!(current.delete("k").await.unwrap());
        assert!(!current.delete("k").await.unwrap());
        assert!(current.match_key("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let cache = storage.open("admin-console-v1").await.unwrap();

        cache.put("k", html("first")).await.unwrap();
        cache.put("k", html("second")).await.unwrap();

        assert_eq!(cache.match_key("k").await.unwrap().unwrap().body, "second");
        assert_eq!(cache.keys().await.unwrap().len(), 1);
        assert_eq!(storage.match_any("k").await.unwrap().unwrap().body, "second");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_never_mix_entries() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let cache = storage.open("admin-console-v1").await.unwrap();

        let mut png_headers = HeaderMap::new();
        png_headers.insert("content-type", HeaderValue::from_static("image/png"));
        let png = CachedResponse::new(StatusCode::OK, png_headers, Bytes::from_static(b"PNGDATA"));

        for _ in 0..100 {
            let a = {
                let cache = cache.clone();
                tokio::spawn(async move { cache.put("k", html("<html>")).await })
            };
            let b = {
                let cache = cache.clone();
                let png = png.clone();
                tokio::spawn(async move { cache.put("k", png).await })
            };
            a.await.unwrap().unwrap();
            b.await.unwrap().unwrap();

            let entry = cache.match_key("k").await.unwrap().unwrap();
            match entry.content_type() {
                Some("text/html") => assert_eq!(entry.body, "<html>"),
                Some("image/png") => assert_eq!(entry.body, "PNGDATA"),
                other => panic!("unexpected content type {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_put_all_stores_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let cache = storage.open("admin-console-v1").await.unwrap();

        // A non-empty directory where "b" should land makes its rename fail
        let cache_dir = storage.cache_dir("admin-console-v1");
        let blocker = cache_dir.join(format!("{}.{}", key_digest("b"), ENTRY_EXTENSION));
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("occupied"), b"x").unwrap();

        let entries = vec![
            ("a".to_string(), html("a")),
            ("b".to_string(), html("b")),
            ("c".to_string(), html("c")),
        ];
        assert!(cache.put_all(entries).await.is_err());

        assert!(cache.match_key("a").await.unwrap().is_none());
        assert!(cache.match_key("c").await.unwrap().is_none());
        assert!(cache.keys().await.unwrap().is_empty());

        let leftovers: Vec<_> = std::fs::read_dir(&cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
    }

    #[tokio::test]
    async fn test_put_all_stores_every_entry() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();
        let cache = storage.open("admin-console-v1").await.unwrap();

        cache
            .put_all(vec![
                ("/admin".to_string(), html("overview")),
                ("/leads".to_string(), html("leads")),
            ])
            .await
            .unwrap();

        assert_eq!(cache.keys().await.unwrap(), vec!["/admin", "/leads"]);
        assert_eq!(cache.match_key("/leads").await.unwrap().unwrap().body, "leads");
    }
}
