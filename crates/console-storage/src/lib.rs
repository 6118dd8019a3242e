//! Console Cache Storage Layer
//!
//! This crate provides the cache storage API used by the cache worker:
//! named caches mapping request URLs to stored responses, backed either
//! by memory or by a local directory.

pub mod backend;
pub mod entry;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{Cache, CacheStorage};
pub use entry::CachedResponse;
pub use error::StorageError;
pub use local::LocalStorage;
pub use memory::MemoryStorage;
