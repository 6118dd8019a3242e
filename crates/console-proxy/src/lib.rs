//! Console Cache Origin Client
//!
//! This crate provides the network side of the cache worker: a client
//! that issues requests to the admin console origin and buffers the
//! responses so they can be both returned and stored.

pub mod client;
pub mod error;

pub use client::{OriginClient, OriginClientConfig};
pub use error::ProxyError;
