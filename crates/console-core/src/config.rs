//! Cache worker configuration
//!
//! The worker is configured once with a cache generation name and the
//! list of assets to pre-cache. The value is immutable afterwards and is
//! shared behind an `Arc` by the handlers.

use url::Url;

use crate::error::CoreError;
use crate::request::cache_key;

/// Cache generation used when none is configured
pub const DEFAULT_CACHE_NAME: &str = "admin-console-v1";

/// Admin console pages and assets pre-cached on install
pub const DEFAULT_ASSETS: &[&str] = &[
    "/admin",
    "/admin/employees",
    "/admin/sites",
    "/schedule",
    "/leads",
    "/static/admin-manifest.json",
    "/static/logo.png",
];

/// Immutable cache worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    origin: Url,
    cache_name: String,
    assets: Vec<Url>,
}

impl WorkerConfig {
    /// Build a configuration, resolving asset paths against the origin.
    ///
    /// Fails if the cache name is empty, the origin is not an http(s) URL,
    /// or an asset resolves to another origin.
    pub fn new<S: AsRef<str>>(
        origin: &str,
        cache_name: impl Into<String>,
        assets: &[S],
    ) -> Result<Self, CoreError> {
        let cache_name = cache_name.into();
        if cache_name.trim().is_empty() {
            return Err(CoreError::InvalidConfig("cache name must not be empty".to_string()));
        }

        let origin = Url::parse(origin)
            .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", origin, e)))?;
        if !matches!(origin.scheme(), "http" | "https") || !origin.origin().is_tuple() {
            return Err(CoreError::InvalidConfig(format!(
                "origin must be an http(s) URL: {}",
                origin
            )));
        }

        let mut resolved = Vec::with_capacity(assets.len());
        for asset in assets {
            let asset = asset.as_ref();
            let url = origin
                .join(asset)
                .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", asset, e)))?;
            if url.origin() != origin.origin() {
                return Err(CoreError::InvalidConfig(format!(
                    "asset {} is not on origin {}",
                    asset,
                    origin.origin().ascii_serialization()
                )));
            }
            if !resolved.iter().any(|u: &Url| cache_key(u) == cache_key(&url)) {
                resolved.push(url);
            }
        }

        Ok(Self {
            origin,
            cache_name,
            assets: resolved,
        })
    }

    /// The default admin console configuration for an origin
    pub fn admin_console(origin: &str) -> Result<Self, CoreError> {
        Self::new(origin, DEFAULT_CACHE_NAME, DEFAULT_ASSETS)
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Pre-cache URLs, in configured order
    pub fn assets(&self) -> &[Url] {
        &self.assets
    }

    /// Whether a URL has the same scheme, host and port as the origin
    pub fn is_same_origin(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin()
    }

    /// Resolve a path or absolute URL against the origin
    pub fn resolve(&self, target: &str) -> Result<Url, CoreError> {
        self.origin
            .join(target)
            .map_err(|e| CoreError::InvalidUrl(format!("{}: {}", target, e)))
    }
}
