//! Configuration loading

use anyhow::{Context, Result};
use console_core::{DEFAULT_ASSETS, DEFAULT_CACHE_NAME};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub worker: WorkerSection,
    #[serde(default)]
    pub host: HostSection,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Admin console origin configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default = "default_origin_url")]
    pub url: String,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: default_origin_url(),
            skip_tls_verify: false,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ServerConfig {
    /// Listen address; IPv6 binds such as `::` are accepted
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address: {}", self.bind_address))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl OriginConfig {
    /// Request timeout; zero disables it
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Cache generation and pre-cache list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSection {
    #[serde(default = "default_cache_name")]
    pub cache_name: String,
    #[serde(default = "default_assets")]
    pub assets: Vec<String>,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            cache_name: default_cache_name(),
            assets: default_assets(),
        }
    }
}

/// Install retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostSection {
    #[serde(default = "default_install_attempts")]
    pub install_attempts: u32,
    #[serde(default = "default_install_retry_delay_secs")]
    pub install_retry_delay_secs: u64,
}

impl Default for HostSection {
    fn default() -> Self {
        Self {
            install_attempts: default_install_attempts(),
            install_retry_delay_secs: default_install_retry_delay_secs(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "memory" or "local"
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub local: LocalStorageConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local: LocalStorageConfig::default(),
        }
    }
}

/// Local storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalStorageConfig {
    #[serde(default = "default_local_path")]
    pub path: String,
}

impl Default for LocalStorageConfig {
    fn default() -> Self {
        Self {
            path: default_local_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

fn default_origin_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_name() -> String {
    DEFAULT_CACHE_NAME.to_string()
}

fn default_assets() -> Vec<String> {
    DEFAULT_ASSETS.iter().map(|s| s.to_string()).collect()
}

fn default_install_attempts() -> u32 {
    3
}

fn default_install_retry_delay_secs() -> u64 {
    5
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_local_path() -> String {
    "./data/console-cache".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_metrics_enabled() -> bool {
    true
}

impl Config {
    /// Load configuration from a file, falling back to defaults if it
    /// does not exist
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        match self.storage.backend.as_str() {
            "memory" | "local" => {}
            other => anyhow::bail!("Unknown storage backend '{}' (expected memory or local)", other),
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => anyhow::bail!("Unknown log format '{}' (expected pretty or json)", other),
        }
        Ok(())
    }

    pub fn host_config(&self) -> console_core::HostConfig {
        console_core::HostConfig {
            install_attempts: self.host.install_attempts,
            install_retry_delay: Duration::from_secs(self.host.install_retry_delay_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.worker.cache_name, "admin-console-v1");
        assert_eq!(config.worker.assets.len(), DEFAULT_ASSETS.len());
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.origin.timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [server]
            port = 9000

            [origin]
            url = "https://console.example.com"
            timeout_secs = 0

            [worker]
            cache_name = "admin-console-v2"
            assets = ["/admin", "/static/logo.png"]

            [host]
            install_attempts = 5
            install_retry_delay_secs = 1

            [storage]
            backend = "local"
            local = { path = "/var/lib/console-cache" }

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.origin.url, "https://console.example.com");
        assert_eq!(config.origin.timeout(), None);
        assert_eq!(config.worker.cache_name, "admin-console-v2");
        assert_eq!(config.worker.assets, vec!["/admin", "/static/logo.png"]);
        assert_eq!(config.storage.local.path, "/var/lib/console-cache");

        let host = config.host_config();
        assert_eq!(host.install_attempts, 5);
        assert_eq!(host.install_retry_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_socket_addr_accepts_ipv6() {
        let mut config = Config::default();
        config.server.bind_address = "::".to_string();
        config.server.port = 9000;
        assert_eq!(config.server.socket_addr().unwrap().to_string(), "[::]:9000");

        config.server.bind_address = "localhost".to_string();
        assert!(config.server.socket_addr().is_err());
    }

    #[test]
    fn test_default_binds_loopback() {
        let addr = Config::default().server.socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 8090);
    }

    #[test]
    fn test_rejects_unknown_backend() {
        let err = Config::parse("[storage]\nbackend = \"s3\"").unwrap_err();
        assert!(err.to_string().contains("s3"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let config = Config::load(path.to_str().unwrap()).unwrap();
        assert_eq!(config.logging.level, "info");
    }
}
