//! Configuration types for grid-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Metadata fetch settings (pagination and the fetch pool)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Entries requested per page (default: 1000)
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Maximum number of pages to fetch (None = every page)
    #[serde(default)]
    pub page_limit: Option<u64>,

    /// Upper bound on concurrent page fetches (default: 5)
    #[serde(default = "default_metadata_workers")]
    pub max_workers: usize,

    /// Capacity of the page and batch queues (default: 64)
    #[serde(default = "default_metadata_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_limit: None,
            max_workers: default_metadata_workers(),
            queue_capacity: default_metadata_queue_capacity(),
        }
    }
}

/// Image cache settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Number of image download workers (default: 8)
    #[serde(default = "default_image_workers")]
    pub workers: usize,

    /// Width requested when caching the whole store (default: 300)
    #[serde(default = "default_cache_width")]
    pub cache_width: u32,

    /// Size of each write to the cache file in bytes (default: 1024)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Capacity of the image job queue (default: 256)
    #[serde(default = "default_image_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            workers: default_image_workers(),
            cache_width: default_cache_width(),
            chunk_size: default_chunk_size(),
            queue_capacity: default_image_queue_capacity(),
        }
    }
}

/// Local storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding one metadata store per account (default: "meta")
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,

    /// Root of the image cache; each account gets a subdirectory (default: "images")
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            meta_dir: default_meta_dir(),
            image_dir: default_image_dir(),
        }
    }
}

/// Remote endpoints and HTTP client settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Base of the metadata API; the token and version path are appended
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Site root used to build an account's grid page URL
    #[serde(default = "default_site_base")]
    pub site_base: String,

    /// Page whose `og:image` meta tag carries the access token
    #[serde(default = "default_token_page")]
    pub token_page: String,

    /// Scheme prefixed to the scheme-less responsive image URLs
    #[serde(default = "default_image_scheme")]
    pub image_scheme: String,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            site_base: default_site_base(),
            token_page: default_token_page(),
            image_scheme: default_image_scheme(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl HttpConfig {
    /// Request timeout as a [`Duration`]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// How workers treat a failed page fetch or image download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the failure as an empty result and carry on without reporting it
    #[default]
    Silent,
    /// Finish all remaining work, then return an error counting the failures
    Surface,
}

/// Main configuration for [`GridSync`](crate::GridSync)
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Pagination and metadata pool settings
    #[serde(default)]
    pub metadata: MetadataConfig,

    /// Image cache pool settings
    #[serde(default)]
    pub images: ImageConfig,

    /// Local storage locations
    #[serde(default)]
    pub paths: PathsConfig,

    /// Remote endpoints and HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Failure handling for pooled work
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

impl Config {
    /// Load a configuration from a JSON file; absent fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would stall or divide by zero.
    pub fn validate(&self) -> Result<()> {
        if self.metadata.page_size == 0 {
            return Err(Error::config(
                "metadata.page_size",
                "page size must be greater than zero",
            ));
        }
        if self.metadata.max_workers == 0 {
            return Err(Error::config(
                "metadata.max_workers",
                "at least one metadata worker is required",
            ));
        }
        if self.images.workers == 0 {
            return Err(Error::config(
                "images.workers",
                "at least one image worker is required",
            ));
        }
        if self.images.chunk_size == 0 {
            return Err(Error::config(
                "images.chunk_size",
                "chunk size must be greater than zero",
            ));
        }
        if self.metadata.queue_capacity == 0 || self.images.queue_capacity == 0 {
            return Err(Error::config(
                "queue_capacity",
                "queue capacity must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Path of the metadata store for an account
    pub fn store_path(&self, subdomain: &str) -> PathBuf {
        self.paths.meta_dir.join(format!("{subdomain}.json"))
    }

    /// Image cache directory for an account
    pub fn image_dir_for(&self, subdomain: &str) -> PathBuf {
        self.paths.image_dir.join(subdomain)
    }
}

fn default_page_size() -> u64 {
    1000
}

fn default_metadata_workers() -> usize {
    5
}

fn default_metadata_queue_capacity() -> usize {
    64
}

fn default_image_workers() -> usize {
    8
}

fn default_cache_width() -> u32 {
    300
}

fn default_chunk_size() -> usize {
    1024
}

fn default_image_queue_capacity() -> usize {
    256
}

fn default_meta_dir() -> PathBuf {
    PathBuf::from("meta")
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("images")
}

fn default_api_base() -> String {
    "https://vsco.co/ajxp".to_string()
}

fn default_site_base() -> String {
    "https://vsco.co".to_string()
}

fn default_token_page() -> String {
    "http://vsco.co/grid/grid/1/".to_string()
}

fn default_image_scheme() -> String {
    "http".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_9_3) AppleWebKit/537.75.14 (KHTML, like Gecko) Version/7.0.3 Safari/7046A194A".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.metadata.page_size, 1000);
        assert_eq!(config.metadata.max_workers, 5);
        assert_eq!(config.metadata.page_limit, None);
        assert_eq!(config.images.workers, 8);
        assert_eq!(config.images.cache_width, 300);
        assert_eq!(config.images.chunk_size, 1024);
        assert_eq!(config.failure_policy, FailurePolicy::Silent);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.metadata.page_size, 1000);
        assert_eq!(config.paths.meta_dir, PathBuf::from("meta"));
        assert_eq!(config.http.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_json_overrides() {
        let config: Config = serde_json::from_str(
            r#"{"metadata": {"page_size": 50}, "failure_policy": "surface"}"#,
        )
        .unwrap();
        assert_eq!(config.metadata.page_size, 50);
        assert_eq!(config.metadata.max_workers, 5);
        assert_eq!(config.failure_policy, FailurePolicy::Surface);
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = Config::default();
        config.metadata.page_size = 0;
        match config.validate().unwrap_err() {
            Error::Config { key, .. } => assert_eq!(key.as_deref(), Some("metadata.page_size")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut config = Config::default();
        config.images.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"images": {"workers": 2}}"#).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.images.workers, 2);
        assert_eq!(config.images.cache_width, 300);
    }

    #[test]
    fn test_store_and_image_paths() {
        let config = Config::default();
        assert_eq!(config.store_path("demo"), PathBuf::from("meta/demo.json"));
        assert_eq!(config.image_dir_for("demo"), PathBuf::from("images/demo"));
    }
}
