//! Configuration Module
//!
//! Handles loading server configuration from environment variables and
//! deriving the cache manager's own configuration from it.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cache::ResourceKey;
use crate::error::Result;

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Base URL of the image origin the proxy sits in front of
    pub origin_url: String,
    /// Origin the proxied pages are served from, used for CORS checks
    pub app_origin: String,
    /// Version token embedded in every store name
    pub cache_version: String,
    /// Maximum number of cached images
    pub max_image_entries: usize,
    /// Maximum origin fetch attempts per key
    pub max_retry: u32,
    /// Base backoff delay in milliseconds
    pub retry_base_delay_ms: u64,
    /// Number of neighbors prefetched on each side of an observed image
    pub prefetch_radius: u32,
    /// Retry a rejected CORS fetch in no-cors mode within the same attempt
    pub opaque_fallback: bool,
    /// Directory for persistent stores, in-memory when unset
    pub cache_dir: Option<PathBuf>,
    /// Per-request origin timeout in seconds
    pub fetch_timeout_secs: u64,
    /// Paths fetched into the static store at install time
    pub precache: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `ORIGIN_URL` - Image origin base URL (default: http://localhost:8080)
    /// - `APP_ORIGIN` - Page origin for CORS (default: http://localhost:3000)
    /// - `CACHE_VERSION` - Store generation token (default: v9-smart-gallery)
    /// - `MAX_IMAGE_ENTRIES` - Image cache capacity (default: 300)
    /// - `MAX_RETRY` - Fetch attempts per key (default: 3)
    /// - `RETRY_BASE_DELAY_MS` - Backoff base in ms (default: 200)
    /// - `PREFETCH_RADIUS` - Neighbors per side (default: 2)
    /// - `OPAQUE_FALLBACK` - Enable no-cors fallback (default: true)
    /// - `CACHE_DIR` - Persistent storage directory (default: in-memory)
    /// - `FETCH_TIMEOUT_SECS` - Origin request timeout (default: 30)
    /// - `PRECACHE` - Comma separated paths to precache (default: "/")
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            origin_url: env::var("ORIGIN_URL").unwrap_or(defaults.origin_url),
            app_origin: env::var("APP_ORIGIN").unwrap_or(defaults.app_origin),
            cache_version: env::var("CACHE_VERSION").unwrap_or(defaults.cache_version),
            max_image_entries: parse_var("MAX_IMAGE_ENTRIES")
                .unwrap_or(defaults.max_image_entries),
            max_retry: parse_var("MAX_RETRY").unwrap_or(defaults.max_retry),
            retry_base_delay_ms: parse_var("RETRY_BASE_DELAY_MS")
                .unwrap_or(defaults.retry_base_delay_ms),
            prefetch_radius: parse_var("PREFETCH_RADIUS").unwrap_or(defaults.prefetch_radius),
            opaque_fallback: parse_var("OPAQUE_FALLBACK").unwrap_or(defaults.opaque_fallback),
            cache_dir: env::var("CACHE_DIR").ok().map(PathBuf::from),
            fetch_timeout_secs: parse_var("FETCH_TIMEOUT_SECS")
                .unwrap_or(defaults.fetch_timeout_secs),
            precache: env::var("PRECACHE")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|p| !p.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or(defaults.precache),
        }
    }

    /// Derives the cache manager configuration.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            version: self.cache_version.clone(),
            max_image_entries: self.max_image_entries,
            max_retry: self.max_retry,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            prefetch_radius: self.prefetch_radius,
            opaque_fallback: self.opaque_fallback,
        }
    }

    /// Parses the origin base URL.
    pub fn origin_base(&self) -> Result<Url> {
        Ok(Url::parse(&self.origin_url)?)
    }

    /// Resolves the precache paths against the origin base URL.
    pub fn precache_keys(&self) -> Result<Vec<ResourceKey>> {
        let base = self.origin_base()?;
        self.precache
            .iter()
            .map(|path| ResourceKey::resolve(&base, path))
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 3000,
            origin_url: "http://localhost:8080".to_string(),
            app_origin: "http://localhost:3000".to_string(),
            cache_version: "v9-smart-gallery".to_string(),
            max_image_entries: 300,
            max_retry: 3,
            retry_base_delay_ms: 200,
            prefetch_radius: 2,
            opaque_fallback: true,
            cache_dir: None,
            fetch_timeout_secs: 30,
            precache: vec!["/".to_string()],
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.parse().ok())
}

// == Cache Config ==
/// Configuration handed to a cache manager at construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Version token embedded in store names
    pub version: String,
    /// Capacity of the image store
    pub max_image_entries: usize,
    /// Maximum fetch attempts per key
    pub max_retry: u32,
    /// Backoff base delay
    pub retry_base_delay: Duration,
    /// Prefetch window radius
    pub prefetch_radius: u32,
    /// Try no-cors after a rejected CORS fetch
    pub opaque_fallback: bool,
}

impl CacheConfig {
    /// Name of the static asset store.
    pub fn static_store(&self) -> String {
        format!("static-{}", self.version)
    }

    /// Name of the image content store.
    pub fn image_store(&self) -> String {
        format!("images-{}", self.version)
    }

    /// Name of the metadata store.
    pub fn meta_store(&self) -> String {
        format!("meta-{}", self.version)
    }

    /// Store names kept during activation; everything else is deleted.
    pub fn allowed_stores(&self) -> [String; 3] {
        [self.static_store(), self.image_store(), self.meta_store()]
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Config::default().cache_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.max_image_entries, 300);
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.retry_base_delay_ms, 200);
        assert_eq!(config.prefetch_radius, 2);
        assert!(config.opaque_fallback);
        assert!(config.cache_dir.is_none());
        assert_eq!(config.precache, vec!["/".to_string()]);
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        env::remove_var("SERVER_PORT");
        env::remove_var("MAX_IMAGE_ENTRIES");
        env::remove_var("MAX_RETRY");
        env::remove_var("CACHE_VERSION");

        let config = Config::from_env();
        assert_eq!(config.server_port, 3000);
        assert_eq!(config.max_image_entries, 300);
        assert_eq!(config.max_retry, 3);
        assert_eq!(config.cache_version, "v9-smart-gallery");
    }

    #[test]
    fn test_store_names_embed_version() {
        let config = CacheConfig {
            version: "v2".to_string(),
            ..CacheConfig::default()
        };

        assert_eq!(config.static_store(), "static-v2");
        assert_eq!(config.image_store(), "images-v2");
        assert_eq!(config.meta_store(), "meta-v2");
        assert_eq!(config.allowed_stores().len(), 3);
    }

    #[test]
    fn test_precache_keys_resolve_against_origin() {
        let config = Config {
            origin_url: "http://img.test/gallery/".to_string(),
            precache: vec!["/".to_string(), "index.html".to_string()],
            ..Config::default()
        };

        let keys = config.precache_keys().unwrap();
        assert_eq!(keys[0].as_str(), "http://img.test/");
        assert_eq!(keys[1].as_str(), "http://img.test/gallery/index.html");
    }

    #[test]
    fn test_bad_origin_url() {
        let config = Config {
            origin_url: "not a url".to_string(),
            ..Config::default()
        };
        assert!(config.precache_keys().is_err());
    }

    #[test]
    fn test_cache_config_delay() {
        let config = Config::default().cache_config();
        assert_eq!(config.retry_base_delay, Duration::from_millis(200));
    }
}
