//! Gallery Cache - A local caching proxy for numbered gallery images
//!
//! Serves images cache-first with LRU eviction, retries origin fetches with
//! exponential backoff, prefetches neighboring images and falls back to a
//! placeholder pixel when the origin cannot be reached.

pub mod api;
pub mod body;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod manager;
pub mod models;
pub mod prefetch;
pub mod storage;
pub mod tasks;

pub use api::AppState;
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use manager::{CacheResponse, ImageCacheManager, InterceptedRequest};
