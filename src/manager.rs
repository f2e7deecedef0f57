//! Image Cache Manager
//!
//! The request orchestrator. For each intercepted GET it decides between a
//! cache hit, an origin fetch and the fallback pixel, and hands refreshes and
//! prefetches to background tasks.
//!
//! # Flow
//! - Hit: record access, refresh in the background, answer from cache
//! - Miss: fetch with retry, store, evict, prefetch neighbors, answer stored entry
//! - Exhausted: answer the 1x1 fallback PNG with status 503, store nothing
//! - Non-image GET: network first, falling back to the static store

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use axum::http::Method;
use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::body::{self, BodyStream};
use crate::cache::{
    CacheEntry, CacheStats, ContentCache, ImageCache, MetadataStore, ResourceKey, FALLBACK_PNG,
};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::fetch::{FetchMode, OriginFetch, OriginResponse, RetryFetcher};
use crate::models::ClientMessage;
use crate::prefetch::PrefetchPlanner;
use crate::storage::CacheStorage;
use crate::tasks::BackgroundTasks;

fn image_extension() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\.(jpg|jpeg|png|webp|gif|svg|avif)$").expect("static pattern compiles")
    })
}

// == Intercepted Request ==
/// What the request is for, as reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Loaded by an image element
    Image,
    /// Anything else or unknown
    Other,
}

/// An intercepted request.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub key: ResourceKey,
    pub destination: Destination,
}

impl InterceptedRequest {
    /// A GET request for `key` with unknown destination.
    pub fn get(key: ResourceKey) -> Self {
        Self {
            method: Method::GET,
            key,
            destination: Destination::Other,
        }
    }

    /// True for image destinations or image file extensions.
    pub fn is_image(&self) -> bool {
        self.destination == Destination::Image || image_extension().is_match(self.key.url().path())
    }
}

/// How a request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Not intercepted
    Bypass,
    /// Smart image handling
    Image,
    /// Network first with static cache fallback
    Static,
}

/// Routes a request: only GETs are intercepted.
pub fn route(request: &InterceptedRequest) -> Route {
    if request.method != Method::GET {
        Route::Bypass
    } else if request.is_image() {
        Route::Image
    } else {
        Route::Static
    }
}

// == Cache Response ==
/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Image cache hit
    Hit,
    /// Fetched from the origin and stored
    Miss,
    /// Fallback pixel
    Fallback,
    /// Origin response on the static path
    Network,
    /// Static store after a network failure
    StaticCache,
}

/// A response produced by the manager.
pub struct CacheResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub source: ResponseSource,
    pub body: BodyStream,
}

impl CacheResponse {
    fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self {
            status: 200,
            content_type: entry.content_type,
            source,
            body: body::full(entry.body),
        }
    }

    fn from_origin(response: OriginResponse) -> Self {
        Self {
            status: if response.is_opaque() { 200 } else { response.status },
            content_type: response.content_type,
            source: ResponseSource::Network,
            body: response.body,
        }
    }

    /// The 1x1 transparent PNG placeholder.
    pub fn fallback() -> Self {
        Self {
            status: 503,
            content_type: Some("image/png".to_string()),
            source: ResponseSource::Fallback,
            body: body::full(FALLBACK_PNG),
        }
    }

    /// True for the placeholder response.
    pub fn is_fallback(&self) -> bool {
        self.source == ResponseSource::Fallback
    }
}

impl std::fmt::Debug for CacheResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheResponse")
            .field("status", &self.status)
            .field("content_type", &self.content_type)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

// == Image Cache Manager ==
/// Shared handle to the cache manager.
#[derive(Clone)]
pub struct ImageCacheManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    origin: Arc<dyn OriginFetch>,
    images: ImageCache,
    static_cache: ContentCache,
    fetcher: RetryFetcher,
    planner: PrefetchPlanner,
    stats: RwLock<CacheStats>,
    refreshing: Mutex<HashSet<ResourceKey>>,
    tasks: BackgroundTasks,
}

impl ImageCacheManager {
    // == Activation ==
    /// Deletes stores from other versions, then opens the current ones.
    pub async fn activate(
        storage: Arc<dyn CacheStorage>,
        origin: Arc<dyn OriginFetch>,
        config: CacheConfig,
    ) -> Result<Self> {
        let allowed = config.allowed_stores();
        for name in storage.names().await? {
            if !allowed.contains(&name) {
                storage.delete(&name).await?;
                info!("Deleted stale store {}", name);
            }
        }

        let static_cache = ContentCache::new(storage.open(&config.static_store()).await?);
        let content = ContentCache::new(storage.open(&config.image_store()).await?);
        let metadata = MetadataStore::new(storage.open(&config.meta_store()).await?);

        let images = ImageCache::new(content, metadata.clone(), config.max_image_entries);
        let fetcher = RetryFetcher::new(origin.clone(), metadata, &config);
        let planner = PrefetchPlanner::new(config.prefetch_radius, images.clone(), fetcher.clone());

        info!(
            "Activated cache {} (capacity {})",
            config.version, config.max_image_entries
        );

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                origin,
                images,
                static_cache,
                fetcher,
                planner,
                stats: RwLock::new(CacheStats::new()),
                refreshing: Mutex::new(HashSet::new()),
                tasks: BackgroundTasks::new(),
            }),
        })
    }

    // == Install ==
    /// Fetches `keys` into the static store; nothing is stored unless every
    /// fetch succeeds.
    pub async fn install(&self, keys: &[ResourceKey]) -> Result<usize> {
        let mut responses = Vec::with_capacity(keys.len());
        for key in keys {
            let response = self
                .inner
                .origin
                .fetch(key.url(), FetchMode::Cors)
                .await
                .map_err(|e| CacheError::Upstream(format!("precache {}: {}", key, e)))?;
            if !response.ok() {
                return Err(CacheError::Upstream(format!(
                    "precache {}: status {}",
                    key, response.status
                )));
            }
            responses.push((key, response));
        }

        for (key, response) in responses {
            self.inner.static_cache.put(key, response).await?;
        }
        info!("Precached {} static resources", keys.len());
        Ok(keys.len())
    }

    /// The active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// The image cache.
    pub fn images(&self) -> &ImageCache {
        &self.inner.images
    }

    /// The static store.
    pub fn static_cache(&self) -> &ContentCache {
        &self.inner.static_cache
    }

    // == Handle ==
    /// Handles an intercepted request; `None` means it is not intercepted.
    pub async fn handle(&self, request: &InterceptedRequest) -> Result<Option<CacheResponse>> {
        match route(request) {
            Route::Bypass => Ok(None),
            Route::Image => self.handle_image(&request.key).await.map(Some),
            Route::Static => self.handle_static(&request.key).await.map(Some),
        }
    }

    /// Answers an image request.
    pub async fn handle_image(&self, key: &ResourceKey) -> Result<CacheResponse> {
        if let Some(entry) = self.inner.images.lookup(key).await? {
            self.inner.stats.write().await.record_hit();
            self.spawn_refresh(key.clone()).await;
            debug!("Cache HIT for {}", key);
            return Ok(CacheResponse::from_entry(entry, ResponseSource::Hit));
        }

        self.inner.stats.write().await.record_miss();
        let Some(response) = self.inner.fetcher.fetch(key).await? else {
            return Ok(self.fallback(key).await);
        };

        // Answered from the stored bytes; a concurrent sweep may evict the key
        let entry = match self.inner.images.store(key, response).await {
            Ok(entry) => entry,
            Err(CacheError::Upstream(msg)) => {
                warn!("Body for {} failed while caching: {}", key, msg);
                return Ok(self.fallback(key).await);
            }
            Err(err) => return Err(err),
        };

        let evicted = self.inner.images.enforce_capacity().await?;
        self.inner.stats.write().await.record_evictions(evicted);

        self.spawn_prefetch(key.clone());
        info!("Fetched and cached {}", key);
        Ok(CacheResponse::from_entry(entry, ResponseSource::Miss))
    }

    async fn fallback(&self, key: &ResourceKey) -> CacheResponse {
        self.inner.stats.write().await.record_fallback();
        info!("Serving fallback pixel for {}", key);
        CacheResponse::fallback()
    }

    /// Answers a non-image GET: network first, static store on failure.
    pub async fn handle_static(&self, key: &ResourceKey) -> Result<CacheResponse> {
        match self.inner.origin.fetch(key.url(), FetchMode::Cors).await {
            Ok(response) if response.ok() && response.status == 200 => {
                let (forwarded, write) = self.inner.static_cache.put_and_forward(key, response);
                self.inner
                    .tasks
                    .spawn(format!("static store of {}", key), write);
                Ok(CacheResponse::from_origin(forwarded))
            }
            Ok(response) => Ok(CacheResponse::from_origin(response)),
            Err(err) => {
                debug!("Network failed for {}: {}", key, err);
                match self.inner.static_cache.matches(key).await? {
                    Some(entry) => Ok(CacheResponse::from_entry(entry, ResponseSource::StaticCache)),
                    None => Err(CacheError::Upstream(format!("{}: {}", key, err))),
                }
            }
        }
    }

    // == Messages ==
    /// Handles an out-of-band client message.
    pub fn handle_message(&self, message: ClientMessage) -> Result<()> {
        match message {
            ClientMessage::PrefetchImages { url } => {
                let key = ResourceKey::parse(&url)?;
                info!("Received prefetchImages message for {}", key);
                self.spawn_prefetch(key);
                Ok(())
            }
        }
    }

    // == Background Work ==
    async fn spawn_refresh(&self, key: ResourceKey) {
        if !self.inner.refreshing.lock().await.insert(key.clone()) {
            debug!("Refresh already running for {}", key);
            return;
        }

        let this = self.clone();
        self.inner
            .tasks
            .spawn(format!("refresh of {}", key), async move {
                let result = this.refresh(&key).await;
                this.inner.refreshing.lock().await.remove(&key);
                result
            });
    }

    async fn refresh(&self, key: &ResourceKey) -> Result<()> {
        let Some(response) = self.inner.fetcher.fetch(key).await? else {
            debug!("Failed to refresh {}", key);
            return Ok(());
        };

        self.inner.images.store(key, response).await?;
        let evicted = self.inner.images.enforce_capacity().await?;

        let mut stats = self.inner.stats.write().await;
        stats.record_refresh();
        stats.record_evictions(evicted);
        debug!("Refreshed cache for {}", key);
        Ok(())
    }

    fn spawn_prefetch(&self, key: ResourceKey) {
        let this = self.clone();
        self.inner
            .tasks
            .spawn(format!("prefetch around {}", key), async move {
                let report = this.inner.planner.plan_and_fetch(&key).await?;
                let mut stats = this.inner.stats.write().await;
                stats.record_prefetched(report.stored);
                stats.record_evictions(report.evicted);
                Ok(())
            });
    }

    /// Waits for all background refreshes, prefetches and static writes.
    pub async fn drain_background(&self) {
        self.inner.tasks.drain().await;
    }

    // == Stats ==
    /// Current statistics.
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = self.inner.stats.read().await.clone();
        stats.set_total_entries(self.inner.images.len().await?);
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::ScriptedOrigin;
    use crate::storage::MemoryStorage;
    use bytes::Bytes;

    const BASE: &str = "http://img.test/gallery";

    fn url(name: &str) -> String {
        format!("{}/{}", BASE, name)
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::parse(&url(name)).unwrap()
    }

    fn test_config() -> CacheConfig {
        CacheConfig {
            version: "test".to_string(),
            opaque_fallback: false,
            ..CacheConfig::default()
        }
    }

    async fn manager(origin: ScriptedOrigin, config: CacheConfig) -> (ImageCacheManager, Arc<ScriptedOrigin>) {
        let origin = Arc::new(origin);
        let manager = ImageCacheManager::activate(Arc::new(MemoryStorage::new()), origin.clone(), config)
            .await
            .unwrap();
        (manager, origin)
    }

    async fn body_of(response: CacheResponse) -> Bytes {
        body::collect(response.body).await.unwrap()
    }

    #[test]
    fn test_route() {
        let image = InterceptedRequest::get(key("IMG_0001.JPG"));
        assert_eq!(route(&image), Route::Image);

        let page = InterceptedRequest::get(key("index.html"));
        assert_eq!(route(&page), Route::Static);

        let tagged = InterceptedRequest {
            destination: Destination::Image,
            ..InterceptedRequest::get(key("thumb?id=4"))
        };
        assert_eq!(route(&tagged), Route::Image);

        let post = InterceptedRequest {
            method: Method::POST,
            ..InterceptedRequest::get(key("IMG_0001.JPG"))
        };
        assert_eq!(route(&post), Route::Bypass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_stores_and_prefetches() {
        let origin = ScriptedOrigin::new()
            .serve(&url("IMG_0050.JPG"), "fifty")
            .serve(&url("IMG_0048.JPG"), "48")
            .serve(&url("IMG_0049.JPG"), "49")
            .serve(&url("IMG_0051.JPG"), "51")
            .serve(&url("IMG_0052.JPG"), "52");
        let (manager, origin) = manager(origin, test_config()).await;

        let response = manager.handle_image(&key("IMG_0050.JPG")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::Miss);
        assert_eq!(body_of(response).await, Bytes::from_static(b"fifty"));

        let metadata = manager.images().metadata().get().await;
        let record = metadata.get(&url("IMG_0050.JPG")).unwrap();
        assert!(record.last_access > 0);
        assert!(record.retry_count.is_none());

        manager.drain_background().await;
        assert_eq!(manager.images().len().await.unwrap(), 5);
        assert_eq!(origin.call_count(&url("IMG_0048.JPG")), 1);

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.prefetched, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hit_returns_cached_and_refreshes() {
        let origin = ScriptedOrigin::new().serve(&url("IMG_0001.JPG"), "v1");
        let (manager, origin) = manager(origin, test_config()).await;

        manager.handle_image(&key("IMG_0001.JPG")).await.unwrap();
        manager.drain_background().await;
        let calls_after_miss = origin.call_count(&url("IMG_0001.JPG"));

        let response = manager.handle_image(&key("IMG_0001.JPG")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Hit);
        assert_eq!(body_of(response).await, Bytes::from_static(b"v1"));

        manager.drain_background().await;
        assert_eq!(origin.call_count(&url("IMG_0001.JPG")), calls_after_miss + 1);

        let stats = manager.stats().await.unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.refreshes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_fetch_serves_fallback() {
        let origin = ScriptedOrigin::new().always_fail(&url("IMG_0007.JPG"));
        let (manager, origin) = manager(origin, test_config()).await;

        let response = manager.handle_image(&key("IMG_0007.JPG")).await.unwrap();
        assert!(response.is_fallback());
        assert_eq!(response.status, 503);
        assert_eq!(response.content_type.as_deref(), Some("image/png"));
        assert_eq!(&body_of(response).await[..], FALLBACK_PNG);

        assert!(!manager.images().contains(&key("IMG_0007.JPG")).await.unwrap());
        assert_eq!(origin.call_count(&url("IMG_0007.JPG")), 3);
        assert_eq!(manager.stats().await.unwrap().fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_holds_after_misses() {
        let config = CacheConfig {
            max_image_entries: 3,
            prefetch_radius: 0,
            ..test_config()
        };
        let mut origin = ScriptedOrigin::new();
        for i in 1..=6 {
            origin = origin.serve(&url(&format!("photo{}.png", i)), "png");
        }
        let (manager, _) = manager(origin, config).await;

        for i in 1..=6 {
            manager
                .handle_image(&key(&format!("photo{}.png", i)))
                .await
                .unwrap();
            assert!(manager.images().len().await.unwrap() <= 3);
        }
        manager.drain_background().await;
        assert_eq!(manager.stats().await.unwrap().evictions, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_all_get_their_image() {
        let config = CacheConfig {
            max_image_entries: 1,
            ..test_config()
        };
        let mut origin = ScriptedOrigin::new();
        for i in 0..40 {
            origin = origin.serve(&url(&format!("p{}.png", i)), format!("png-{}", i));
        }
        let (manager, _) = manager(origin, config).await;

        let mut handles = Vec::new();
        for i in 0..40 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move {
                let response = manager.handle_image(&key(&format!("p{}.png", i))).await;
                (i, response)
            }));
        }

        for handle in handles {
            let (i, response) = handle.await.unwrap();
            let response = response.unwrap();
            assert_eq!(response.source, ResponseSource::Miss);
            assert_eq!(body_of(response).await, Bytes::from(format!("png-{}", i)));
        }

        manager.drain_background().await;
        assert!(manager.images().len().await.unwrap() <= 1);
    }

    #[tokio::test]
    async fn test_activate_deletes_stale_stores() {
        let storage = Arc::new(MemoryStorage::new());
        storage.open("images-v8-smart-gallery").await.unwrap();
        storage.open("images-test").await.unwrap();

        let origin: Arc<dyn OriginFetch> = Arc::new(ScriptedOrigin::new());
        ImageCacheManager::activate(storage.clone(), origin, test_config())
            .await
            .unwrap();

        let mut names = storage.names().await.unwrap();
        names.sort();
        assert_eq!(names, vec!["images-test", "meta-test", "static-test"]);
    }

    #[tokio::test]
    async fn test_static_network_first_then_cache() {
        let origin = ScriptedOrigin::new().serve(&url("index.html"), "<html>");
        let (manager, _) = manager(origin, test_config()).await;

        let response = manager.handle_static(&key("index.html")).await.unwrap();
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(body_of(response).await, Bytes::from_static(b"<html>"));
        manager.drain_background().await;

        assert!(manager.static_cache().contains(&key("index.html")).await.unwrap());
    }

    #[tokio::test]
    async fn test_static_falls_back_to_cache_then_errors() {
        let origin = ScriptedOrigin::new();
        let (manager, _) = manager(origin, test_config()).await;

        let result = manager.handle_static(&key("about.html")).await;
        assert!(matches!(result, Err(CacheError::Upstream(_))));

        manager
            .static_cache()
            .put(
                &key("about.html"),
                OriginResponse::from_bytes(200, crate::fetch::ResponseKind::Basic, None, "cached"),
            )
            .await
            .unwrap();
        let response = manager.handle_static(&key("about.html")).await.unwrap();
        assert_eq!(response.source, ResponseSource::StaticCache);
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let origin = ScriptedOrigin::new().serve(&url(""), "root");
        let (manager, _) = manager(origin, test_config()).await;

        let keys = vec![key(""), key("missing.css")];
        assert!(manager.install(&keys).await.is_err());
        assert_eq!(manager.static_cache().len().await.unwrap(), 0);

        assert_eq!(manager.install(&keys[..1]).await.unwrap(), 1);
        assert!(manager.static_cache().contains(&key("")).await.unwrap());
    }

    #[tokio::test]
    async fn test_bypass_is_not_handled() {
        let (manager, origin) = manager(ScriptedOrigin::new(), test_config()).await;
        let request = InterceptedRequest {
            method: Method::PUT,
            ..InterceptedRequest::get(key("IMG_0001.JPG"))
        };

        assert!(manager.handle(&request).await.unwrap().is_none());
        assert!(origin.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_prefetch_message() {
        let origin = ScriptedOrigin::new()
            .serve(&url("IMG_0002.JPG"), "2")
            .serve(&url("IMG_0003.JPG"), "3");
        let (manager, _) = manager(origin, test_config()).await;

        manager
            .handle_message(ClientMessage::PrefetchImages {
                url: url("IMG_0001.JPG"),
            })
            .unwrap();
        manager.drain_background().await;

        assert!(manager.images().contains(&key("IMG_0002.JPG")).await.unwrap());
        assert!(manager.images().contains(&key("IMG_0003.JPG")).await.unwrap());
        assert!(!manager.images().contains(&key("IMG_0001.JPG")).await.unwrap());
    }

    #[tokio::test]
    async fn test_bad_message_url() {
        let (manager, _) = manager(ScriptedOrigin::new(), test_config()).await;
        let result = manager.handle_message(ClientMessage::PrefetchImages {
            url: "not a url".to_string(),
        });
        assert!(matches!(result, Err(CacheError::InvalidKey(_))));
    }
}
