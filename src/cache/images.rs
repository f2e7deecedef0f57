//! Image Cache
//!
//! Pairs the image content store with its metadata so that every read and
//! write updates the last-access record, and runs eviction after writes.

use tracing::debug;

use crate::body;
use crate::cache::{
    current_timestamp_ms, CacheEntry, ContentCache, EvictionPolicy, MetadataStore, ResourceKey,
};
use crate::error::{CacheError, Result};
use crate::fetch::OriginResponse;

/// Content, metadata and eviction for the image store.
#[derive(Clone)]
pub struct ImageCache {
    content: ContentCache,
    metadata: MetadataStore,
    eviction: EvictionPolicy,
    capacity: usize,
}

impl ImageCache {
    /// Creates the cache with a maximum entry count.
    pub fn new(content: ContentCache, metadata: MetadataStore, capacity: usize) -> Self {
        let eviction = EvictionPolicy::new(content.clone(), metadata.clone());
        Self {
            content,
            metadata,
            eviction,
            capacity,
        }
    }

    /// The underlying content store.
    pub fn content(&self) -> &ContentCache {
        &self.content
    }

    /// The underlying metadata store.
    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    /// Maximum entry count.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Lookup ==
    /// Returns the entry for `key`, recording the access on a hit.
    pub async fn lookup(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        let _sweep = self.eviction.lock().await;
        let entry = self.content.matches(key).await?;
        if entry.is_some() {
            self.record_access(key).await?;
        }
        Ok(entry)
    }

    /// Returns true if `key` has an entry, without recording an access.
    pub async fn contains(&self, key: &ResourceKey) -> Result<bool> {
        self.content.contains(key).await
    }

    // == Store ==
    /// Drains the response body, then writes the entry and its metadata record
    /// without a sweep in between. Returns the stored entry.
    ///
    /// The returned entry is built from the drained bytes, so it stays valid
    /// even if a later sweep evicts the key. A body that fails mid-stream is
    /// reported as [`CacheError::Upstream`] and nothing is written.
    pub async fn store(&self, key: &ResourceKey, response: OriginResponse) -> Result<CacheEntry> {
        let bytes = body::collect(response.body).await.map_err(|err| {
            CacheError::Upstream(format!("body for {} ended early: {}", key, err))
        })?;
        let entry = CacheEntry::new(key.as_str(), bytes.clone(), response.content_type.clone());

        let _sweep = self.eviction.lock().await;
        let complete = OriginResponse {
            status: response.status,
            kind: response.kind,
            content_type: response.content_type,
            body: body::full(bytes),
        };
        self.content.put(key, complete).await?;
        self.record_access(key).await?;
        debug!("Stored {}", key);
        Ok(entry)
    }

    /// Records an access of `key` now if it is cached. Returns whether it was.
    pub async fn touch(&self, key: &ResourceKey) -> Result<bool> {
        let _sweep = self.eviction.lock().await;
        if !self.content.contains(key).await? {
            return Ok(false);
        }
        self.record_access(key).await?;
        Ok(true)
    }

    async fn record_access(&self, key: &ResourceKey) -> Result<()> {
        let now = current_timestamp_ms();
        self.metadata.update(|m| m.touch(key.as_str(), now)).await
    }

    // == Enforce Capacity ==
    /// Evicts down to capacity, returning how many entries were removed.
    pub async fn enforce_capacity(&self) -> Result<usize> {
        Ok(self.eviction.enforce(self.capacity).await?.len())
    }

    /// Number of cached images.
    pub async fn len(&self) -> Result<usize> {
        self.content.len().await
    }
}
