//! Content Cache Module
//!
//! Response bodies keyed by resource key, written as streams.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::body;
use crate::cache::{CacheEntry, ResourceKey};
use crate::error::Result;
use crate::fetch::OriginResponse;
use crate::storage::Store;

// == Content Cache ==
/// A content store addressed by [`ResourceKey`].
#[derive(Clone)]
pub struct ContentCache {
    store: Arc<dyn Store>,
}

impl ContentCache {
    /// Wraps an opened store.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    // == Match ==
    /// Returns the stored entry for `key`.
    pub async fn matches(&self, key: &ResourceKey) -> Result<Option<CacheEntry>> {
        self.store.get(key.as_str()).await
    }

    /// Returns true if `key` has an entry.
    pub async fn contains(&self, key: &ResourceKey) -> Result<bool> {
        self.store.contains(key.as_str()).await
    }

    // == Put ==
    /// Streams the response body into the store, replacing any previous entry.
    pub async fn put(&self, key: &ResourceKey, response: OriginResponse) -> Result<()> {
        self.store
            .put(key.as_str(), response.content_type, response.body)
            .await?;
        debug!("Cached stream for {}", key);
        Ok(())
    }

    // == Put And Forward ==
    /// Tees the response: returns a response for the caller carrying the same
    /// bytes, plus a future that stores the other branch.
    ///
    /// Both halves must be driven concurrently; the caller's branch stays
    /// readable if the store fails, and the store still completes if the
    /// caller drops its branch.
    pub fn put_and_forward(
        &self,
        key: &ResourceKey,
        response: OriginResponse,
    ) -> (OriginResponse, impl Future<Output = Result<()>> + Send + 'static) {
        let (store_branch, caller_branch) = body::tee(response.body);
        let content_type = response.content_type.clone();

        let forwarded = OriginResponse {
            status: response.status,
            kind: response.kind,
            content_type: response.content_type,
            body: caller_branch,
        };

        let store = self.store.clone();
        let key = key.as_str().to_string();
        let write = async move {
            store.put(&key, content_type, store_branch).await?;
            debug!("Cached forwarded stream for {}", key);
            Ok(())
        };

        (forwarded, write)
    }

    // == Keys ==
    /// Lists the keys of all entries.
    pub async fn keys(&self) -> Result<Vec<ResourceKey>> {
        let raw = self.store.keys().await?;
        let mut keys = Vec::with_capacity(raw.len());
        for key in raw {
            match ResourceKey::parse(&key) {
                Ok(parsed) => keys.push(parsed),
                Err(err) => warn!("Ignoring foreign key '{}' in content store: {}", key, err),
            }
        }
        Ok(keys)
    }

    /// Number of entries.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.store.keys().await?.len())
    }

    // == Delete ==
    /// Removes the entry for `key`, returning whether it existed.
    pub async fn delete(&self, key: &ResourceKey) -> Result<bool> {
        self.store.delete(key.as_str()).await
    }
}
