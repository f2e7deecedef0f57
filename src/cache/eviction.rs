//! Eviction Policy Module
//!
//! Least-recently-used eviction over the content store, ordered by the
//! last-access times in the metadata store.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::cache::{ContentCache, MetadataStore, ResourceKey};
use crate::error::Result;

// == Eviction Policy ==
/// Keeps the content store within a maximum entry count.
#[derive(Clone)]
pub struct EvictionPolicy {
    content: ContentCache,
    metadata: MetadataStore,
    sweep: Arc<Mutex<()>>,
}

impl EvictionPolicy {
    /// Creates a policy over a content store and its metadata.
    pub fn new(content: ContentCache, metadata: MetadataStore) -> Self {
        Self {
            content,
            metadata,
            sweep: Arc::new(Mutex::new(())),
        }
    }

    /// Holds off sweeps while the guard lives. Writers take it so that a
    /// content write and its metadata record land between sweeps.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.sweep.lock().await
    }

    // == Enforce ==
    /// Deletes the least recently used entries until at most `max` remain.
    ///
    /// Keys without a metadata record count as never accessed. Equal access
    /// times are ordered by key. Each victim loses both its content entry and
    /// its metadata record. Returns the evicted keys, oldest first.
    pub async fn enforce(&self, max: usize) -> Result<Vec<ResourceKey>> {
        let _sweep = self.sweep.lock().await;

        let keys = self.content.keys().await?;
        if keys.len() <= max {
            debug!("Cache size under limit ({}/{})", keys.len(), max);
            return Ok(Vec::new());
        }

        let metadata = self.metadata.get().await;
        let mut ranked: Vec<(u64, ResourceKey)> = keys
            .into_iter()
            .map(|key| (metadata.last_access(key.as_str()), key))
            .collect();
        ranked.sort();

        let excess = ranked.len() - max;
        let victims: Vec<ResourceKey> = ranked.into_iter().take(excess).map(|(_, k)| k).collect();

        let mut deleted = Vec::with_capacity(victims.len());
        let mut failure = None;
        for key in victims {
            match self.content.delete(&key).await {
                Ok(_) => deleted.push(key),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        // Drop metadata for whatever was deleted, even if a later delete failed
        self.metadata
            .update(|m| {
                for key in &deleted {
                    m.remove(key.as_str());
                }
            })
            .await?;

        if let Some(err) = failure {
            return Err(err);
        }

        info!("Evicted {} entries", deleted.len());
        Ok(deleted)
    }
}
