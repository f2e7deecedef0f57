//! Metadata Store Module
//!
//! Keeps the last-access time and retry counter of every resource key in a
//! single JSON document persisted under one slot of the metadata store.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::body;
use crate::error::Result;
use crate::storage::Store;

/// Slot the whole metadata document is stored under.
pub const METADATA_SLOT: &str = "metadata";

// == Metadata Record ==
/// Per-key bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Last read or write (Unix milliseconds), 0 if never cached
    #[serde(default)]
    pub last_access: u64,
    /// Failed fetch attempts since the last success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

// == Metadata Map ==
/// The full key to record mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataMap {
    records: BTreeMap<String, MetadataRecord>,
}

impl MetadataMap {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`.
    pub fn get(&self, key: &str) -> Option<&MetadataRecord> {
        self.records.get(key)
    }

    /// Last access of `key`, 0 when there is no record.
    pub fn last_access(&self, key: &str) -> u64 {
        self.records.get(key).map_or(0, |r| r.last_access)
    }

    /// Stored retry counter of `key`, 0 when absent.
    pub fn retry_count(&self, key: &str) -> u32 {
        self.records.get(key).and_then(|r| r.retry_count).unwrap_or(0)
    }

    /// Records an access at `now`.
    pub fn touch(&mut self, key: &str, now: u64) {
        self.records.entry(key.to_string()).or_default().last_access = now;
    }

    /// Stores a retry counter.
    pub fn set_retry(&mut self, key: &str, count: u32) {
        self.records.entry(key.to_string()).or_default().retry_count = Some(count);
    }

    /// Clears the retry counter, dropping records that carry nothing else.
    pub fn clear_retry(&mut self, key: &str) {
        if let Some(record) = self.records.get_mut(key) {
            record.retry_count = None;
            if record.last_access == 0 {
                self.records.remove(key);
            }
        }
    }

    /// Removes the whole record, retry counter included.
    pub fn remove(&mut self, key: &str) -> Option<MetadataRecord> {
        self.records.remove(key)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterates keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }
}

// == Metadata Store ==
/// Persistent metadata with serialized read-modify-write.
///
/// `get` and `set` operate on the raw slot with last-writer-wins semantics;
/// `update` runs a read-modify-write cycle under a store-wide lock so two
/// in-flight requests never lose each other's changes.
#[derive(Clone)]
pub struct MetadataStore {
    store: Arc<dyn Store>,
    lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    /// Wraps the store holding the metadata slot.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    // == Get ==
    /// Reads the mapping, substituting an empty one for a missing,
    /// unreadable or malformed slot.
    pub async fn get(&self) -> MetadataMap {
        let entry = match self.store.get(METADATA_SLOT).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return MetadataMap::new(),
            Err(err) => {
                warn!("Metadata unreadable, starting empty: {}", err);
                return MetadataMap::new();
            }
        };

        match serde_json::from_slice(&entry.body) {
            Ok(map) => map,
            Err(err) => {
                warn!("Metadata corrupt, starting empty: {}", err);
                MetadataMap::new()
            }
        }
    }

    // == Set ==
    /// Replaces the whole mapping.
    pub async fn set(&self, map: &MetadataMap) -> Result<()> {
        let json = serde_json::to_vec(map)?;
        self.store
            .put(
                METADATA_SLOT,
                Some("application/json".to_string()),
                body::full(json),
            )
            .await?;
        debug!("Saved metadata ({} records)", map.len());
        Ok(())
    }

    // == Update ==
    /// Atomically applies `f` to the mapping and persists the result.
    pub async fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut MetadataMap) -> T,
    {
        let _guard = self.lock.lock().await;
        let mut map = self.get().await;
        let out = f(&mut map);
        self.set(&map).await?;
        Ok(out)
    }
}
