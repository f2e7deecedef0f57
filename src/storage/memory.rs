//! In-memory storage backend.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::BytesMut;
use futures::StreamExt;
use tokio::sync::RwLock;

use crate::body::BodyStream;
use crate::cache::CacheEntry;
use crate::error::{CacheError, Result};
use crate::storage::{CacheStorage, Store};

/// Stores kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>> {
        let mut stores = self.stores.write().await;
        let store: Arc<dyn Store> = stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryStore::default()))
            .clone();
        Ok(store)
    }

    async fn names(&self) -> Result<Vec<String>> {
        Ok(self.stores.read().await.keys().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.stores.write().await.remove(name).is_some())
    }
}

/// A single in-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn put(&self, key: &str, content_type: Option<String>, mut body: BodyStream) -> Result<()> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|err| {
                CacheError::Upstream(format!("body for {} ended early: {}", key, err))
            })?;
            buf.extend_from_slice(&chunk);
        }

        let entry = CacheEntry::new(key, buf.freeze(), content_type);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }
}
