//! Storage Module
//!
//! Named, durable key/value stores holding complete response bodies.
//!
//! A [`CacheStorage`] owns a set of named stores; each [`Store`] maps string
//! keys to [`CacheEntry`] values. Writes consume a body stream and only ever
//! persist complete entries: a body that fails mid-stream leaves the previous
//! value (or nothing) in place.

mod disk;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::body::BodyStream;
use crate::cache::CacheEntry;
use crate::error::Result;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

// == Store ==
/// A single named store.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the entry stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Returns true if an entry is stored under `key`.
    async fn contains(&self, key: &str) -> Result<bool>;

    /// Stores `body` under `key`, replacing any previous entry once the body
    /// has been fully drained.
    ///
    /// A body stream error is reported as [`CacheError::Upstream`] and leaves
    /// no entry behind.
    ///
    /// [`CacheError::Upstream`]: crate::error::CacheError::Upstream
    async fn put(&self, key: &str, content_type: Option<String>, body: BodyStream) -> Result<()>;

    /// Lists all stored keys.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Deletes the entry under `key`, returning whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

// == Cache Storage ==
/// A collection of named stores.
#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Opens (creating if needed) the store called `name`.
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>>;

    /// Lists the names of all existing stores.
    async fn names(&self) -> Result<Vec<String>>;

    /// Deletes the store called `name` and everything in it.
    async fn delete(&self, name: &str) -> Result<bool>;
}
