//! Cache Entry Module
//!
//! Defines a stored response body together with the details needed to serve it.

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;

// == Cache Entry ==
/// A complete, stored response body.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Resource key the entry was stored under
    pub key: String,
    /// Stored payload
    pub body: Bytes,
    /// Content type reported by the origin, if any
    pub content_type: Option<String>,
    /// Storage timestamp (Unix milliseconds)
    pub stored_at: u64,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(key: impl Into<String>, body: Bytes, content_type: Option<String>) -> Self {
        Self {
            key: key.into(),
            body,
            content_type,
            stored_at: current_timestamp_ms(),
        }
    }

    /// Payload size in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
