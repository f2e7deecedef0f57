//! Cache Module
//!
//! Content store, metadata index and LRU eviction for cached images.

mod content;
mod entry;
mod eviction;
mod images;
mod key;
mod metadata;
mod stats;


// Re-export public types
pub use content::ContentCache;
pub use entry::{current_timestamp_ms, CacheEntry};
pub use eviction::EvictionPolicy;
pub use images::ImageCache;
pub use key::ResourceKey;
pub use metadata::{MetadataMap, MetadataRecord, MetadataStore, METADATA_SLOT};
pub use stats::CacheStats;

// == Public Constants ==
/// 1x1 transparent PNG served when an image cannot be fetched.
pub const FALLBACK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x04, 0x00, 0x00, 0x00, 0xB5,
    0x1C, 0x0C, 0x02, 0x00, 0x00, 0x00, 0x0B, 0x49, 0x44, 0x41, 0x54, 0x08, 0x99, 0x63, 0x60,
    0x60, 0x00, 0x00, 0x00, 0x03, 0x00, 0x01, 0x68, 0x26, 0x59, 0x0D, 0x00, 0x00, 0x00, 0x00,
    0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];
