//! Response DTOs
//!
//! JSON bodies for the proxy's control endpoints.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for GET /_cache/stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Cache version token
    pub version: String,
    /// Image store capacity
    pub capacity: usize,
    /// Image requests answered from the cache
    pub hits: u64,
    /// Image requests that went to the origin
    pub misses: u64,
    /// Requests answered with the fallback pixel
    pub fallbacks: u64,
    /// Entries evicted by the LRU policy
    pub evictions: u64,
    /// Completed background refreshes
    pub refreshes: u64,
    /// Entries stored by prefetching
    pub prefetched: u64,
    /// Current number of cached images
    pub total_entries: usize,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl StatsResponse {
    /// Creates a StatsResponse from cache statistics
    pub fn new(version: impl Into<String>, capacity: usize, stats: &CacheStats) -> Self {
        Self {
            version: version.into(),
            capacity,
            hits: stats.hits,
            misses: stats.misses,
            fallbacks: stats.fallbacks,
            evictions: stats.evictions,
            refreshes: stats.refreshes,
            prefetched: stats.prefetched,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for GET /_cache/health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Response body for an accepted client message
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub accepted: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_response_hit_rate() {
        let mut stats = CacheStats::new();
        for _ in 0..4 {
            stats.record_hit();
        }
        stats.record_miss();
        stats.set_total_entries(7);

        let resp = StatsResponse::new("v1", 300, &stats);
        assert!((resp.hit_rate - 0.8).abs() < 0.001);
        assert_eq!(resp.total_entries, 7);
        assert_eq!(resp.capacity, 300);
    }

    #[test]
    fn test_stats_response_zero_requests() {
        let resp = StatsResponse::new("v1", 10, &CacheStats::new());
        assert_eq!(resp.hit_rate, 0.0);
    }

    #[test]
    fn test_health_response_serialize() {
        let resp = HealthResponse::healthy();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("healthy"));
        assert!(json.contains("timestamp"));
    }

    #[test]
    fn test_message_response_serialize() {
        let json = serde_json::to_string(&MessageResponse::accepted("prefetch scheduled")).unwrap();
        assert!(json.contains(r#""accepted":true"#));
    }

    #[test]
    fn test_error_response_serialize() {
        let resp = ErrorResponse::new("Something went wrong");
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Something went wrong"));
    }
}
