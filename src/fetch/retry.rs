//! Retry Fetcher
//!
//! Origin fetches with bounded exponential backoff. The attempt counter of
//! each key lives in the metadata store, so it survives across triggers and
//! is only reset by a successful fetch.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::{MetadataStore, ResourceKey};
use crate::config::CacheConfig;
use crate::error::Result;
use crate::fetch::{FetchMode, OriginFetch, OriginResponse};

/// Default maximum number of attempts per key.
pub const MAX_RETRY: u32 = 3;

/// Default base delay of the backoff.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(200);

/// Delay after the `attempt`-th failure: `base * 2^(attempt - 1)`.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor)
}

// == Retry Fetcher ==
/// Fetches from the origin, retrying with backoff.
#[derive(Clone)]
pub struct RetryFetcher {
    origin: Arc<dyn OriginFetch>,
    metadata: MetadataStore,
    max_retry: u32,
    base_delay: Duration,
    opaque_fallback: bool,
}

impl RetryFetcher {
    /// Creates a fetcher using the retry settings from `config`.
    pub fn new(origin: Arc<dyn OriginFetch>, metadata: MetadataStore, config: &CacheConfig) -> Self {
        Self {
            origin,
            metadata,
            max_retry: config.max_retry,
            base_delay: config.retry_base_delay,
            opaque_fallback: config.opaque_fallback,
        }
    }

    // == Fetch ==
    /// Fetches `key`, returning `None` once the attempts are exhausted.
    ///
    /// Counting resumes from the stored counter, so a key that already used
    /// up its attempts returns `None` without touching the origin. Errors are
    /// only returned for metadata persistence failures.
    pub async fn fetch(&self, key: &ResourceKey) -> Result<Option<OriginResponse>> {
        let mut attempt = self.metadata.get().await.retry_count(key.as_str());

        while attempt < self.max_retry {
            if let Some(response) = self.try_once(key).await {
                self.metadata
                    .update(|m| m.clear_retry(key.as_str()))
                    .await?;
                info!(
                    "Fetched {} on attempt {} ({:?})",
                    key,
                    attempt + 1,
                    response.kind
                );
                return Ok(Some(response));
            }

            attempt += 1;
            self.metadata
                .update(|m| m.set_retry(key.as_str(), attempt))
                .await?;

            let delay = backoff_delay(self.base_delay, attempt);
            debug!(
                "Retry attempt {} for {}, delaying {}ms",
                attempt,
                key,
                delay.as_millis()
            );
            tokio::time::sleep(delay).await;
        }

        warn!("Failed all {} attempts for {}", self.max_retry, key);
        Ok(None)
    }

    /// One attempt: CORS first, then no-cors when enabled.
    async fn try_once(&self, key: &ResourceKey) -> Option<OriginResponse> {
        match self.origin.fetch(key.url(), FetchMode::Cors).await {
            Ok(response) if response.is_acceptable() => return Some(response),
            Ok(response) => debug!("Rejected {} with status {}", key, response.status),
            Err(err) => debug!("CORS fetch of {} failed: {}", key, err),
        }

        if !self.opaque_fallback {
            return None;
        }

        match self.origin.fetch(key.url(), FetchMode::NoCors).await {
            Ok(response) if response.is_acceptable() => Some(response),
            Ok(response) => {
                debug!("Rejected no-cors {} with status {}", key, response.status);
                None
            }
            Err(err) => {
                debug!("No-cors fetch of {} failed: {}", key, err);
                None
            }
        }
    }
}
