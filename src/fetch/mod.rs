//! Fetch Module
//!
//! Origin access and the retrying fetcher built on top of it.

mod origin;
mod retry;

#[cfg(test)]
pub(crate) mod testing;

pub use origin::{FetchError, FetchMode, HttpOrigin, OriginFetch, OriginResponse, ResponseKind};
pub use retry::{backoff_delay, RetryFetcher, MAX_RETRY, RETRY_BASE_DELAY};
