//! Prefetch Planner
//!
//! Gallery images are numbered (`IMG_0050.JPG`), so the images a visitor is
//! likely to open next are the ones with adjacent numbers. The planner derives
//! those sibling keys and pulls any that are not cached yet.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::cache::{ImageCache, ResourceKey};
use crate::error::Result;
use crate::fetch::RetryFetcher;

fn file_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)IMG_(?P<index>\d+)\.(?P<ext>jpg)").expect("static pattern compiles")
    })
}

// == Planning ==
/// Returns the sibling keys within `radius` of `observed`.
///
/// The index is parsed from the file name; siblings keep the observed digit
/// width (at least four), prefix, suffix and extension. The observed index
/// and indices below 1 are skipped. Non-matching names yield nothing.
pub fn sibling_keys(observed: &ResourceKey, radius: u32) -> Vec<ResourceKey> {
    let file_name = observed.file_name();
    let Some(caps) = file_pattern().captures(file_name) else {
        return Vec::new();
    };
    let Some(digits) = caps.name("index") else {
        return Vec::new();
    };
    let Ok(current) = digits.as_str().parse::<i64>() else {
        return Vec::new();
    };

    let width = digits.as_str().len().max(4);
    let prefix = &file_name[..digits.start()];
    let suffix = &file_name[digits.end()..];

    let radius = i64::from(radius);
    let low = current.saturating_sub(radius).max(1);
    let high = current.saturating_add(radius);
    let mut siblings = Vec::new();
    for index in low..=high {
        if index == current {
            continue;
        }
        let name = format!("{}{:0width$}{}", prefix, index, suffix, width = width);
        match observed.with_file_name(&name) {
            Ok(key) => siblings.push(key),
            Err(err) => debug!("Skipping sibling {}: {}", name, err),
        }
    }
    siblings
}

// == Prefetch Planner ==
/// Fetches the neighbors of observed images into the image cache.
#[derive(Clone)]
pub struct PrefetchPlanner {
    radius: u32,
    images: ImageCache,
    fetcher: RetryFetcher,
}

impl PrefetchPlanner {
    /// Creates a planner with a window of `radius` on each side.
    pub fn new(radius: u32, images: ImageCache, fetcher: RetryFetcher) -> Self {
        Self {
            radius,
            images,
            fetcher,
        }
    }

    /// Sibling keys of `observed` under this planner's window.
    pub fn plan(&self, observed: &ResourceKey) -> Vec<ResourceKey> {
        sibling_keys(observed, self.radius)
    }

    // == Plan And Fetch ==
    /// Fetches and stores every uncached sibling of `observed`, then enforces
    /// capacity once. Returns the number of entries stored and evicted.
    ///
    /// Individual sibling failures are logged and skipped.
    pub async fn plan_and_fetch(&self, observed: &ResourceKey) -> Result<PrefetchReport> {
        let siblings = self.plan(observed);
        if siblings.is_empty() {
            debug!("No prefetch pattern match for {}", observed);
            return Ok(PrefetchReport::default());
        }

        let mut report = PrefetchReport::default();
        for sibling in siblings {
            match self.prefetch_one(&sibling).await {
                Ok(true) => report.stored += 1,
                Ok(false) => {}
                Err(err) => warn!("Prefetch of {} failed: {}", sibling, err),
            }
        }

        if report.stored > 0 {
            report.evicted = self.images.enforce_capacity().await?;
        }
        info!(
            "Prefetch done for {}: {} stored, {} evicted",
            observed, report.stored, report.evicted
        );
        Ok(report)
    }

    async fn prefetch_one(&self, key: &ResourceKey) -> Result<bool> {
        if self.images.contains(key).await? {
            return Ok(false);
        }
        match self.fetcher.fetch(key).await? {
            Some(response) => {
                self.images.store(key, response).await?;
                debug!("Prefetched and cached {}", key);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Outcome of one prefetch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Siblings fetched and stored
    pub stored: usize,
    /// Entries evicted afterwards
    pub evicted: usize,
}
