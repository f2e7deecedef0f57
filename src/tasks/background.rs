//! Background Task Tracker
//!
//! Refreshes and prefetches run detached from the request that triggered
//! them. Their errors are logged here and never reach the request.

use std::future::Future;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::Result;

/// Spawns and tracks detached work.
#[derive(Debug, Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
}

impl BackgroundTasks {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Spawns `task`, logging its error under `label` instead of propagating it.
    ///
    /// # Returns
    /// A JoinHandle for the spawned task; dropping it does not cancel the task.
    pub fn spawn<F>(&self, label: impl Into<String>, task: F) -> JoinHandle<()>
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let label = label.into();
        self.tracker.spawn(async move {
            let started = Instant::now();
            match task.await {
                Ok(()) => debug!("{} finished in {:?}", label, started.elapsed()),
                Err(err) => warn!("{} failed: {}", label, err),
            }
        })
    }

    /// Number of tasks still running.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    /// Returns true if no task is running.
    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Waits until every task spawned so far has finished.
    ///
    /// Tasks spawned while waiting are awaited too; the tracker accepts new
    /// tasks afterwards.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }
}
