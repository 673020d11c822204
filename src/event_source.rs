//! The two ways candidates are produced: a one-shot scan or a live watch.

use crate::config::CompiledConfig;
use crate::file_organizer::Mover;
use crate::output::RunSummary;
use crate::scanner::BatchScan;
use crate::watcher::{LiveWatch, WatchError};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::error;

/// A producer of candidate files that feeds them to a [`Mover`] until it is done.
pub enum EventSource {
    /// Enumerates the watch directory once and then finishes.
    BatchScan(BatchScan),
    /// Reacts to newly created files until shut down.
    LiveWatch(LiveWatch),
}

impl EventSource {
    pub fn batch(config: &CompiledConfig) -> Self {
        Self::BatchScan(BatchScan::from_config(config))
    }

    /// Subscribes to the watch directory.
    ///
    /// # Errors
    ///
    /// Returns a `WatchError` if notifications cannot be set up.
    pub fn live(config: &CompiledConfig) -> Result<Self, WatchError> {
        LiveWatch::from_config(config).map(Self::LiveWatch)
    }

    pub fn root(&self) -> &Path {
        match self {
            Self::BatchScan(scan) => scan.root(),
            Self::LiveWatch(watch) => watch.root(),
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::LiveWatch(_))
    }

    /// Runs to completion.
    ///
    /// A batch scan ignores `shutdown` and returns once every file has been
    /// processed; a live watch returns when `shutdown` resolves.
    pub async fn run<F>(self, mover: Arc<Mover>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        match self {
            Self::BatchScan(scan) => {
                match tokio::task::spawn_blocking(move || scan.run(&mover)).await {
                    Ok(summary) => summary,
                    Err(e) => {
                        error!(error = %e, "Batch scan did not complete");
                        RunSummary::default()
                    }
                }
            }
            Self::LiveWatch(watch) => watch.run(mover, shutdown).await,
        }
    }
}
