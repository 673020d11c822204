//! Live filesystem watching.
//!
//! [`LiveWatch`] subscribes to creation notifications under the watch
//! directory and hands each new file to a worker on the blocking pool, so a
//! long stability wait never delays detection of the next arrival.

use crate::config::{CompiledConfig, ExclusionSet};
use crate::file_organizer::{CandidateFile, MoveOutcome, Mover, SkipReason};
use crate::output::RunSummary;
use notify::event::CreateKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Errors that prevent live watching from starting.
#[derive(Debug)]
pub enum WatchError {
    /// The platform notification backend could not be created.
    Unavailable(notify::Error),
    /// The backend exists but refused to watch the directory.
    SubscriptionFailed { path: PathBuf, source: notify::Error },
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(e) => {
                write!(f, "Filesystem notifications are unavailable: {}", e)
            }
            Self::SubscriptionFailed { path, source } => {
                write!(f, "Failed to watch {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for WatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Unavailable(e) => Some(e),
            Self::SubscriptionFailed { source, .. } => Some(source),
        }
    }
}

/// Spawns one worker per candidate, optionally capped by a semaphore.
///
/// Without a cap every arrival gets its own worker immediately. With a cap,
/// excess workers wait for a permit before starting their stability wait.
pub struct TaskDispatcher {
    tasks: JoinSet<Option<MoveOutcome>>,
    permits: Option<Arc<Semaphore>>,
}

impl TaskDispatcher {
    pub fn new(max_concurrent: Option<usize>) -> Self {
        Self {
            tasks: JoinSet::new(),
            permits: max_concurrent.map(|limit| Arc::new(Semaphore::new(limit))),
        }
    }

    pub fn dispatch(&mut self, mover: Arc<Mover>, candidate: CandidateFile) {
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };
            let path = candidate.path.clone();
            let worker = tokio::task::spawn_blocking(move || {
                let outcome = mover.process(&candidate);
                outcome.log();
                outcome
            });
            match worker.await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    error!(error = %e, "Worker for {} did not complete", path.display());
                    None
                }
            }
        });
    }

    /// Waits for the next worker to finish and returns its outcome.
    ///
    /// Returns `None` once no workers are left.
    pub async fn next_finished(&mut self) -> Option<MoveOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(Some(outcome)) => return Some(outcome),
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Worker task aborted"),
            }
        }
        None
    }

    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Detaches all in-flight workers; they finish or die with the process.
    pub fn abandon(mut self) -> usize {
        let in_flight = self.tasks.len();
        self.tasks.detach_all();
        in_flight
    }
}

/// An active subscription to creation events under the watch directory.
///
/// The subscription starts when the value is built; events arriving before
/// [`LiveWatch::run`] is called are buffered.
///
/// Files appearing below a top-level managed folder are the organizer's own
/// moves and are ignored, so a recursive watch never picks them up again.
pub struct LiveWatch {
    root: PathBuf,
    canonical_root: Option<PathBuf>,
    recursive: bool,
    managed_folders: HashSet<String>,
    exclusions: ExclusionSet,
    watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    dispatcher: TaskDispatcher,
}

impl LiveWatch {
    /// Subscribes to `root`.
    ///
    /// # Errors
    ///
    /// Returns a `WatchError` if the notification backend cannot be created
    /// or refuses the directory. There is no polling fallback.
    pub fn new<I>(
        root: impl Into<PathBuf>,
        recursive: bool,
        managed_folders: I,
        exclusions: ExclusionSet,
        max_concurrent_jobs: Option<usize>,
    ) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = String>,
    {
        let root = root.into();
        let (tx, events) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |result: notify::Result<Event>| {
                let _ = tx.send(result);
            },
            Config::default(),
        )
        .map_err(WatchError::Unavailable)?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(&root, mode)
            .map_err(|source| WatchError::SubscriptionFailed {
                path: root.clone(),
                source,
            })?;

        let canonical_root = fs::canonicalize(&root).ok().filter(|c| *c != root);

        Ok(Self {
            root,
            canonical_root,
            recursive,
            managed_folders: managed_folders.into_iter().collect(),
            exclusions,
            watcher,
            events,
            dispatcher: TaskDispatcher::new(max_concurrent_jobs),
        })
    }

    pub fn from_config(config: &CompiledConfig) -> Result<Self, WatchError> {
        Self::new(
            &config.watch_dir,
            config.recursive,
            config.classifier.category_names(),
            config.exclusions.clone(),
            config.max_concurrent_jobs,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Dispatches creation events until `shutdown` resolves.
    ///
    /// On shutdown the subscription is torn down first; workers still in
    /// flight are not cancelled.
    pub async fn run<F>(self, mover: Arc<Mover>, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        let LiveWatch {
            root,
            canonical_root,
            recursive,
            managed_folders,
            exclusions,
            watcher,
            mut events,
            mut dispatcher,
        } = self;

        info!(recursive, "Monitoring {}...", root.display());

        let mut summary = RunSummary::default();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                received = events.recv() => match received {
                    Some(Ok(event)) => {
                        for path in created_files(event) {
                            let organized = inside_managed_folder(&root, &path, &managed_folders)
                                || canonical_root.as_deref().is_some_and(|canonical| {
                                    inside_managed_folder(canonical, &path, &managed_folders)
                                });
                            if organized {
                                debug!("Ignoring organized file {}", path.display());
                                continue;
                            }
                            if let Some(outcome) = excluded(&exclusions, &path) {
                                outcome.log();
                                summary.record(&outcome);
                                continue;
                            }
                            debug!("Dispatching {}", path.display());
                            dispatcher.dispatch(Arc::clone(&mover), CandidateFile::new(path));
                        }
                    }
                    Some(Err(e)) => warn!(error = %e, "Filesystem watch error"),
                    None => {
                        warn!("Filesystem notification channel closed");
                        break;
                    }
                },
                Some(outcome) = dispatcher.next_finished(), if !dispatcher.is_idle() => {
                    summary.record(&outcome);
                }
            }
        }

        drop(watcher);
        let abandoned = dispatcher.abandon();
        if abandoned > 0 {
            info!(abandoned, "Stopped watching with workers still in flight");
        }
        info!("Stopped monitoring {}: {}", root.display(), summary);
        summary
    }
}

/// Non-directory paths named by a creation event.
fn created_files(event: Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event
            .paths
            .into_iter()
            .filter(|path| !path.is_dir())
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether `path` lies below a top-level managed folder of `root`.
///
/// A direct child of `root` never counts, even when it is named like a
/// managed folder.
fn inside_managed_folder(root: &Path, path: &Path, managed_folders: &HashSet<String>) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(first)), Some(_)) => {
            managed_folders.contains(first.to_string_lossy().as_ref())
        }
        _ => false,
    }
}

fn excluded(exclusions: &ExclusionSet, path: &Path) -> Option<MoveOutcome> {
    let file_name = path.file_name()?.to_string_lossy();
    let pattern = exclusions.matching(&file_name)?;
    Some(MoveOutcome::Skipped {
        path: path.to_path_buf(),
        reason: SkipReason::Excluded {
            pattern: pattern.to_string(),
        },
    })
}
