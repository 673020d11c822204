//! One-shot pass over the watch directory.

use crate::config::CompiledConfig;
use crate::file_organizer::{CandidateFile, Mover};
use crate::output::RunSummary;
use indicatif::ProgressBar;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::{DirEntry, WalkDir};

/// Walks the watch directory and feeds every file to a [`Mover`], one at a time.
///
/// Top-level folders named after a managed category are not descended into,
/// so files organized by an earlier run are left alone.
#[derive(Debug, Clone)]
pub struct BatchScan {
    root: PathBuf,
    recursive: bool,
    managed_folders: HashSet<String>,
    progress: ProgressBar,
}

impl BatchScan {
    pub fn new<I>(root: impl Into<PathBuf>, recursive: bool, managed_folders: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            root: root.into(),
            recursive,
            managed_folders: managed_folders.into_iter().collect(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn from_config(config: &CompiledConfig) -> Self {
        Self::new(
            &config.watch_dir,
            config.recursive,
            config.classifier.category_names(),
        )
    }

    /// Reports progress on `progress` while running.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the files a pass would process, in file-name order.
    pub fn candidates(&self) -> Vec<CandidateFile> {
        let max_depth = if self.recursive { usize::MAX } else { 1 };
        WalkDir::new(&self.root)
            .min_depth(1)
            .max_depth(max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !self.is_managed_folder(entry))
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry during scan");
                    None
                }
            })
            .filter(|entry| !entry.file_type().is_dir())
            .map(|entry| CandidateFile::new(entry.into_path()))
            .collect()
    }

    fn is_managed_folder(&self, entry: &DirEntry) -> bool {
        entry.depth() == 1
            && entry.file_type().is_dir()
            && self
                .managed_folders
                .contains(entry.file_name().to_string_lossy().as_ref())
    }

    /// Processes every candidate synchronously and returns the tally.
    pub fn run(&self, mover: &Mover) -> RunSummary {
        info!(
            recursive = self.recursive,
            "Running one-time organization on {}",
            self.root.display()
        );

        let candidates = self.candidates();
        self.progress.set_length(candidates.len() as u64);

        let mut summary = RunSummary::default();
        for candidate in &candidates {
            if let Some(name) = candidate.file_name() {
                self.progress.set_message(name);
            }
            let outcome = mover.process(candidate);
            outcome.log();
            summary.record(&outcome);
            self.progress.inc(1);
        }
        self.progress.finish_and_clear();

        info!("One-time organization finished: {}", summary);
        summary
    }
}
