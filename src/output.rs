//! Run summaries and console formatting.
//!
//! Every event source returns a [`RunSummary`]; batch passes print it with
//! [`OutputFormatter::summary_table`].

use crate::file_organizer::{MoveOutcome, OutcomeKind};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub moved: usize,
    pub planned: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Moved or planned files per destination category.
    pub by_category: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Counts one outcome.
    ///
    /// Moves and planned moves are also counted against their category.
    ///
    /// # Example
    ///
    /// ```
    /// use std::path::PathBuf;
    /// use tidywatch::{MoveOutcome, RunSummary, SkipReason};
    ///
    /// let mut summary = RunSummary::default();
    /// summary.record(&MoveOutcome::Moved {
    ///     source: PathBuf::from("/downloads/cat.png"),
    ///     destination: PathBuf::from("/downloads/Images/cat.png"),
    ///     category: "Images".to_string(),
    /// });
    /// summary.record(&MoveOutcome::Skipped {
    ///     path: PathBuf::from("/downloads/movie.part"),
    ///     reason: SkipReason::Temporary,
    /// });
    ///
    /// assert_eq!(summary.to_string(), "2 processed: 1 moved, 0 planned, 1 skipped, 0 failed");
    /// assert_eq!(summary.by_category.get("Images"), Some(&1));
    /// ```
    pub fn record(&mut self, outcome: &MoveOutcome) {
        match outcome.kind() {
            OutcomeKind::Moved => self.moved += 1,
            OutcomeKind::DryRunPlanned => self.planned += 1,
            OutcomeKind::Skipped => self.skipped += 1,
            OutcomeKind::Failed => self.failed += 1,
        }
        if let Some(category) = outcome.category() {
            *self.by_category.entry(category.to_string()).or_insert(0) += 1;
        }
    }

    /// Number of candidates processed.
    pub fn total(&self) -> usize {
        self.moved + self.planned + self.skipped + self.failed
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed: {} moved, {} planned, {} skipped, {} failed",
            self.total(),
            self.moved,
            self.planned,
            self.skipped,
            self.failed
        )
    }
}

/// Console output with consistent styling.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a section header in bold, preceded by a blank line.
    ///
    /// # Arguments
    ///
    /// * `header` - The header text to display
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Prints a dry-run notice message.
    ///
    /// The message is prefixed with `[DRY RUN]` and shown in yellow.
    ///
    /// # Arguments
    ///
    /// * `message` - The notice to display
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }

    /// Creates a progress bar for a batch pass.
    ///
    /// # Arguments
    ///
    /// * `total` - Initial length; a batch scan resets it once candidates are listed
    /// * `visible` - When false, a hidden bar is returned so callers need no branching
    ///
    /// # Example
    ///
    /// ```
    /// use tidywatch::output::OutputFormatter;
    ///
    /// let pb = OutputFormatter::create_progress_bar(10, false);
    /// assert!(pb.is_hidden());
    /// pb.inc(1);
    /// pb.finish_and_clear();
    /// ```
    pub fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
        if !visible {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Prints outcome counts followed by a per-category table.
    ///
    /// Planned and failed counts are only shown when non-zero; the category
    /// table is omitted when nothing was moved or planned.
    ///
    /// # Arguments
    ///
    /// * `summary` - The tally returned by an event source
    pub fn summary_table(summary: &RunSummary) {
        Self::header("SUMMARY");

        println!("{} {}", "✓ Moved:".green(), summary.moved);
        if summary.planned > 0 {
            println!("{} {}", "→ Planned:".yellow(), summary.planned);
        }
        println!("{} {}", "- Skipped:".cyan(), summary.skipped);
        if summary.failed > 0 {
            println!("{} {}", "✗ Failed:".red(), summary.failed);
        }

        if summary.by_category.is_empty() {
            return;
        }

        let max_category_len = summary
            .by_category
            .keys()
            .map(|name| name.len())
            .max()
            .unwrap_or(0)
            .max(8); // At least "Category" width

        println!();
        println!(
            "{:<width$} | {}",
            "Category".bold(),
            "Files".bold(),
            width = max_category_len
        );
        println!("{}", "-".repeat(max_category_len + 10));

        for (category, count) in &summary.by_category {
            let file_word = if *count == 1 { "file" } else { "files" };
            println!(
                "{:<width$} | {} {}",
                category,
                count.to_string().green(),
                file_word,
                width = max_category_len
            );
        }

        let organized: usize = summary.by_category.values().sum();
        println!("{}", "-".repeat(max_category_len + 10));
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            organized.to_string().green().bold(),
            if organized == 1 { "file" } else { "files" },
            width = max_category_len
        );
    }
}
