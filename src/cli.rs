//! Command-line interface for tidywatch.
//!
//! This module parses the command line, layers its overrides on top of the
//! configuration document and drives either a one-time pass or a live watch.

use crate::config::{ConfigError, OrganizerConfig};
use crate::event_source::EventSource;
use crate::file_organizer::Mover;
use crate::logging::init_logging;
use crate::output::{OutputFormatter, RunSummary};
use crate::scanner::BatchScan;
use crate::watcher::WatchError;
use clap::Parser;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Organize a directory into category folders, once or continuously.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "tidywatch", version, about)]
pub struct Cli {
    /// Organize the existing contents once and exit (default)
    #[arg(long, conflicts_with = "watch")]
    pub once: bool,

    /// Keep running and organize files as they arrive
    #[arg(long)]
    pub watch: bool,

    /// Configuration file (TOML, or JSON when the name ends in .json)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory to organize, overriding `watch_dir`
    #[arg(long, value_name = "DIR")]
    pub dir: Option<String>,

    /// Report planned moves without touching any file
    #[arg(long)]
    pub dry_run: bool,

    /// Show a progress bar during a one-time pass
    #[arg(long)]
    pub progress: bool,
}

/// Which event source to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Once,
    Watch,
}

impl Cli {
    /// The selected event source; a one-time pass unless `--watch` is given.
    ///
    /// # Example
    ///
    /// ```
    /// use clap::Parser;
    /// use tidywatch::cli::{Cli, Mode};
    ///
    /// assert_eq!(Cli::parse_from(["tidywatch"]).mode(), Mode::Once);
    /// assert_eq!(Cli::parse_from(["tidywatch", "--watch"]).mode(), Mode::Watch);
    /// ```
    pub fn mode(&self) -> Mode {
        if self.watch { Mode::Watch } else { Mode::Once }
    }

    /// Applies command-line overrides to a loaded configuration.
    ///
    /// `--dir` replaces `watch_dir`. `--dry-run` can switch dry-run on but
    /// never off.
    ///
    /// # Arguments
    ///
    /// * `config` - The configuration loaded from file or defaults
    ///
    /// # Example
    ///
    /// ```
    /// use clap::Parser;
    /// use tidywatch::OrganizerConfig;
    /// use tidywatch::cli::Cli;
    ///
    /// let cli = Cli::parse_from(["tidywatch", "--dir", "/srv/drop", "--dry-run"]);
    /// let mut config = OrganizerConfig::default();
    /// cli.apply_overrides(&mut config);
    ///
    /// assert_eq!(config.watch_dir, "/srv/drop");
    /// assert!(config.dry_run);
    /// ```
    pub fn apply_overrides(&self, config: &mut OrganizerConfig) {
        if let Some(dir) = &self.dir {
            config.watch_dir = dir.clone();
        }
        if self.dry_run {
            config.dry_run = true;
        }
    }
}

/// Errors that stop a run before or while it starts.
#[derive(Debug)]
pub enum RunError {
    /// The configuration document could not be found, read or parsed.
    ConfigLoad(ConfigError),
    /// The configuration parsed but holds unusable values.
    InvalidConfig(ConfigError),
    /// The log file could not be opened.
    Logging(io::Error),
    WatchDirMissing(PathBuf),
    Watch(WatchError),
    /// The async runtime could not be started.
    Runtime(io::Error),
}

impl RunError {
    /// Whether the error was already written to the log before being returned.
    pub fn is_logged(&self) -> bool {
        !matches!(self, Self::ConfigLoad(_) | Self::Logging(_))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigLoad(e) | Self::InvalidConfig(e) => write!(f, "{}", e),
            Self::Logging(e) => write!(f, "Cannot open log file: {}", e),
            Self::WatchDirMissing(path) => {
                write!(f, "Watch directory does not exist: {}", path.display())
            }
            Self::Watch(e) => write!(f, "{}", e),
            Self::Runtime(e) => write!(f, "Cannot start async runtime: {}", e),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConfigLoad(e) | Self::InvalidConfig(e) => Some(e),
            Self::Logging(e) | Self::Runtime(e) => Some(e),
            Self::Watch(e) => Some(e),
            Self::WatchDirMissing(_) => None,
        }
    }
}

/// Runs the application for parsed command-line arguments.
///
/// This function:
/// 1. Loads the configuration and applies command-line overrides
/// 2. Initializes logging to the console and the configured log file
/// 3. Validates the configuration and checks the watch directory exists
/// 4. Runs a one-time pass, or watches until Ctrl-C
/// 5. Prints the summary table after a one-time pass
///
/// # Arguments
///
/// * `cli` - Parsed command-line arguments
///
/// # Errors
///
/// Returns a `RunError` for fatal startup failures. Per-file failures are
/// counted in the returned summary instead.
///
/// # Examples
///
/// ```no_run
/// use tidywatch::cli::{Cli, run_cli};
///
/// let cli = Cli {
///     dir: Some("/tmp/incoming".to_string()),
///     dry_run: true,
///     ..Default::default()
/// };
/// match run_cli(&cli) {
///     Ok(summary) => println!("{}", summary),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(cli: &Cli) -> Result<RunSummary, RunError> {
    let mut config = OrganizerConfig::load(cli.config.as_deref()).map_err(RunError::ConfigLoad)?;
    cli.apply_overrides(&mut config);

    let mode = cli.mode();
    let quiet_console = cli.progress && mode == Mode::Once;
    let _log_guard = init_logging(&config.log_file, quiet_console).map_err(RunError::Logging)?;

    let result = run_with_config(cli, mode, &config);
    if let Err(e) = &result {
        error!("{}", e);
    }
    result
}

fn run_with_config(
    cli: &Cli,
    mode: Mode,
    config: &OrganizerConfig,
) -> Result<RunSummary, RunError> {
    let compiled = config.compile().map_err(RunError::InvalidConfig)?;

    if !compiled.watch_dir.is_dir() {
        return Err(RunError::WatchDirMissing(compiled.watch_dir.clone()));
    }
    if compiled.dry_run {
        info!("Dry run: no files will be moved");
    }

    let source = match mode {
        Mode::Once => {
            let progress = OutputFormatter::create_progress_bar(0, cli.progress);
            EventSource::BatchScan(BatchScan::from_config(&compiled).with_progress(progress))
        }
        Mode::Watch => EventSource::live(&compiled).map_err(RunError::Watch)?,
    };
    let mover = Arc::new(Mover::from_config(&compiled));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(RunError::Runtime)?;
    let summary = runtime.block_on(source.run(mover, shutdown_signal()));
    // Workers still waiting on a stability check are not joined.
    runtime.shutdown_background();

    if mode == Mode::Once {
        if compiled.dry_run {
            OutputFormatter::dry_run_notice("No files were modified.");
        }
        OutputFormatter::summary_table(&summary);
    }
    Ok(summary)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for Ctrl-C, stopping");
    }
}
