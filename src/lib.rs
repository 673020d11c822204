//! tidywatch - keeps a directory organized
//!
//! Files in a watched directory are sorted into category folders (by filename
//! rule, then by extension, then `Others`), optionally partitioned by date.
//! A file is only moved once its size has stopped changing, and an existing
//! file is never overwritten. The directory can be organized once or watched
//! continuously.

pub mod cli;
pub mod config;
pub mod event_source;
pub mod file_category;
pub mod file_organizer;
pub mod logging;
pub mod output;
pub mod path_resolver;
pub mod scanner;
pub mod stability;
pub mod watcher;

pub use config::{CompiledConfig, ConfigError, OrganizerConfig};
pub use event_source::EventSource;
pub use file_category::Classifier;
pub use file_organizer::{CandidateFile, MoveOutcome, Mover, OrganizeError, SkipReason};
pub use output::RunSummary;
pub use path_resolver::PathResolver;
pub use stability::StabilityChecker;

pub use cli::{Cli, run_cli};
