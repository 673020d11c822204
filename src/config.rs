//! Organizer configuration.
//!
//! This module loads the configuration document (TOML or JSON), fills in
//! documented defaults for every omitted field and compiles the result into
//! the strongly-typed pieces the organizer runs on.
//!
//! # Configuration File Format
//!
//! ```toml
//! watch_dir = "~/Downloads"
//! recursive = false
//! date_based = true
//! date_field = "mtime"
//! date_format = "%Y-%m"
//! temp_extensions = [".crdownload", ".part", ".tmp"]
//! exclude_patterns = ["^~\\$"]
//! dry_run = false
//! wait_for_stable_seconds = 1.0
//! stable_checks = 3
//! stable_timeout_seconds = 300.0
//! log_file = "organizer.log"
//!
//! [[regex_rules]]
//! pattern = "invoice"
//! category = "Invoices"
//!
//! [file_types]
//! Images = [".jpg", ".png"]
//! Documents = [".pdf", ".txt"]
//! ```
//!
//! `file_types` keeps document order: when two categories claim the same
//! extension, the one declared first wins.

use crate::file_category::Classifier;
use crate::path_resolver::{DateField, DatePartition};
use crate::stability::StabilityChecker;
use regex::Regex;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Name of the configuration file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "tidywatch.toml";
/// Legacy JSON configuration looked up in the working directory.
pub const LEGACY_CONFIG_FILE: &str = "config.json";

/// Errors that can occur during configuration loading and compilation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    /// Configuration file not found at the specified path.
    ConfigNotFound(PathBuf),
    /// Invalid document syntax, structure or field value.
    ConfigInvalid(String),
    /// Invalid regex pattern provided with the actual error reason.
    InvalidRegexPattern {
        /// The regex pattern that failed to compile.
        pattern: String,
        /// The reason why the pattern is invalid.
        reason: String,
    },
    /// IO error while reading configuration.
    IoError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ConfigNotFound(path) => {
                write!(f, "Configuration file not found: {}", path.display())
            }
            ConfigError::ConfigInvalid(msg) => write!(f, "Invalid configuration: {}", msg),
            ConfigError::InvalidRegexPattern { pattern, reason } => {
                write!(f, "Invalid regex pattern '{}': {}", pattern, reason)
            }
            ConfigError::IoError(msg) => write!(f, "IO error reading configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

/// A filename rule evaluated before extension rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegexRule {
    /// Pattern searched case-insensitively anywhere in the filename.
    pub pattern: String,
    /// Destination category for matching files.
    #[serde(alias = "folder")]
    pub category: String,
}

impl RegexRule {
    pub fn new(pattern: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            category: category.into(),
        }
    }
}

/// One entry of the ordered `file_types` mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryExtensions {
    pub name: String,
    pub extensions: Vec<String>,
}

impl CategoryExtensions {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

/// The configuration document as written by the user.
///
/// Every field is optional in the document; omitted fields take the values
/// of [`OrganizerConfig::default`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrganizerConfig {
    /// Directory to organize. A leading `~` is expanded.
    pub watch_dir: String,
    /// Descend into subdirectories of the watch directory.
    pub recursive: bool,
    /// Ordered mapping of category name to extensions.
    #[serde(deserialize_with = "deserialize_categories")]
    pub file_types: Vec<CategoryExtensions>,
    /// Filename rules, evaluated in order before `file_types`.
    pub regex_rules: Vec<RegexRule>,
    /// Add a date partition folder below the category folder.
    pub date_based: bool,
    pub date_field: DateField,
    /// strftime-style format of the date partition label.
    pub date_format: String,
    /// Suffixes of files that are still being downloaded or written.
    pub temp_extensions: Vec<String>,
    /// Regexes matched against the basename of live-watch events.
    pub exclude_patterns: Vec<String>,
    pub dry_run: bool,
    /// Delay between two size readings.
    pub wait_for_stable_seconds: f64,
    /// Consecutive unchanged readings required before a file is moved.
    pub stable_checks: u32,
    /// Upper bound on the whole stability wait.
    pub stable_timeout_seconds: f64,
    /// Cap on concurrent live-watch workers. Unbounded when unset.
    pub max_concurrent_jobs: Option<usize>,
    pub log_file: PathBuf,
}

impl Default for OrganizerConfig {
    fn default() -> Self {
        Self {
            watch_dir: "~/Downloads".to_string(),
            recursive: false,
            file_types: default_file_types(),
            regex_rules: Vec::new(),
            date_based: true,
            date_field: DateField::Mtime,
            date_format: "%Y-%m".to_string(),
            temp_extensions: vec![
                ".crdownload".to_string(),
                ".part".to_string(),
                ".tmp".to_string(),
            ],
            exclude_patterns: Vec::new(),
            dry_run: false,
            wait_for_stable_seconds: 1.0,
            stable_checks: 3,
            stable_timeout_seconds: 300.0,
            max_concurrent_jobs: None,
            log_file: PathBuf::from("organizer.log"),
        }
    }
}

fn default_file_types() -> Vec<CategoryExtensions> {
    vec![
        CategoryExtensions::new(
            "Images",
            &[".jpg", ".jpeg", ".png", ".gif", ".bmp", ".svg"],
        ),
        CategoryExtensions::new(
            "Documents",
            &[".pdf", ".docx", ".doc", ".txt", ".xlsx", ".pptx"],
        ),
        CategoryExtensions::new("Videos", &[".mp4", ".mov", ".mkv", ".avi"]),
        CategoryExtensions::new("Music", &[".mp3", ".wav", ".flac"]),
        CategoryExtensions::new("Archives", &[".zip", ".rar", ".7z", ".tar.gz"]),
        CategoryExtensions::new(
            "Code",
            &[".py", ".js", ".java", ".c", ".cpp", ".html", ".css"],
        ),
    ]
}

/// Reads `file_types` as a map while keeping the document order.
fn deserialize_categories<'de, D>(deserializer: D) -> Result<Vec<CategoryExtensions>, D::Error>
where
    D: Deserializer<'de>,
{
    struct CategoriesVisitor;

    impl<'de> Visitor<'de> for CategoriesVisitor {
        type Value = Vec<CategoryExtensions>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of category names to extension lists")
        }

        fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut categories = Vec::new();
            while let Some((name, extensions)) = map.next_entry::<String, Vec<String>>()? {
                categories.push(CategoryExtensions { name, extensions });
            }
            Ok(categories)
        }
    }

    deserializer.deserialize_map(CategoriesVisitor)
}

impl OrganizerConfig {
    /// Load configuration from a file, with fallback to defaults.
    ///
    /// Attempts to load configuration in the following order:
    /// 1. If `config_path` is provided, load from that file
    /// 2. Look for `tidywatch.toml` in the current directory
    /// 3. Look for `config.json` in the current directory
    /// 4. Look for `~/.config/tidywatch/config.toml` in home directory
    /// 5. Fall back to default configuration
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration file is explicitly provided but cannot be read,
    /// or if any file found cannot be parsed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        for local in [LOCAL_CONFIG_FILE, LEGACY_CONFIG_FILE] {
            let local_config = PathBuf::from(local);
            if local_config.exists() {
                return Self::load_from_file(&local_config);
            }
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("tidywatch")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// Files ending in `.json` are parsed as JSON, everything else as TOML.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_toml_str(&content)
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))
    }

    /// The watch directory with `~` expanded.
    pub fn watch_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.watch_dir).into_owned())
    }

    /// Validate the document and build the runtime configuration.
    ///
    /// Malformed `regex_rules` and `exclude_patterns` entries are logged and
    /// dropped rather than rejected.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigInvalid` for an unusable date format,
    /// negative or non-finite durations, or zero-valued counts.
    pub fn compile(&self) -> Result<CompiledConfig, ConfigError> {
        let poll_interval = seconds("wait_for_stable_seconds", self.wait_for_stable_seconds)?;
        let timeout = seconds("stable_timeout_seconds", self.stable_timeout_seconds)?;
        if self.stable_checks == 0 {
            return Err(ConfigError::ConfigInvalid(
                "stable_checks must be at least 1".to_string(),
            ));
        }
        if self.max_concurrent_jobs == Some(0) {
            return Err(ConfigError::ConfigInvalid(
                "max_concurrent_jobs must be at least 1 when set".to_string(),
            ));
        }

        let date_partition = if self.date_based && !self.date_format.is_empty() {
            Some(DatePartition::new(self.date_field, &self.date_format)?)
        } else {
            None
        };

        Ok(CompiledConfig {
            watch_dir: self.watch_dir(),
            recursive: self.recursive,
            classifier: Classifier::from_rules(&self.regex_rules, &self.file_types),
            date_partition,
            temp_extensions: self
                .temp_extensions
                .iter()
                .map(|ext| ext.to_lowercase())
                .filter(|ext| !ext.is_empty())
                .collect(),
            exclusions: ExclusionSet::new(&self.exclude_patterns),
            dry_run: self.dry_run,
            stability: StabilityChecker::new(poll_interval, self.stable_checks, timeout),
            max_concurrent_jobs: self.max_concurrent_jobs,
        })
    }
}

fn seconds(field: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        ConfigError::ConfigInvalid(format!(
            "{} must be a finite, non-negative number of seconds (got {})",
            field, value
        ))
    })
}

/// Validated configuration, immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct CompiledConfig {
    pub watch_dir: PathBuf,
    pub recursive: bool,
    pub classifier: Classifier,
    pub date_partition: Option<DatePartition>,
    /// Lower-cased temporary suffixes.
    pub temp_extensions: Vec<String>,
    pub exclusions: ExclusionSet,
    pub dry_run: bool,
    pub stability: StabilityChecker,
    pub max_concurrent_jobs: Option<usize>,
}

/// Compiled exclusion patterns for live-watch events.
///
/// Patterns are case-sensitive and unanchored, matched against the basename.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    regexes: Vec<Regex>,
}

impl ExclusionSet {
    /// Compile `patterns`, logging and dropping any that are malformed.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let regexes = patterns
            .iter()
            .filter_map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern)
                    .map_err(|e| {
                        let err = ConfigError::InvalidRegexPattern {
                            pattern: pattern.to_string(),
                            reason: e.to_string(),
                        };
                        warn!("Ignoring exclude pattern: {}", err);
                    })
                    .ok()
            })
            .collect();
        Self { regexes }
    }

    /// Returns the first pattern matching `file_name`, if any.
    pub fn matching(&self, file_name: &str) -> Option<&str> {
        self.regexes
            .iter()
            .find(|regex| regex.is_match(file_name))
            .map(|regex| regex.as_str())
    }

    pub fn len(&self) -> usize {
        self.regexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regexes.is_empty()
    }
}
