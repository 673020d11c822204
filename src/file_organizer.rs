//! Per-file organization: skip checks, the stability wait, classification and the move.
//!
//! A [`Mover`] turns one [`CandidateFile`] into exactly one [`MoveOutcome`].
//! Failures are reported as outcomes rather than errors, and a batch pass or
//! watch loop carries on with the next file.
use crate::config::CompiledConfig;
use crate::file_category::Classifier;
use crate::path_resolver::PathResolver;
use crate::stability::StabilityChecker;
use chrono::{DateTime, Local};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Attempts at claiming a destination that other workers keep taking first.
const MAX_CLAIM_ATTEMPTS: usize = 8;

/// Errors that can occur while resolving a destination or moving a file.
#[derive(Debug)]
pub enum OrganizeError {
    /// Failed to create a destination directory.
    DirectoryCreationFailed {
        path: PathBuf,
        source: io::Error,
    },
    /// Failed to move a file to its destination.
    FileMoveFailure {
        source: PathBuf,
        destination: PathBuf,
        source_error: io::Error,
    },
    /// Could not read the metadata needed to place a file.
    MetadataUnavailable {
        path: PathBuf,
        source: io::Error,
    },
    /// The path has no file name component.
    InvalidFileName { path: PathBuf },
    /// Every numbered variant of the destination name is taken.
    NoUniqueName { path: PathBuf },
}

impl fmt::Display for OrganizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DirectoryCreationFailed { path, source } => {
                write!(
                    f,
                    "Failed to create directory {}: {}",
                    path.display(),
                    source
                )
            }
            Self::FileMoveFailure {
                source,
                destination,
                source_error,
            } => {
                write!(
                    f,
                    "Failed to move {} to {}: {}",
                    source.display(),
                    destination.display(),
                    source_error
                )
            }
            Self::MetadataUnavailable { path, source } => {
                write!(f, "Cannot read metadata of {}: {}", path.display(), source)
            }
            Self::InvalidFileName { path } => {
                write!(f, "Path has no file name: {}", path.display())
            }
            Self::NoUniqueName { path } => {
                write!(f, "No free destination name left for {}", path.display())
            }
        }
    }
}

impl std::error::Error for OrganizeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DirectoryCreationFailed { source, .. } => Some(source),
            Self::FileMoveFailure { source_error, .. } => Some(source_error),
            Self::MetadataUnavailable { source, .. } => Some(source),
            Self::InvalidFileName { .. } | Self::NoUniqueName { .. } => None,
        }
    }
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// A discovered path awaiting one processing attempt.
#[derive(Debug, Clone)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub discovered_at: DateTime<Local>,
}

impl CandidateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            discovered_at: Local::now(),
        }
    }

    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
    }
}

/// Why a candidate was left where it is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The path is gone or is not a regular file.
    NotAFile,
    /// The name starts with a dot.
    Hidden,
    /// The name ends in a configured temporary extension.
    Temporary,
    /// The size kept changing until the timeout, or the file became unreadable.
    Unstable,
    /// A live-watch exclusion pattern matched the name.
    Excluded { pattern: String },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAFile => f.write_str("not a file"),
            Self::Hidden => f.write_str("hidden"),
            Self::Temporary => f.write_str("temporary/incomplete"),
            Self::Unstable => f.write_str("unstable or inaccessible"),
            Self::Excluded { pattern } => write!(f, "excluded by pattern '{}'", pattern),
        }
    }
}

/// Coarse outcome kind, used for counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutcomeKind {
    Moved,
    Skipped,
    DryRunPlanned,
    Failed,
}

/// The result of processing one candidate.
#[derive(Debug)]
pub enum MoveOutcome {
    Moved {
        source: PathBuf,
        destination: PathBuf,
        category: String,
    },
    Skipped {
        path: PathBuf,
        reason: SkipReason,
    },
    DryRunPlanned {
        source: PathBuf,
        destination: PathBuf,
        category: String,
    },
    Failed {
        path: PathBuf,
        error: OrganizeError,
    },
}

impl MoveOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            Self::Moved { .. } => OutcomeKind::Moved,
            Self::Skipped { .. } => OutcomeKind::Skipped,
            Self::DryRunPlanned { .. } => OutcomeKind::DryRunPlanned,
            Self::Failed { .. } => OutcomeKind::Failed,
        }
    }

    /// Destination category for moves and planned moves.
    pub fn category(&self) -> Option<&str> {
        match self {
            Self::Moved { category, .. } | Self::DryRunPlanned { category, .. } => {
                Some(category.as_str())
            }
            Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }

    /// Destination path for moves and planned moves.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            Self::Moved { destination, .. } | Self::DryRunPlanned { destination, .. } => {
                Some(destination.as_path())
            }
            Self::Skipped { .. } | Self::Failed { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Skipped { reason, .. } => Some(reason),
            _ => None,
        }
    }

    /// Emits this outcome at its severity.
    ///
    /// Moves, planned moves and ordinary skips are `info`, stability timeouts
    /// `warn` and failures `error`.
    pub fn log(&self) {
        match self {
            Self::Moved {
                source,
                destination,
                category,
            } => info!(
                category = %category,
                "Moved: {} -> {}",
                source.display(),
                destination.display()
            ),
            Self::DryRunPlanned {
                source,
                destination,
                category,
            } => info!(
                category = %category,
                "[DRY RUN] Would move: {} -> {}",
                source.display(),
                destination.display()
            ),
            Self::Skipped { path, reason } => match reason {
                SkipReason::Hidden => info!("Ignoring hidden file: {}", path.display()),
                SkipReason::Unstable => warn!(
                    "File not stable or accessible, skipping: {}",
                    path.display()
                ),
                _ => info!(reason = %reason, "Skipped: {}", path.display()),
            },
            Self::Failed { path, error } => {
                error!(error = ?error, "Failed to organize {}: {}", path.display(), error)
            }
        }
    }
}

/// Processes candidates one at a time.
///
/// A `Mover` holds only read-only state and can be shared between workers.
#[derive(Debug, Clone)]
pub struct Mover {
    classifier: Classifier,
    resolver: PathResolver,
    stability: StabilityChecker,
    temp_extensions: Vec<String>,
    dry_run: bool,
}

impl Mover {
    pub fn new(
        classifier: Classifier,
        resolver: PathResolver,
        stability: StabilityChecker,
        temp_extensions: Vec<String>,
        dry_run: bool,
    ) -> Self {
        Self {
            classifier,
            resolver,
            stability,
            temp_extensions: temp_extensions
                .into_iter()
                .map(|ext| ext.to_lowercase())
                .collect(),
            dry_run,
        }
    }

    pub fn from_config(config: &CompiledConfig) -> Self {
        Self::new(
            config.classifier.clone(),
            PathResolver::new(&config.watch_dir, config.date_partition.clone()),
            config.stability,
            config.temp_extensions.clone(),
            config.dry_run,
        )
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Runs the full sequence for one candidate.
    ///
    /// Blocks for the duration of the stability wait.
    pub fn process(&self, candidate: &CandidateFile) -> MoveOutcome {
        let path = &candidate.path;
        let skipped = |reason| MoveOutcome::Skipped {
            path: path.clone(),
            reason,
        };

        if !fs::metadata(path).is_ok_and(|metadata| metadata.is_file()) {
            return skipped(SkipReason::NotAFile);
        }

        let Some(file_name) = candidate.file_name() else {
            return skipped(SkipReason::NotAFile);
        };

        if file_name.starts_with('.') {
            return skipped(SkipReason::Hidden);
        }

        if self.is_temporary(&file_name) {
            return skipped(SkipReason::Temporary);
        }

        debug!(
            discovered_at = %candidate.discovered_at.to_rfc3339(),
            "Waiting for {} to settle",
            path.display()
        );
        if !self.stability.is_stable(path) {
            return skipped(SkipReason::Unstable);
        }

        let category = self.classifier.classify(&file_name).to_string();

        if self.dry_run {
            return match self.resolver.plan(&category, path) {
                Ok(destination) => MoveOutcome::DryRunPlanned {
                    source: path.clone(),
                    destination,
                    category,
                },
                Err(error) => MoveOutcome::Failed {
                    path: path.clone(),
                    error,
                },
            };
        }

        match self.relocate(path, &category) {
            Ok(destination) => MoveOutcome::Moved {
                source: path.clone(),
                destination,
                category,
            },
            Err(error) => MoveOutcome::Failed {
                path: path.clone(),
                error,
            },
        }
    }

    fn is_temporary(&self, file_name: &str) -> bool {
        let lower = file_name.to_lowercase();
        self.temp_extensions
            .iter()
            .any(|ext| lower.ends_with(ext.as_str()))
    }

    /// Resolves a destination and moves `source` there without replacing anything.
    ///
    /// If another writer takes the resolved name first, the name is resolved again.
    fn relocate(&self, source: &Path, category: &str) -> OrganizeResult<PathBuf> {
        let mut last_destination = None;
        for _ in 0..MAX_CLAIM_ATTEMPTS {
            let destination = self.resolver.resolve(category, source)?;
            match move_no_clobber(source, &destination) {
                Ok(()) => return Ok(destination),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    debug!(
                        "Destination {} was taken concurrently, resolving again",
                        destination.display()
                    );
                    last_destination = Some(destination);
                }
                Err(e) => {
                    return Err(OrganizeError::FileMoveFailure {
                        source: source.to_path_buf(),
                        destination,
                        source_error: e,
                    });
                }
            }
        }
        Err(OrganizeError::NoUniqueName {
            path: last_destination.unwrap_or_else(|| source.to_path_buf()),
        })
    }
}

/// Moves a file, failing with `AlreadyExists` instead of replacing `destination`.
///
/// Within one filesystem this is a hard link followed by removing the source.
/// Where hard links are unavailable (another device, or a filesystem without
/// them) the content is copied into a newly created file and the source removed.
pub fn move_no_clobber(source: &Path, destination: &Path) -> io::Result<()> {
    match fs::hard_link(source, destination) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(e),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(e),
        Err(e) => {
            debug!(error = %e, "Hard link unavailable, falling back to copy");
            copy_no_clobber(source, destination)?;
        }
    }

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

fn copy_no_clobber(source: &Path, destination: &Path) -> io::Result<()> {
    let mut reader = File::open(source)?;
    let mut writer = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = io::copy(&mut reader, &mut writer).and_then(|_| writer.sync_all());
    if let Err(e) = copied {
        drop(writer);
        let _ = fs::remove_file(destination);
        return Err(e);
    }

    if let Ok(metadata) = reader.metadata() {
        let _ = fs::set_permissions(destination, metadata.permissions());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryExtensions;
    use crate::path_resolver::{DateField, DatePartition};
    use std::time::Duration;
    use tempfile::TempDir;

    fn quick_stability() -> StabilityChecker {
        StabilityChecker::new(Duration::from_millis(5), 2, Duration::from_secs(5))
    }

    fn mover_for(root: &Path, dry_run: bool) -> Mover {
        let classifier = Classifier::from_rules(
            &[],
            &[
                CategoryExtensions::new("Images", &[".jpg", ".png"]),
                CategoryExtensions::new("Documents", &[".pdf"]),
            ],
        );
        Mover::new(
            classifier,
            PathResolver::new(root, None),
            quick_stability(),
            vec![".crdownload".to_string(), ".PART".to_string()],
            dry_run,
        )
    }

    #[test]
    fn test_moves_file_into_category() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = temp_dir.path();
        let file = root.join("photo.jpg");
        fs::write(&file, "pixels").unwrap();

        let outcome = mover_for(root, false).process(&CandidateFile::new(&file));

        assert_eq!(outcome.kind(), OutcomeKind::Moved);
        assert_eq!(outcome.category(), Some("Images"));
        assert!(!file.exists());
        assert_eq!(
            fs::read_to_string(root.join("Images").join("photo.jpg")).unwrap(),
            "pixels"
        );
    }

    #[test]
    fn test_missing_path_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let outcome =
            mover_for(temp_dir.path(), false).process(&CandidateFile::new(temp_dir.path().join("x")));
        assert_eq!(outcome.skip_reason(), Some(&SkipReason::NotAFile));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("folder.jpg");
        fs::create_dir(&dir).unwrap();
        let outcome = mover_for(temp_dir.path(), false).process(&CandidateFile::new(&dir));
        assert_eq!(outcome.skip_reason(), Some(&SkipReason::NotAFile));
    }

    #[test]
    fn test_hidden_file_skipped() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join(".secret.jpg");
        fs::write(&file, "").unwrap();
        let outcome = mover_for(temp_dir.path(), false).process(&CandidateFile::new(&file));
        assert_eq!(outcome.skip_reason(), Some(&SkipReason::Hidden));
        assert!(file.exists());
    }

    #[test]
    fn test_temporary_extension_skipped_case_insensitively() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        for name in ["movie.crdownload", "movie.mkv.part", "SETUP.CRDOWNLOAD"] {
            let file = root.join(name);
            fs::write(&file, "").unwrap();
            let outcome = mover_for(root, false).process(&CandidateFile::new(&file));
            assert_eq!(outcome.skip_reason(), Some(&SkipReason::Temporary), "{name}");
            assert!(file.exists());
        }
    }

    #[test]
    fn test_dry_run_plans_without_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let file = root.join("scan.pdf");
        fs::write(&file, "").unwrap();

        let outcome = mover_for(root, true).process(&CandidateFile::new(&file));

        assert_eq!(outcome.kind(), OutcomeKind::DryRunPlanned);
        assert_eq!(
            outcome.destination(),
            Some(root.join("Documents").join("scan.pdf").as_path())
        );
        assert!(file.exists());
        assert!(!root.join("Documents").exists());
    }

    #[test]
    fn test_collision_gets_numbered_name() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("Images")).unwrap();
        fs::write(root.join("Images").join("photo.jpg"), "old").unwrap();
        let file = root.join("photo.jpg");
        fs::write(&file, "new").unwrap();

        let outcome = mover_for(root, false).process(&CandidateFile::new(&file));

        assert_eq!(
            outcome.destination(),
            Some(root.join("Images").join("photo (1).jpg").as_path())
        );
        assert_eq!(
            fs::read_to_string(root.join("Images").join("photo.jpg")).unwrap(),
            "old"
        );
    }

    #[test]
    fn test_unknown_extension_goes_to_others_with_partition() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let file = root.join("data.bin");
        fs::write(&file, "").unwrap();

        let mover = Mover::new(
            Classifier::new(),
            PathResolver::new(
                root,
                Some(DatePartition::new(DateField::Mtime, "%Y").unwrap()),
            ),
            quick_stability(),
            Vec::new(),
            false,
        );
        let outcome = mover.process(&CandidateFile::new(&file));

        let year = Local::now().format("%Y").to_string();
        assert_eq!(
            outcome.destination(),
            Some(root.join("Others").join(year).join("data.bin").as_path())
        );
    }

    #[test]
    fn test_move_no_clobber_refuses_existing_destination() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("b.txt");
        fs::write(&source, "source").unwrap();
        fs::write(&destination, "keep").unwrap();

        let err = move_no_clobber(&source, &destination).unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(fs::read_to_string(&destination).unwrap(), "keep");
        assert!(source.exists());
    }

    #[test]
    fn test_copy_no_clobber_copies_content() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("a.txt");
        let destination = temp_dir.path().join("b.txt");
        fs::write(&source, "payload").unwrap();

        copy_no_clobber(&source, &destination).unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");
        assert!(copy_no_clobber(&source, &destination).is_err());
    }

    #[test]
    fn test_hidden_skip_is_visible_at_info_level() {
        use std::io::Write;
        use std::sync::{Arc, Mutex};

        #[derive(Clone, Default)]
        struct Captured(Arc<Mutex<Vec<u8>>>);

        impl Write for Captured {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }

            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let outcome = MoveOutcome::Skipped {
            path: PathBuf::from("/w/.hidden"),
            reason: SkipReason::Hidden,
        };
        tracing::subscriber::with_default(subscriber, || outcome.log());

        let output = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(output.contains("INFO"), "{output}");
        assert!(output.contains("Ignoring hidden file: /w/.hidden"), "{output}");
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Temporary.to_string(), "temporary/incomplete");
        assert_eq!(SkipReason::Unstable.to_string(), "unstable or inaccessible");
        assert_eq!(
            SkipReason::Excluded {
                pattern: "^~".to_string()
            }
            .to_string(),
            "excluded by pattern '^~'"
        );
    }
}
