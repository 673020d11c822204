//! Logging setup: a persistent log file plus console output on stderr.

use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info";
const QUIET_CONSOLE_FILTER: &str = "warn";

/// Flushes the log file when dropped. Hold it for the life of the process.
#[must_use = "dropping the guard flushes and closes the log file"]
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Initializes the global subscriber.
///
/// Records go to `log_file` (appended, no ANSI colours) and to stderr. Both
/// honour `RUST_LOG`, defaulting to `info`; with `quiet_console` the stderr
/// layer only shows warnings and errors.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already installed.
pub fn init_logging(log_file: &Path, quiet_console: bool) -> io::Result<LogGuard> {
    let (file_writer, worker) = tracing_appender::non_blocking(file_appender(log_file)?);

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if quiet_console {
        EnvFilter::new(QUIET_CONSOLE_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_filter(console_filter),
        )
        .try_init()
        .map_err(io::Error::other)?;

    Ok(LogGuard { _worker: worker })
}

/// A never-rotating appender writing to exactly `log_file`.
fn file_appender(log_file: &Path) -> io::Result<RollingFileAppender> {
    let file_name = log_file.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("log_file has no file name: {}", log_file.display()),
        )
    })?;
    let dir = match log_file.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_appender_creates_parent_and_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("organizer.log");

        file_appender(&path).unwrap().write_all(b"first line\n").unwrap();
        let mut again = file_appender(&path).unwrap();
        again.write_all(b"second line\n").unwrap();
        again.flush().unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "first line\nsecond line\n"
        );
    }

    #[test]
    fn test_guard_flushes_pending_records_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("organizer.log");
        let (mut writer, worker) = tracing_appender::non_blocking(file_appender(&path).unwrap());
        writer.write_all(b"queued record\n").unwrap();

        drop(LogGuard { _worker: worker });

        assert_eq!(fs::read_to_string(&path).unwrap(), "queued record\n");
    }

    #[test]
    fn test_log_path_without_file_name_is_rejected() {
        let err = file_appender(Path::new("/")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
