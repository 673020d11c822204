//! Write-completion detection by polling file size.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Decides whether a file has stopped changing.
///
/// A file is stable once its size has been read unchanged `required_checks`
/// times in a row, one reading every `poll_interval`. The wait gives up after
/// `timeout`. An empty file that never grows counts as stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityChecker {
    poll_interval: Duration,
    required_checks: u32,
    timeout: Duration,
}

impl StabilityChecker {
    pub fn new(poll_interval: Duration, required_checks: u32, timeout: Duration) -> Self {
        Self {
            poll_interval,
            required_checks,
            timeout,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn required_checks(&self) -> u32 {
        self.required_checks
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until `path` is stable, has become unreadable, or the timeout elapsed.
    ///
    /// Returns `false` as soon as the size cannot be read (the file vanished or
    /// is locked) and when the timeout is reached first.
    pub fn is_stable(&self, path: &Path) -> bool {
        let started = Instant::now();
        let Some(mut last_size) = file_size(path) else {
            return false;
        };
        let mut stable_checks = 0;

        while stable_checks < self.required_checks {
            if started.elapsed() >= self.timeout {
                debug!(
                    path = %path.display(),
                    stable_checks,
                    "Stability wait timed out"
                );
                return false;
            }

            thread::sleep(self.poll_interval);

            let Some(size) = file_size(path) else {
                debug!(path = %path.display(), "File became unreadable while polling");
                return false;
            };

            if size == last_size {
                stable_checks += 1;
            } else {
                stable_checks = 0;
                last_size = size;
            }
        }

        true
    }
}

fn file_size(path: &Path) -> Option<u64> {
    fs::metadata(path).map(|metadata| metadata.len()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;

    fn checker(interval_ms: u64, checks: u32, timeout_ms: u64) -> StabilityChecker {
        StabilityChecker::new(
            Duration::from_millis(interval_ms),
            checks,
            Duration::from_millis(timeout_ms),
        )
    }

    #[test]
    fn test_unchanged_file_is_stable_after_required_polls() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("done.bin");
        fs::write(&path, b"finished").unwrap();

        let started = Instant::now();
        assert!(checker(50, 3, 5_000).is_stable(&path));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(150), "{:?}", elapsed);
        // One extra poll of headroom plus scheduler slack.
        assert!(elapsed < Duration::from_millis(4 * 50 + 150), "{:?}", elapsed);
    }

    #[test]
    fn test_empty_file_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("empty.txt");
        fs::write(&path, b"").unwrap();

        assert!(checker(10, 2, 5_000).is_stable(&path));
    }

    #[test]
    fn test_missing_file_is_not_stable() {
        let temp_dir = TempDir::new().unwrap();
        let started = Instant::now();
        assert!(!checker(500, 3, 5_000).is_stable(&temp_dir.path().join("missing")));
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn test_file_deleted_while_polling_is_not_stable() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("vanishing.bin");
        fs::write(&path, b"data").unwrap();

        let remover = {
            let path = path.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(75));
                fs::remove_file(&path).unwrap();
            })
        };

        let started = Instant::now();
        assert!(!checker(50, 100, 10_000).is_stable(&path));
        assert!(started.elapsed() < Duration::from_secs(5));
        remover.join().unwrap();
    }

    #[test]
    fn test_growing_file_times_out() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("growing.bin");
        fs::write(&path, b"").unwrap();

        let writer = {
            let path = path.clone();
            thread::spawn(move || {
                let mut file = OpenOptions::new().append(true).open(&path).unwrap();
                for _ in 0..40 {
                    file.write_all(b"chunk").unwrap();
                    file.flush().unwrap();
                    thread::sleep(Duration::from_millis(10));
                }
            })
        };

        assert!(!checker(15, 5, 200).is_stable(&path));
        writer.join().unwrap();
    }

    #[test]
    fn test_accessors() {
        let checker = checker(100, 4, 2_000);
        assert_eq!(checker.poll_interval(), Duration::from_millis(100));
        assert_eq!(checker.required_checks(), 4);
        assert_eq!(checker.timeout(), Duration::from_secs(2));
    }
}
