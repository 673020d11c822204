//! Destination path composition.
//!
//! A destination is `watch_root/category[/date partition]/filename`. When that
//! name is already taken, ` (n)` is inserted before the extension with the
//! smallest free `n`.

use crate::config::ConfigError;
use crate::file_organizer::{OrganizeError, OrganizeResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

/// Which file timestamp drives the date partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    /// Last modification time.
    #[default]
    #[serde(alias = "modified")]
    Mtime,
    /// Creation time; falls back to modification time where the platform
    /// does not record it.
    #[serde(alias = "created")]
    Ctime,
}

/// A validated date partition rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatePartition {
    field: DateField,
    format: String,
}

impl DatePartition {
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigInvalid` if `format` is not a valid strftime string.
    pub fn new(field: DateField, format: &str) -> Result<Self, ConfigError> {
        if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
            return Err(ConfigError::ConfigInvalid(format!(
                "date_format '{}' is not a valid strftime format",
                format
            )));
        }
        Ok(Self {
            field,
            format: format.to_string(),
        })
    }

    pub fn field(&self) -> DateField {
        self.field
    }

    /// Formats the configured timestamp of a file in local time.
    pub fn label(&self, metadata: &Metadata) -> io::Result<String> {
        let timestamp = match self.field {
            DateField::Mtime => metadata.modified()?,
            DateField::Ctime => metadata.created().or_else(|_| metadata.modified())?,
        };
        let local: DateTime<Local> = timestamp.into();

        let mut label = String::new();
        write!(label, "{}", local.format(&self.format)).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot format timestamp with '{}'", self.format),
            )
        })?;
        Ok(label)
    }
}

/// Computes collision-free destinations below the watch root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    watch_root: PathBuf,
    date_partition: Option<DatePartition>,
}

impl PathResolver {
    pub fn new(watch_root: impl Into<PathBuf>, date_partition: Option<DatePartition>) -> Self {
        Self {
            watch_root: watch_root.into(),
            date_partition,
        }
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    /// The folder a file belongs in: `watch_root/category[/partition]`.
    pub fn destination_dir(&self, category: &str, file_path: &Path) -> OrganizeResult<PathBuf> {
        let mut dir = self.watch_root.join(category);

        if let Some(partition) = &self.date_partition {
            let label = fs::metadata(file_path)
                .and_then(|metadata| partition.label(&metadata))
                .map_err(|e| OrganizeError::MetadataUnavailable {
                    path: file_path.to_path_buf(),
                    source: e,
                })?;
            if !label.is_empty() {
                dir.push(label);
            }
        }

        Ok(dir)
    }

    /// Computes the destination without touching the filesystem beyond reads.
    ///
    /// Used for dry runs: missing folders are not created, but names already
    /// taken on disk are still avoided.
    pub fn plan(&self, category: &str, file_path: &Path) -> OrganizeResult<PathBuf> {
        let dir = self.destination_dir(category, file_path)?;
        unique_destination(&dir.join(file_name_of(file_path)?))
    }

    /// Computes the destination, creating the folder chain as needed.
    ///
    /// The returned path did not exist when it was probed.
    pub fn resolve(&self, category: &str, file_path: &Path) -> OrganizeResult<PathBuf> {
        let dir = self.destination_dir(category, file_path)?;
        fs::create_dir_all(&dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
            path: dir.clone(),
            source: e,
        })?;
        unique_destination(&dir.join(file_name_of(file_path)?))
    }
}

fn file_name_of(file_path: &Path) -> OrganizeResult<&std::ffi::OsStr> {
    file_path
        .file_name()
        .ok_or_else(|| OrganizeError::InvalidFileName {
            path: file_path.to_path_buf(),
        })
}

/// Returns `candidate` if it is free, otherwise the first free `name (n).ext`.
///
/// Every probe either finds a free name or increments `n`, so the search ends
/// once `n` would overflow at the latest, which is reported as an error.
pub fn unique_destination(candidate: &Path) -> OrganizeResult<PathBuf> {
    if !is_taken(candidate)? {
        return Ok(candidate.to_path_buf());
    }

    let mut n: u64 = 1;
    loop {
        let numbered = numbered_path(candidate, n);
        if !is_taken(&numbered)? {
            return Ok(numbered);
        }
        n = n
            .checked_add(1)
            .ok_or_else(|| OrganizeError::NoUniqueName {
                path: candidate.to_path_buf(),
            })?;
    }
}

/// `dir/stem (n).ext`, or `dir/name (n)` when there is no extension.
fn numbered_path(candidate: &Path, n: u64) -> PathBuf {
    let stem = candidate.file_stem().unwrap_or_default();
    let mut name = OsString::from(stem);
    name.push(format!(" ({})", n));
    if let Some(ext) = candidate.extension() {
        name.push(".");
        name.push(ext);
    }
    candidate.with_file_name(name)
}

/// A path is taken if anything, including a dangling symlink, occupies it.
fn is_taken(path: &Path) -> OrganizeResult<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(OrganizeError::MetadataUnavailable {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
