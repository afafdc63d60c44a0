//! Disposal of duplicate files.
//!
//! # Overview
//!
//! A path list is disposed of in one of three ways:
//! - moved into a trash directory of the user's choosing (default, undoable
//!   by moving the file back)
//! - moved to the system recycle bin via the `trash` crate
//! - deleted permanently
//!
//! Every file is attempted even when earlier ones fail. Each success also
//! removes the file's record from the index, as does finding the file already
//! gone (which still counts as a failure).
//!
//! # Example
//!
//! ```no_run
//! use imgdedup::actions::dispose::{dispose_batch, DisposalMode};
//! use imgdedup::index::FileIndex;
//! use std::path::PathBuf;
//!
//! let index = FileIndex::open_in_memory()?;
//! let mode = DisposalMode::TrashDir(PathBuf::from("/tmp/dedup-trash"));
//! let report = dispose_batch(&index, &[PathBuf::from("/photos/copy.jpg")], &mode)?;
//! println!("{}", report.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use thiserror::Error;

use crate::index::FileIndex;
use crate::scanner::index_key;

/// Highest numeric suffix tried after the timestamp suffix collides.
const MAX_COLLISION_COUNTER: u32 = 9999;

/// Where disposed files go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisposalMode {
    /// Rename into this directory, keeping the base name when free
    TrashDir(PathBuf),
    /// Move to the platform recycle bin
    SystemTrash,
    /// Remove permanently
    Delete,
}

impl DisposalMode {
    /// Whether files can be recovered afterwards.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Delete)
    }

    /// Short description for messages.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::TrashDir(dir) => format!("move to {}", dir.display()),
            Self::SystemTrash => "move to system trash".to_string(),
            Self::Delete => "delete permanently".to_string(),
        }
    }
}

/// Error type for disposal operations.
#[derive(Debug, Error)]
pub enum DisposeError {
    /// File was not found (may have been deleted or moved).
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Permission denied when touching the file.
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Path exists but is not a regular file.
    #[error("not a file: {0}")]
    NotAFile(PathBuf),

    /// The trash directory could not be created.
    #[error("cannot create trash directory {path}: {source}")]
    TrashDirUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every candidate name inside the trash directory is taken.
    #[error("no free name for {0} in the trash directory")]
    NoFreeName(PathBuf),

    /// Rename into the trash directory failed.
    #[error("cannot move {path} to {destination}: {source}")]
    MoveFailed {
        path: PathBuf,
        destination: PathBuf,
        #[source]
        source: io::Error,
    },

    /// System trash operation failed.
    #[error("trash operation failed for {path}: {message}")]
    TrashFailed { path: PathBuf, message: String },

    /// Permanent delete operation failed.
    #[error("permanent delete failed for {path}: {message}")]
    DeleteFailed { path: PathBuf, message: String },

    /// General I/O error.
    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One disposed file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisposedFile {
    /// Index key of the file
    pub path: String,
    /// Size in bytes
    pub size: u64,
    /// New location when moved into a trash directory
    pub destination: Option<PathBuf>,
}

/// Outcome of a disposal batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DisposalReport {
    /// Files disposed of
    pub successes: Vec<DisposedFile>,
    /// Files left in place, with the reason
    pub failures: Vec<(String, String)>,
    /// Total bytes removed from their original location
    pub bytes_freed: u64,
    /// Successes whose index record could not be removed
    pub index_errors: usize,
}

impl DisposalReport {
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.successes.len()
    }

    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn total_count(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Paths that were not disposed of.
    #[must_use]
    pub fn failed_paths(&self) -> Vec<&str> {
        self.failures.iter().map(|(path, _)| path.as_str()).collect()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let freed = bytesize::ByteSize::b(self.bytes_freed);
        if self.all_succeeded() {
            format!("Disposed of {} file(s), freed {}", self.success_count(), freed)
        } else {
            format!(
                "Disposed of {} file(s), {} failed, freed {}",
                self.success_count(),
                self.failure_count(),
                freed
            )
        }
    }
}

/// Dispose of `paths` and drop their index records.
///
/// # Errors
///
/// Only [`DisposeError::TrashDirUnavailable`]: a trash directory that cannot be
/// created fails the whole batch before any file is touched. Per-file problems
/// end up in [`DisposalReport::failures`].
pub fn dispose_batch(
    index: &FileIndex,
    paths: &[PathBuf],
    mode: &DisposalMode,
) -> Result<DisposalReport, DisposeError> {
    if let DisposalMode::TrashDir(dir) = mode {
        fs::create_dir_all(dir).map_err(|source| DisposeError::TrashDirUnavailable {
            path: dir.clone(),
            source,
        })?;
    }

    let mut report = DisposalReport::default();
    for path in paths {
        let key = index_key(path);
        match dispose_one(path, mode) {
            Ok((size, destination)) => {
                if let Err(e) = index.delete(&key) {
                    log::warn!("Disposed of {key} but could not remove its record: {e}");
                    report.index_errors += 1;
                }
                report.bytes_freed += size;
                report.successes.push(DisposedFile {
                    path: key,
                    size,
                    destination,
                });
            }
            Err(e) => {
                log::warn!("Failed to dispose of {}: {}", path.display(), e);
                if matches!(e, DisposeError::NotFound(_)) {
                    match index.delete(&key) {
                        Ok(true) => log::debug!("Dropped record of vanished file {key}"),
                        Ok(false) => {}
                        Err(ie) => {
                            log::warn!("Could not remove record of vanished file {key}: {ie}");
                            report.index_errors += 1;
                        }
                    }
                }
                report.failures.push((key, e.to_string()));
            }
        }
    }

    log::info!("{}", report.summary());
    Ok(report)
}

/// Dispose of one file. Returns its size and, for trash directories, where it
/// went.
///
/// # Errors
///
/// Any [`DisposeError`] other than `TrashDirUnavailable`.
pub fn dispose_one(path: &Path, mode: &DisposalMode) -> Result<(u64, Option<PathBuf>), DisposeError> {
    let metadata = fs::metadata(path).map_err(|e| io_error(path, e))?;
    if !metadata.is_file() {
        return Err(DisposeError::NotAFile(path.to_path_buf()));
    }
    let size = metadata.len();

    match mode {
        DisposalMode::TrashDir(dir) => {
            let destination = move_to_trash_dir(path, dir)?;
            log::info!("Moved {} to {}", path.display(), destination.display());
            Ok((size, Some(destination)))
        }
        DisposalMode::SystemTrash => {
            trash::delete(path).map_err(|e| {
                log::error!("Trash operation failed for {}: {}", path.display(), e);
                DisposeError::TrashFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })?;
            log::info!("Moved to trash: {} ({} bytes)", path.display(), size);
            Ok((size, None))
        }
        DisposalMode::Delete => {
            fs::remove_file(path).map_err(|e| {
                log::error!("Permanent delete failed for {}: {}", path.display(), e);
                DisposeError::DeleteFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            })?;
            log::info!("Permanently deleted: {} ({} bytes)", path.display(), size);
            Ok((size, None))
        }
    }
}

/// Rename `path` into `trash_dir`, avoiding existing names.
///
/// # Errors
///
/// [`DisposeError::NoFreeName`] or [`DisposeError::MoveFailed`]. A rename across
/// filesystems fails rather than falling back to copy-and-delete.
pub fn move_to_trash_dir(path: &Path, trash_dir: &Path) -> Result<PathBuf, DisposeError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| DisposeError::NotAFile(path.to_path_buf()))?;
    let destination = free_destination(trash_dir, &file_name.to_string_lossy(), Local::now())
        .ok_or_else(|| DisposeError::NoFreeName(path.to_path_buf()))?;

    fs::rename(path, &destination).map_err(|source| DisposeError::MoveFailed {
        path: path.to_path_buf(),
        destination: destination.clone(),
        source,
    })?;
    Ok(destination)
}

/// First unused name for `file_name` in `dir`: the name itself, then the name
/// with a `_YYYYMMDD_HHMMSS_mmm` suffix before the extension, then that with a
/// counter.
#[must_use]
pub fn free_destination(dir: &Path, file_name: &str, now: DateTime<Local>) -> Option<PathBuf> {
    let plain = dir.join(file_name);
    if !occupied(&plain) {
        return Some(plain);
    }

    let (stem, ext) = split_extension(file_name);
    let stamp = now.format("%Y%m%d_%H%M%S_%3f");
    let stamped = dir.join(format!("{stem}_{stamp}{ext}"));
    if !occupied(&stamped) {
        return Some(stamped);
    }

    (1..=MAX_COLLISION_COUNTER)
        .map(|n| dir.join(format!("{stem}_{stamp}_{n}{ext}")))
        .find(|candidate| !occupied(candidate))
}

/// Split `name` into stem and extension (with its dot). Dotfiles have no
/// extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => name.split_at(idx),
        _ => (name, ""),
    }
}

fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

fn io_error(path: &Path, e: io::Error) -> DisposeError {
    match e.kind() {
        io::ErrorKind::NotFound => DisposeError::NotFound(path.to_path_buf()),
        io::ErrorKind::PermissionDenied => DisposeError::PermissionDenied(path.to_path_buf()),
        _ => DisposeError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    }
}
