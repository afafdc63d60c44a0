//! Directory walker implementation using jwalk.
//!
//! # Overview
//!
//! [`Walker`] yields every regular file under a root whose extension is on the
//! configured allow-list. Children of each directory are sorted by name, so the
//! output order is stable from one scan to the next.
//!
//! # Features
//!
//! - Parallel directory reading on jwalk's rayon pool
//! - Gitignore-style exclusions via the `ignore` crate; excluded directories are
//!   not descended into
//! - Optional hidden-file skipping and symlink following
//! - Graceful shutdown via atomic flag
//!
//! Errors are yielded as [`ScanError`] values and never end the walk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::path_utils::{has_allowed_extension, to_slash};
use super::{FileEntry, ScanError, WalkerConfig};

/// Directory walker for image discovery.
#[derive(Debug)]
pub struct Walker {
    /// Root path to walk
    root: PathBuf,
    /// Walker configuration
    config: WalkerConfig,
    /// Optional shutdown flag for graceful termination
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a new walker for the given path.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Stop yielding entries once `flag` is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build the exclusion matcher from the configured patterns.
    fn build_gitignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(gitignore) if gitignore.is_empty() => None,
            Ok(gitignore) => Some(gitignore),
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    /// Check the root before walking it.
    ///
    /// # Errors
    ///
    /// [`ScanError::NotFound`], [`ScanError::NotADirectory`] or
    /// [`ScanError::PermissionDenied`] for an unusable root.
    pub fn validate_root(&self) -> Result<(), ScanError> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => Err(ScanError::NotADirectory(self.root.clone())),
            Err(e) => Err(io_error(&self.root, e)),
        }
    }

    /// Walk the directory tree, yielding image entries in a stable order.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileEntry, ScanError>> + '_ {
        let gitignore = self.build_gitignore();
        let root = self.root.clone();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(move |_depth, _path, _read_dir_state, children| {
                if let Some(gi) = &gitignore {
                    children.retain(|child| match child {
                        Ok(entry) => {
                            let ignored =
                                is_ignored(gi, &root, &entry.path(), entry.file_type().is_dir());
                            if ignored {
                                log::trace!("Ignoring: {}", entry.path().display());
                            }
                            !ignored
                        }
                        Err(_) => true,
                    });
                }
                // Sort children for deterministic output
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir
            .into_iter()
            .take_while(move |_| {
                if self.is_shutdown_requested() {
                    log::debug!("Walker: Shutdown requested, stopping iteration");
                    false
                } else {
                    true
                }
            })
            .filter_map(move |entry_result| match entry_result {
                Ok(entry) => {
                    let path = entry.path();
                    let file_type = entry.file_type();
                    if path == self.root || file_type.is_dir() {
                        return None;
                    }
                    if !has_allowed_extension(&path, &self.config.extensions) {
                        return None;
                    }

                    let is_symlink = file_type.is_symlink();
                    if is_symlink && !self.config.follow_symlinks {
                        log::trace!("Skipping symlink: {}", path.display());
                        return None;
                    }

                    let metadata = if self.config.follow_symlinks {
                        std::fs::metadata(&path)
                    } else {
                        std::fs::symlink_metadata(&path)
                    };
                    let metadata = match metadata {
                        Ok(m) => m,
                        Err(e) => return Some(Err(io_error(&path, e))),
                    };
                    if !metadata.is_file() {
                        return None;
                    }

                    let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    Some(Ok(FileEntry {
                        path,
                        size: metadata.len(),
                        modified,
                        is_symlink,
                    }))
                }
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), std::borrow::ToOwned::to_owned);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    let source = e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
                    Some(Err(io_error(&path, source)))
                }
            })
    }
}

fn is_ignored(gitignore: &Gitignore, root: &Path, path: &Path, is_dir: bool) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let relative = to_slash(&relative.to_string_lossy()).into_owned();
    gitignore.matched(relative, is_dir).is_ignore()
}

fn io_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path.to_path_buf())
        }
        ErrorKind::NotFound => {
            log::debug!("File not found (may have been deleted): {}", path.display());
            ScanError::NotFound(path.to_path_buf())
        }
        _ => {
            log::warn!("I/O error for {}: {}", path.display(), error);
            ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}
