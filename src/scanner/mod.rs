//! Scanner module for directory traversal, fingerprinting and incremental
//! index updates.
//!
//! # Architecture
//!
//! - [`walker`]: image discovery with jwalk
//! - [`hasher`]: streaming BLAKE3 fingerprints
//! - [`incremental`]: the scan loop that keeps the [`FileIndex`](crate::index::FileIndex)
//!   in step with disk, re-reading only files whose size or mtime changed
//! - [`path_utils`]: canonical index keys
//!
//! # Example
//!
//! ```no_run
//! use imgdedup::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Pictures"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(file) => println!("{}: {} bytes", file.path.display(), file.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod incremental;
pub mod path_utils;
pub mod walker;

use std::path::PathBuf;
use std::time::SystemTime;

pub use hasher::{digest_bytes, Blake3Fingerprinter, Fingerprinter, DIGEST_HEX_LEN};
pub use incremental::{
    AlwaysRehash, CacheValidator, IncrementalScanner, ScanOptions, ScanSummary, SizeAndMtime,
};
pub use path_utils::index_key;
pub use walker::Walker;

use crate::index::IndexError;

/// Image extensions visited by default, compared case-insensitively.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp"];

/// A discovered image file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// Path as produced by the walker (under the absolute root)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Whether the entry was reached through a symbolic link
    pub is_symlink: bool,
}

impl FileEntry {
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            is_symlink: false,
        }
    }
}

/// Configuration for directory walking.
#[derive(Debug, Clone)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Glob patterns to ignore (gitignore-style), relative to the root.
    pub ignore_patterns: Vec<String>,

    /// Bare extensions to visit, matched case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            skip_hidden: false,
            ignore_patterns: Vec::new(),
            extensions: DEFAULT_IMAGE_EXTENSIONS
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
        }
    }
}

impl WalkerConfig {
    /// Restrict the walk to the given extensions. Leading dots are stripped.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }
}

/// Errors from walking roots and running a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// A scan root that is a file.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A read from the index failed, so the scan cannot decide what to re-hash.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The hashing thread pool could not be started.
    #[error("Cannot start hashing threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors reading a file for its fingerprint.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("I/O error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
