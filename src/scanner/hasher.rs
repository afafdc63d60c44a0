//! Content fingerprinting.
//!
//! # Overview
//!
//! A fingerprint is the BLAKE3 digest of a file's complete byte content,
//! rendered as 64 lowercase hex characters. Files are streamed through a fixed
//! buffer, so memory use does not depend on file size.
//!
//! The [`Fingerprinter`] trait is the seam the scanner hashes through; the
//! default implementation is [`Blake3Fingerprinter`].

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use super::HashError;

/// Length of a rendered digest.
pub const DIGEST_HEX_LEN: usize = 64;

const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Computes a deterministic digest of a file's bytes.
pub trait Fingerprinter: Send + Sync {
    /// Digest the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] when the file cannot be opened or read to the end.
    fn fingerprint(&self, path: &Path) -> Result<String, HashError>;
}

/// Streaming BLAKE3 fingerprinter.
#[derive(Debug, Clone)]
pub struct Blake3Fingerprinter {
    buffer_size: usize,
}

impl Blake3Fingerprinter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Use a different read buffer size (minimum 1 byte).
    #[must_use]
    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// Digest everything `reader` yields.
    pub fn digest_reader<R: Read>(&self, mut reader: R) -> std::io::Result<String> {
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buffer[..n]);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(hasher.finalize().to_hex().to_string())
    }
}

impl Default for Blake3Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

impl Fingerprinter for Blake3Fingerprinter {
    fn fingerprint(&self, path: &Path) -> Result<String, HashError> {
        let file = File::open(path).map_err(|e| hash_error(path, e))?;
        self.digest_reader(file).map_err(|e| hash_error(path, e))
    }
}

/// Digest an in-memory buffer, in the same form as [`Fingerprinter`] output.
#[must_use]
pub fn digest_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn hash_error(path: &Path, error: std::io::Error) -> HashError {
    match error.kind() {
        ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}
