//! Index record definitions.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scanner::path_utils;

/// One known image file as stored in the index.
///
/// `path` is the absolute, slash-normalized key. `size` and `digest` describe the
/// content as of the last successful read; `modified_ns` is the on-disk
/// modification time observed at that read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute slash-form path (unique key)
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// BLAKE3 digest of the content, lowercase hex
    pub digest: String,
    /// Modification time in nanoseconds since the Unix epoch
    pub modified_ns: i64,
    /// When the path was first indexed
    pub first_seen: DateTime<Utc>,
    /// When the row was last written
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Folder containing this file, in the same slash form as the key.
    #[must_use]
    pub fn folder(&self) -> &str {
        path_utils::folder_of(&self.path)
    }

    /// Final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        path_utils::file_name_of(&self.path)
    }

    /// Modification time as a `DateTime`, for display.
    #[must_use]
    pub fn modified(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.modified_ns)
    }
}

/// Values written for a path after it has been fingerprinted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpdate {
    pub path: String,
    pub size: u64,
    pub digest: String,
    pub modified_ns: i64,
}

/// Writes produced by one scan batch, applied together.
#[derive(Debug, Clone, Default)]
pub struct IndexBatch {
    /// Paths that had no record before this batch
    pub creates: Vec<RecordUpdate>,
    /// Paths whose record was stale (size or mtime changed)
    pub updates: Vec<RecordUpdate>,
}

impl IndexBatch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }

    /// All writes, creates first.
    pub fn iter(&self) -> impl Iterator<Item = &RecordUpdate> {
        self.creates.iter().chain(self.updates.iter())
    }
}

/// A (digest, size) pair shared by more than one record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DuplicateKey {
    pub digest: String,
    pub size: u64,
    /// Number of records carrying this key when the query ran
    pub count: u64,
}

/// Convert a filesystem timestamp into signed nanoseconds since the epoch.
///
/// Times before 1970 come out negative; values beyond the `i64` range saturate.
#[must_use]
pub fn system_time_to_ns(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}
