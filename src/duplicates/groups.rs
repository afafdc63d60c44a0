//! Duplicate group value types.
//!
//! # Overview
//!
//! A [`DuplicateGroup`] is every surviving index record sharing one
//! (digest, size) key. Groups are never stored; they are rebuilt from the index
//! on each request, so they always describe the index as it is now.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use imgdedup::duplicates::DuplicateGroup;
//! use imgdedup::index::FileRecord;
//!
//! let record = |path: &str| FileRecord {
//!     path: path.to_string(),
//!     size: 100,
//!     digest: "d".repeat(64),
//!     modified_ns: 0,
//!     first_seen: Utc::now(),
//!     updated_at: Utc::now(),
//! };
//! let group = DuplicateGroup::new("d".repeat(64), 100, vec![record("/b/x.jpg"), record("/a/x.jpg")]);
//!
//! assert_eq!(group.folders(), vec!["/a", "/b"]);
//! assert_eq!(group.wasted_space(), 100);
//! ```

use serde::Serialize;

use crate::index::FileRecord;

/// Files with identical content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// BLAKE3 digest shared by every member
    pub digest: String,
    /// File size in bytes, shared by every member
    pub size: u64,
    /// Members, ordered by path
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    #[must_use]
    pub fn new(digest: String, size: u64, files: Vec<FileRecord>) -> Self {
        Self { digest, size, files }
    }

    /// Number of files in this group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Space taken by all copies but one.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }

    /// Number of redundant copies.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Member keys.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    /// Distinct containing folders, sorted.
    #[must_use]
    pub fn folders(&self) -> Vec<&str> {
        let mut folders: Vec<&str> = self.files.iter().map(FileRecord::folder).collect();
        folders.sort_unstable();
        folders.dedup();
        folders
    }
}

/// One page of duplicate groups.
///
/// `total_groups` and `total_files` count every duplicate key in the index when
/// the page was built, including keys whose members turned out to be gone, so
/// `groups` can be shorter than the page size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DuplicatePage {
    pub groups: Vec<DuplicateGroup>,
    pub total_groups: usize,
    pub total_files: u64,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl DuplicatePage {
    /// Whether keys remain after this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.limit
            .is_some_and(|limit| self.offset.saturating_add(limit) < self.total_groups)
    }

    /// Number of pages of `limit` groups, at least 1.
    #[must_use]
    pub fn total_pages(&self) -> usize {
        match self.limit {
            Some(limit) if limit > 0 => self.total_groups.div_ceil(limit).max(1),
            _ => 1,
        }
    }
}
