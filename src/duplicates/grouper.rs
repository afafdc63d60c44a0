//! Duplicate queries over the file index.
//!
//! # Overview
//!
//! [`DuplicateGrouper`] turns the index's grouped (digest, size) query into
//! [`DuplicateGroup`]s. Keys are ordered by size descending, then digest
//! ascending, which gives stable pages.
//!
//! Members are checked for existence as they are loaded. A member whose file
//! is gone has its record deleted on the spot, and a group left with fewer than
//! two members is skipped.

use crate::index::{DuplicateKey, FileIndex, FileRecord, IndexResult};
use crate::scanner::path_utils;

use super::groups::{DuplicateGroup, DuplicatePage};

/// Reads duplicate groups out of a [`FileIndex`].
pub struct DuplicateGrouper<'a> {
    index: &'a FileIndex,
}

impl<'a> DuplicateGrouper<'a> {
    #[must_use]
    pub fn new(index: &'a FileIndex) -> Self {
        Self { index }
    }

    /// Groups for keys `offset..offset + limit` (all remaining keys when
    /// `limit` is `None`).
    ///
    /// # Errors
    ///
    /// Fails when an index read fails. Failed record deletions are only logged.
    pub fn page(&self, offset: usize, limit: Option<usize>) -> IndexResult<DuplicatePage> {
        let keys = self.index.duplicate_keys()?;
        let total_groups = keys.len();
        let total_files = keys.iter().map(|k| k.count).sum();

        let start = offset.min(keys.len());
        let end = limit.map_or(keys.len(), |l| start.saturating_add(l).min(keys.len()));

        let mut groups = Vec::with_capacity(end - start);
        for key in &keys[start..end] {
            if let Some(group) = self.load_group(key)? {
                groups.push(group);
            }
        }

        Ok(DuplicatePage {
            groups,
            total_groups,
            total_files,
            offset,
            limit,
        })
    }

    /// Every duplicate group in the index.
    ///
    /// # Errors
    ///
    /// Fails when an index read fails.
    pub fn all(&self) -> IndexResult<Vec<DuplicateGroup>> {
        Ok(self.page(0, None)?.groups)
    }

    fn load_group(&self, key: &DuplicateKey) -> IndexResult<Option<DuplicateGroup>> {
        let members = self.index.find_by_content(&key.digest, key.size)?;
        let (present, missing): (Vec<FileRecord>, Vec<FileRecord>) = members
            .into_iter()
            .partition(|record| !path_utils::is_missing(&record.path));

        for record in &missing {
            match self.index.delete(&record.path) {
                Ok(_) => log::debug!("Removed vanished file from index: {}", record.path),
                Err(e) => log::warn!("Failed to remove vanished record {}: {}", record.path, e),
            }
        }

        if present.len() < 2 {
            log::trace!(
                "Group {} ({} bytes) dropped: {} survivors",
                key.digest,
                key.size,
                present.len()
            );
            return Ok(None);
        }
        Ok(Some(DuplicateGroup::new(key.digest.clone(), key.size, present)))
    }
}
