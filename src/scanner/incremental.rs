//! Incremental scanning.
//!
//! # Overview
//!
//! [`IncrementalScanner`] brings the [`FileIndex`] in line with what is on disk
//! under a set of roots while reading as few bytes as possible:
//!
//! 1. A pre-pass drops every record whose file no longer exists.
//! 2. Each root is walked in turn. Discovered images are collected into
//!    batches (50 by default).
//! 3. For each batch, the existing records are fetched with one lookup. A
//!    [`CacheValidator`] decides which of them can be trusted as-is; the rest
//!    are fingerprinted in parallel on a bounded rayon pool.
//! 4. The batch's creates and updates are written in one transaction. If that
//!    fails, each record is retried on its own and lasting failures are counted.
//!
//! Per-file problems (unreadable files, walk errors, failed writes) are logged,
//! reported through the [`ProgressSink`] and tallied in the [`ScanSummary`].
//! They never abort the scan.
//!
//! # Example
//!
//! ```no_run
//! use imgdedup::index::FileIndex;
//! use imgdedup::progress::ProgressSink;
//! use imgdedup::scanner::{IncrementalScanner, ScanOptions};
//! use std::path::PathBuf;
//!
//! let index = FileIndex::open_in_memory()?;
//! let scanner = IncrementalScanner::new(&index, ScanOptions::default());
//! let summary = scanner.scan(&[PathBuf::from("/home/user/Pictures")], &ProgressSink::disabled())?;
//! println!("{} hashed, {} cached", summary.hashed(), summary.cached);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::prelude::*;
use serde::Serialize;

use super::hasher::{Blake3Fingerprinter, Fingerprinter};
use super::path_utils::{self, index_key};
use super::{FileEntry, ScanError, Walker, WalkerConfig};
use crate::index::{system_time_to_ns, FileIndex, FileRecord, IndexBatch, RecordUpdate};
use crate::progress::{ProgressSink, ScanEvent};

/// Decides whether a stored record still describes a file without reading it.
pub trait CacheValidator: Send + Sync {
    /// `true` when `record` can be reused for `entry` as-is.
    fn is_fresh(&self, record: &FileRecord, entry: &FileEntry) -> bool;
}

/// Trust a record when both size and modification time match exactly.
///
/// Content rewritten with the same size and a restored mtime goes unnoticed.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeAndMtime;

impl CacheValidator for SizeAndMtime {
    fn is_fresh(&self, record: &FileRecord, entry: &FileEntry) -> bool {
        record.size == entry.size && record.modified_ns == system_time_to_ns(entry.modified)
    }
}

/// Never trust a record; every visited file is fingerprinted again.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRehash;

impl CacheValidator for AlwaysRehash {
    fn is_fresh(&self, _record: &FileRecord, _entry: &FileEntry) -> bool {
        false
    }
}

/// Tuning for one scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Files per lookup/hash/write round
    pub batch_size: usize,
    /// Hashing threads
    pub io_threads: usize,
    /// What to visit
    pub walker: WalkerConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            batch_size: 50,
            io_threads: 4,
            walker: WalkerConfig::default(),
        }
    }
}

/// What a scan did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Roots walked (fewer than requested if interrupted)
    pub roots: usize,
    /// Image files discovered
    pub files_seen: u64,
    /// Files whose record was reused without reading
    pub cached: u64,
    /// Files fingerprinted for the first time
    pub hashed_new: u64,
    /// Files fingerprinted again because they changed
    pub hashed_updated: u64,
    /// Files that could not be read
    pub hash_failures: u64,
    /// Entries the walker could not visit
    pub walk_errors: u64,
    /// Records that could not be written
    pub write_failures: u64,
    /// Records removed by the pre-pass
    pub pruned: u64,
    /// Progress events lost to a full channel
    pub dropped_events: u64,
    /// Duplicate groups in the index after the scan
    pub duplicate_groups: u64,
    /// Wall-clock time
    pub duration: Duration,
    /// Whether a shutdown request cut the scan short
    pub interrupted: bool,
}

impl ScanSummary {
    /// Files fingerprinted in this scan.
    #[must_use]
    pub fn hashed(&self) -> u64 {
        self.hashed_new + self.hashed_updated
    }

    /// Whether any per-item problem was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.hash_failures > 0 || self.walk_errors > 0 || self.write_failures > 0
    }
}

struct HashJob {
    entry: FileEntry,
    key: String,
    created: bool,
}

/// Walks roots and keeps a [`FileIndex`] current.
pub struct IncrementalScanner<'a> {
    index: &'a FileIndex,
    options: ScanOptions,
    fingerprinter: Arc<dyn Fingerprinter>,
    validator: Arc<dyn CacheValidator>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl<'a> IncrementalScanner<'a> {
    /// Scanner with BLAKE3 fingerprints and the size+mtime cache rule.
    #[must_use]
    pub fn new(index: &'a FileIndex, options: ScanOptions) -> Self {
        Self {
            index,
            options,
            fingerprinter: Arc::new(Blake3Fingerprinter::new()),
            validator: Arc::new(SizeAndMtime),
            shutdown_flag: None,
        }
    }

    #[must_use]
    pub fn with_fingerprinter(mut self, fingerprinter: Arc<dyn Fingerprinter>) -> Self {
        self.fingerprinter = fingerprinter;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn CacheValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Stop between batches once `flag` is set.
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

    /// Scan `roots` in order.
    ///
    /// # Errors
    ///
    /// Fails before touching the index if a root is not a readable directory,
    /// and fails mid-scan only when an index read fails. Everything else is
    /// counted in the returned summary.
    pub fn scan(&self, roots: &[PathBuf], progress: &ProgressSink) -> Result<ScanSummary, ScanError> {
        let started = Instant::now();
        let mut summary = ScanSummary::default();

        let walkers: Vec<(PathBuf, Walker)> = roots
            .iter()
            .map(|root| {
                let root = std::path::absolute(root).unwrap_or_else(|_| root.clone());
                let mut walker = Walker::new(&root, self.options.walker.clone());
                if let Some(flag) = &self.shutdown_flag {
                    walker = walker.with_shutdown_flag(Arc::clone(flag));
                }
                walker.validate_root().map(|()| (root, walker))
            })
            .collect::<Result<_, _>>()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.io_threads.max(1))
            .thread_name(|i| format!("imgdedup-hash-{i}"))
            .build()?;

        self.prune_missing(&mut summary, progress)?;

        for (root, walker) in &walkers {
            if self.is_shutdown_requested() {
                summary.interrupted = true;
                break;
            }
            log::info!("Scanning {}", root.display());
            progress.emit(ScanEvent::RootStarted { root: root.clone() });
            summary.roots += 1;

            let seen_before = summary.files_seen;
            self.scan_root(walker, &pool, &mut summary, progress)?;
            let files = summary.files_seen - seen_before;

            progress.emit(ScanEvent::RootFinished {
                root: root.clone(),
                files,
            });
            if summary.interrupted {
                log::info!("Scan of {} interrupted after {files} files", root.display());
                break;
            }
            log::info!("Finished {} ({files} files)", root.display());
        }

        summary.dropped_events = progress.dropped();
        summary.duration = started.elapsed();
        Ok(summary)
    }

    fn scan_root(
        &self,
        walker: &Walker,
        pool: &rayon::ThreadPool,
        summary: &mut ScanSummary,
        progress: &ProgressSink,
    ) -> Result<(), ScanError> {
        let batch_size = self.options.batch_size.max(1);
        let mut pending = Vec::with_capacity(batch_size);

        for item in walker.walk() {
            match item {
                Ok(entry) => {
                    summary.files_seen += 1;
                    pending.push(entry);
                    if pending.len() >= batch_size {
                        self.process_batch(std::mem::take(&mut pending), pool, summary, progress)?;
                        if self.is_shutdown_requested() {
                            summary.interrupted = true;
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    summary.walk_errors += 1;
                    let path = scan_error_path(&e).unwrap_or_else(|| PathBuf::from(""));
                    progress.emit(ScanEvent::WalkError {
                        path,
                        message: e.to_string(),
                    });
                }
            }
        }

        // A walk cut short by the flag leaves a partial batch; it is dropped.
        if self.is_shutdown_requested() {
            summary.interrupted = true;
            return Ok(());
        }
        if !pending.is_empty() {
            self.process_batch(pending, pool, summary, progress)?;
        }
        Ok(())
    }

    fn process_batch(
        &self,
        entries: Vec<FileEntry>,
        pool: &rayon::ThreadPool,
        summary: &mut ScanSummary,
        progress: &ProgressSink,
    ) -> Result<(), ScanError> {
        let keys: Vec<String> = entries.iter().map(|e| index_key(&e.path)).collect();
        let existing = self.index.get_many(&keys)?;

        let mut jobs = Vec::new();
        for (entry, key) in entries.into_iter().zip(keys) {
            match existing.get(&key) {
                Some(record) if self.validator.is_fresh(record, &entry) => {
                    log::trace!("Cached: {key}");
                    summary.cached += 1;
                    progress.emit(ScanEvent::Cached { path: key });
                }
                Some(_) => jobs.push(HashJob {
                    entry,
                    key,
                    created: false,
                }),
                None => jobs.push(HashJob {
                    entry,
                    key,
                    created: true,
                }),
            }
        }

        let fingerprinter = &self.fingerprinter;
        let hashed: Vec<_> = pool.install(|| {
            jobs.into_par_iter()
                .map(|job| {
                    let digest = fingerprinter.fingerprint(&job.entry.path);
                    (job, digest)
                })
                .collect()
        });

        let mut batch = IndexBatch::default();
        for (job, digest) in hashed {
            match digest {
                Ok(digest) => {
                    let write = RecordUpdate {
                        path: job.key,
                        size: job.entry.size,
                        digest,
                        modified_ns: system_time_to_ns(job.entry.modified),
                    };
                    if job.created {
                        batch.creates.push(write);
                    } else {
                        batch.updates.push(write);
                    }
                }
                Err(e) => {
                    log::warn!("Failed to fingerprint {}: {}", job.entry.path.display(), e);
                    summary.hash_failures += 1;
                    progress.emit(ScanEvent::HashFailed {
                        path: job.entry.path,
                        message: e.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "Batch: {} new, {} changed, {} hash failures so far",
            batch.creates.len(),
            batch.updates.len(),
            summary.hash_failures
        );
        self.write_batch(&batch, summary, progress);
        Ok(())
    }

    fn write_batch(&self, batch: &IndexBatch, summary: &mut ScanSummary, progress: &ProgressSink) {
        if batch.is_empty() {
            return;
        }
        let written: Vec<(&RecordUpdate, bool)> = match self.index.apply_batch(batch) {
            Ok(()) => batch
                .creates
                .iter()
                .map(|w| (w, true))
                .chain(batch.updates.iter().map(|w| (w, false)))
                .collect(),
            Err(e) => {
                log::warn!(
                    "Batch write of {} records failed ({}), retrying one by one",
                    batch.len(),
                    e
                );
                let mut written = Vec::with_capacity(batch.len());
                let tagged = batch
                    .creates
                    .iter()
                    .map(|w| (w, true))
                    .chain(batch.updates.iter().map(|w| (w, false)));
                for (write, created) in tagged {
                    match self.index.upsert(write) {
                        Ok(()) => written.push((write, created)),
                        Err(e) => {
                            log::warn!("Failed to record {}: {}", write.path, e);
                            summary.write_failures += 1;
                            progress.emit(ScanEvent::WriteFailed {
                                path: write.path.clone(),
                                message: e.to_string(),
                            });
                        }
                    }
                }
                written
            }
        };

        for (write, created) in written {
            if created {
                summary.hashed_new += 1;
            } else {
                summary.hashed_updated += 1;
            }
            progress.emit(ScanEvent::Hashed {
                path: write.path.clone(),
                created,
            });
        }
    }

    /// Drop records whose file is gone.
    fn prune_missing(&self, summary: &mut ScanSummary, progress: &ProgressSink) -> Result<(), ScanError> {
        let missing: Vec<String> = self
            .index
            .all_paths()?
            .into_iter()
            .filter(|path| path_utils::is_missing(path))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let removed: Vec<String> = match self.index.delete_many(&missing) {
            Ok(_) => missing,
            Err(e) => {
                log::warn!("Bulk removal of vanished records failed ({e}), retrying one by one");
                let mut removed = Vec::with_capacity(missing.len());
                for path in missing {
                    match self.index.delete(&path) {
                        Ok(_) => removed.push(path),
                        Err(e) => {
                            log::warn!("Failed to remove record {path}: {e}");
                            summary.write_failures += 1;
                            progress.emit(ScanEvent::WriteFailed {
                                message: e.to_string(),
                                path,
                            });
                        }
                    }
                }
                removed
            }
        };

        log::info!("Removed {} vanished files from the index", removed.len());
        summary.pruned += removed.len() as u64;
        for path in removed {
            log::debug!("Pruned: {path}");
            progress.emit(ScanEvent::Pruned { path });
        }
        Ok(())
    }
}

fn scan_error_path(error: &ScanError) -> Option<PathBuf> {
    match error {
        ScanError::PermissionDenied(path)
        | ScanError::NotFound(path)
        | ScanError::NotADirectory(path)
        | ScanError::Io { path, .. } => Some(path.clone()),
        ScanError::Index(_) | ScanError::ThreadPool(_) => None,
    }
}
