//! The deduplication engine.
//!
//! [`DedupEngine`] owns the [`FileIndex`] and exposes every operation a
//! front end needs: scanning, listing duplicate groups page by page, listing
//! folder patterns, resolving and applying keep-folder rules, disposing of
//! explicit paths and exporting removal scripts.
//!
//! ```no_run
//! use imgdedup::engine::DedupEngine;
//! use imgdedup::index::FileIndex;
//! use imgdedup::progress::ProgressSink;
//! use imgdedup::scanner::ScanOptions;
//! use std::path::PathBuf;
//!
//! let engine = DedupEngine::new(FileIndex::open_in_memory()?, ScanOptions::default());
//! engine.scan(&[PathBuf::from("/photos")], &ProgressSink::disabled())?;
//! for group in engine.list_duplicates(0, Some(50))?.groups {
//!     println!("{} copies of {}", group.len(), group.digest);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use thiserror::Error;

use crate::actions::{dispose_batch, DisposalMode, DisposalReport, DisposeError};
use crate::config::{Config, ConfigError};
use crate::duplicates::{
    collect_patterns, plan_disposals, DisposalPlan, DisposalRule, DuplicateGrouper, DuplicatePage,
    FolderPattern,
};
use crate::index::{FileIndex, IndexError};
use crate::output::{write_script_file, ScriptError, ScriptType};
use crate::progress::ProgressSink;
use crate::scanner::{
    Blake3Fingerprinter, CacheValidator, Fingerprinter, IncrementalScanner, ScanError, ScanOptions,
    ScanSummary, SizeAndMtime,
};
use crate::scanner::path_utils::key_to_path;

/// Errors surfaced by [`DedupEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Dispose(#[from] DisposeError),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The request was empty or malformed; nothing was done.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Index-backed duplicate finder.
pub struct DedupEngine {
    index: FileIndex,
    options: ScanOptions,
    fingerprinter: Arc<dyn Fingerprinter>,
    validator: Arc<dyn CacheValidator>,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl DedupEngine {
    #[must_use]
    pub fn new(index: FileIndex, options: ScanOptions) -> Self {
        Self {
            index,
            options,
            fingerprinter: Arc::new(Blake3Fingerprinter::new()),
            validator: Arc::new(SizeAndMtime),
            shutdown_flag: None,
        }
    }

    /// Open the configured database and take scan tuning from `config`.
    ///
    /// # Errors
    ///
    /// Fails if the database location cannot be resolved or opened.
    pub fn from_config(config: &Config) -> Result<Self, EngineError> {
        let path = config.database_path()?;
        let index = FileIndex::open(&path)?;
        log::debug!("Opened index at {}", path.display());
        Ok(Self::new(index, config.scan_options()))
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

    /// Stop scans early when `flag` becomes `true`.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Bring the index in line with `roots` and count the resulting groups.
    ///
    /// # Errors
    ///
    /// Fails on an unusable root or an index read failure. Per-file problems
    /// are counted in the summary.
    pub fn scan(&self, roots: &[PathBuf], progress: &ProgressSink) -> Result<ScanSummary, EngineError> {
        if roots.is_empty() {
            return Err(EngineError::InvalidRequest("no scan roots given".to_string()));
        }

        let mut scanner = IncrementalScanner::new(&self.index, self.options.clone())
            .with_fingerprinter(Arc::clone(&self.fingerprinter))
            .with_validator(Arc::clone(&self.validator));
        if let Some(flag) = &self.shutdown_flag {
            scanner = scanner.with_shutdown_flag(Arc::clone(flag));
        }

        let mut summary = scanner.scan(roots, progress)?;
        summary.duplicate_groups = self.index.duplicate_keys()?.len() as u64;
        log::info!(
            "Scan finished: {} files, {} cached, {} hashed, {} duplicate groups",
            summary.files_seen,
            summary.cached,
            summary.hashed(),
            summary.duplicate_groups
        );
        Ok(summary)
    }

    /// One page of duplicate groups, largest files first.
    ///
    /// Members that vanished from disk are purged from the index on the way.
    ///
    /// # Errors
    ///
    /// Fails when the index cannot be read.
    pub fn list_duplicates(&self, offset: usize, limit: Option<usize>) -> Result<DuplicatePage, EngineError> {
        Ok(DuplicateGrouper::new(&self.index).page(offset, limit)?)
    }

    /// Folder patterns over the complete duplicate set.
    ///
    /// # Errors
    ///
    /// Fails when the index cannot be read.
    pub fn list_folder_patterns(&self) -> Result<Vec<FolderPattern>, EngineError> {
        let groups = DuplicateGrouper::new(&self.index).all()?;
        Ok(collect_patterns(&groups))
    }

    /// Resolve `rules` against the current duplicate set without touching disk.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an empty rule list; otherwise only
    /// index read failures.
    pub fn plan_batch_rules(&self, rules: &[DisposalRule]) -> Result<DisposalPlan, EngineError> {
        if rules.is_empty() {
            return Err(EngineError::InvalidRequest("no batch rules given".to_string()));
        }
        let groups = DuplicateGrouper::new(&self.index).all()?;
        Ok(plan_disposals(&groups, rules))
    }

    /// Resolve `rules` and dispose of every file they select.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an empty rule list, index read
    /// failures, or an unusable trash directory. Per-file failures are in the
    /// report.
    pub fn apply_batch_rules(
        &self,
        rules: &[DisposalRule],
        mode: &DisposalMode,
    ) -> Result<DisposalReport, EngineError> {
        let plan = self.plan_batch_rules(rules)?;
        self.apply_plan(&plan, mode)
    }

    /// Dispose of the files of an already resolved plan.
    ///
    /// # Errors
    ///
    /// Only an unusable trash directory.
    pub fn apply_plan(&self, plan: &DisposalPlan, mode: &DisposalMode) -> Result<DisposalReport, EngineError> {
        log::info!(
            "Applying rules: {} files from {} groups ({} untouched, {} rejected)",
            plan.paths.len(),
            plan.groups_matched,
            plan.groups_untouched,
            plan.rejected.len()
        );
        if plan.is_empty() {
            return Ok(DisposalReport::default());
        }
        let paths: Vec<PathBuf> = plan.paths.iter().map(|key| key_to_path(key)).collect();
        Ok(dispose_batch(&self.index, &paths, mode)?)
    }

    /// Dispose of explicit paths.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidRequest`] for an empty list, or an unusable trash
    /// directory.
    pub fn dispose_files(&self, paths: &[PathBuf], mode: &DisposalMode) -> Result<DisposalReport, EngineError> {
        if paths.is_empty() {
            return Err(EngineError::InvalidRequest("no files given".to_string()));
        }
        Ok(dispose_batch(&self.index, paths, mode)?)
    }

    /// Export a removal script for `paths` instead of disposing of them.
    ///
    /// # Errors
    ///
    /// See [`write_script_file`].
    pub fn write_script(
        &self,
        paths: &[String],
        output_dir: &Path,
        trash_dir: Option<&Path>,
        script_type: ScriptType,
    ) -> Result<PathBuf, EngineError> {
        Ok(write_script_file(output_dir, paths, trash_dir, script_type)?)
    }
}
