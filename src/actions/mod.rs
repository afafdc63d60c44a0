//! File actions module.
//!
//! Disposal of duplicates: move into a trash directory, move to the system
//! recycle bin, or delete permanently, keeping the file index in step.
//!
//! ```no_run
//! use imgdedup::actions::{dispose_batch, DisposalMode};
//! use imgdedup::index::FileIndex;
//! use std::path::PathBuf;
//!
//! let index = FileIndex::open_in_memory()?;
//! let report = dispose_batch(&index, &[PathBuf::from("/photos/copy.jpg")], &DisposalMode::SystemTrash)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod dispose;

pub use dispose::{
    dispose_batch, dispose_one, free_destination, move_to_trash_dir, DisposalMode, DisposalReport,
    DisposeError, DisposedFile,
};
