//! Persistent file index.
//!
//! The index is the single source of truth for what the tool knows about image
//! files on disk: one row per path with its size, content digest and the
//! modification time observed when the digest was computed.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema versioning and all queries.
//! * [`record`]: the row model and the write batches produced by a scan.
//!
//! # Consistency
//!
//! Rows are reconciled with disk in three places: the scanner's pre-pass drops
//! rows whose file is gone, the duplicate grouper drops vanished members when it
//! meets them, and the disposal executor drops the row of every file it removes.

pub mod database;
pub mod record;

pub use database::{FileIndex, IndexError, IndexResult};
pub use record::{system_time_to_ns, DuplicateKey, FileRecord, IndexBatch, RecordUpdate};
