//! SQLite-backed file index.
//!
//! One table, `image_files`, keyed by the canonical path string. A secondary
//! index on `(digest, size)` serves content lookups and the duplicate query.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use super::record::{DuplicateKey, FileRecord, IndexBatch, RecordUpdate};

/// Errors raised by the file index.
#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    /// The underlying SQLite call failed
    #[error("Index database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The directory holding the database could not be created
    #[error("Cannot create index directory {path}: {source}")]
    Location {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another thread panicked while holding the connection
    #[error("Index connection lock poisoned")]
    Poisoned,
}

/// Result alias for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS image_files (
    path        TEXT PRIMARY KEY NOT NULL,
    size        INTEGER NOT NULL,
    digest      TEXT NOT NULL,
    modified_ns INTEGER NOT NULL,
    first_seen  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_image_files_content ON image_files (digest, size);
";

const SELECT_COLUMNS: &str = "path, size, digest, modified_ns, first_seen, updated_at";

/// Bound parameters per `IN (...)` query, under SQLite's historical limit of 999.
const MAX_PARAMS: usize = 900;

/// Persistent table of known image files.
///
/// The connection sits behind a mutex so the index can be shared by reference
/// between the scanner, the grouper and the disposal executor.
pub struct FileIndex {
    conn: Mutex<Connection>,
    location: Option<PathBuf>,
}

impl FileIndex {
    /// Open (or create) the index database at `path`.
    pub fn open(path: &Path) -> IndexResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Location {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        let index = Self {
            conn: Mutex::new(conn),
            location: Some(path.to_path_buf()),
        };
        index.configure_pragmas(true)?;
        index.migrate_schema()?;
        log::debug!("Opened file index at {}", path.display());
        Ok(index)
    }

    /// Open a throwaway in-memory index.
    pub fn open_in_memory() -> IndexResult<Self> {
        let index = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            location: None,
        };
        index.configure_pragmas(false)?;
        index.migrate_schema()?;
        Ok(index)
    }

    /// Database file backing this index, `None` when in memory.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    fn lock(&self) -> IndexResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| IndexError::Poisoned)
    }

    fn configure_pragmas(&self, on_disk: bool) -> IndexResult<()> {
        let conn = self.lock()?;
        if on_disk {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA busy_timeout = 5000;",
            )?;
        }
        conn.execute_batch("PRAGMA cache_size = -16000;")?;
        Ok(())
    }

    /// Bring the schema up to date. Rows are derived from the filesystem, so an
    /// older layout is simply dropped and rebuilt by the next scan.
    fn migrate_schema(&self) -> IndexResult<()> {
        let conn = self.lock()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != 0 && version < SCHEMA_VERSION {
            log::info!("Index schema version {version} is outdated, rebuilding");
            conn.execute_batch("DROP TABLE IF EXISTS image_files;")?;
        }
        conn.execute_batch(SCHEMA)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// Point lookup by key.
    pub fn get(&self, path: &str) -> IndexResult<Option<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!("SELECT {SELECT_COLUMNS} FROM image_files WHERE path = ?1");
        let record = conn
            .prepare_cached(&sql)?
            .query_row([path], record_from_row)
            .optional()?;
        Ok(record)
    }

    /// Batch lookup by key list. Keys without a record are absent from the map.
    pub fn get_many(&self, paths: &[String]) -> IndexResult<HashMap<String, FileRecord>> {
        let conn = self.lock()?;
        let mut found = HashMap::with_capacity(paths.len());
        for chunk in paths.chunks(MAX_PARAMS) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql =
                format!("SELECT {SELECT_COLUMNS} FROM image_files WHERE path IN ({placeholders})");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), record_from_row)?;
            for row in rows {
                let record = row?;
                found.insert(record.path.clone(), record);
            }
        }
        Ok(found)
    }

    /// All records sharing a content key, ordered by path.
    pub fn find_by_content(&self, digest: &str, size: u64) -> IndexResult<Vec<FileRecord>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM image_files WHERE digest = ?1 AND size = ?2 ORDER BY path"
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let records = stmt
            .query_map(params![digest, size_to_sql(size)], record_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Every key in the index, ordered.
    pub fn all_paths(&self) -> IndexResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT path FROM image_files ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(paths)
    }

    /// Content keys held by more than one record, largest files first and then
    /// by digest, with the member count of each.
    pub fn duplicate_keys(&self) -> IndexResult<Vec<DuplicateKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT digest, size, COUNT(*) FROM image_files
             GROUP BY digest, size
             HAVING COUNT(*) > 1
             ORDER BY size DESC, digest ASC",
        )?;
        let keys = stmt
            .query_map([], |row| {
                Ok(DuplicateKey {
                    digest: row.get(0)?,
                    size: size_from_sql(row.get(1)?),
                    count: size_from_sql(row.get(2)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Apply one scan batch in a single transaction.
    ///
    /// Creates keep any `first_seen` already present (a concurrent writer may
    /// have added the row since the lookup); updates fall back to an insert when
    /// their row has disappeared.
    pub fn apply_batch(&self, batch: &IndexBatch) -> IndexResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now();
        {
            let mut insert = tx.prepare_cached(UPSERT_SQL)?;
            for write in &batch.creates {
                insert.execute(params![
                    write.path,
                    size_to_sql(write.size),
                    write.digest,
                    write.modified_ns,
                    now,
                ])?;
            }
            let mut update = tx.prepare_cached(
                "UPDATE image_files SET size = ?2, digest = ?3, modified_ns = ?4, updated_at = ?5
                 WHERE path = ?1",
            )?;
            for write in &batch.updates {
                let changed = update.execute(params![
                    write.path,
                    size_to_sql(write.size),
                    write.digest,
                    write.modified_ns,
                    now,
                ])?;
                if changed == 0 {
                    insert.execute(params![
                        write.path,
                        size_to_sql(write.size),
                        write.digest,
                        write.modified_ns,
                        now,
                    ])?;
                }
            }
        }
        tx.commit()?;
        log::debug!(
            "Index batch committed: {} created, {} updated",
            batch.creates.len(),
            batch.updates.len()
        );
        Ok(())
    }

    /// Insert or refresh a single record.
    pub fn upsert(&self, write: &RecordUpdate) -> IndexResult<()> {
        let conn = self.lock()?;
        conn.prepare_cached(UPSERT_SQL)?.execute(params![
            write.path,
            size_to_sql(write.size),
            write.digest,
            write.modified_ns,
            Utc::now(),
        ])?;
        Ok(())
    }

    /// Delete one record. Returns whether a row was removed.
    pub fn delete(&self, path: &str) -> IndexResult<bool> {
        let conn = self.lock()?;
        let removed = conn
            .prepare_cached("DELETE FROM image_files WHERE path = ?1")?
            .execute([path])?;
        Ok(removed > 0)
    }

    /// Delete many records in one transaction. Returns the number removed.
    pub fn delete_many(&self, paths: &[String]) -> IndexResult<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM image_files WHERE path = ?1")?;
            for path in paths {
                removed += stmt.execute([path])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Number of records.
    pub fn count(&self) -> IndexResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM image_files", [], |row| row.get(0))?;
        Ok(size_from_sql(count))
    }

    /// Remove every record. Returns how many were removed.
    pub fn clear(&self) -> IndexResult<usize> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM image_files", [])?;
        log::info!("Cleared {removed} records from the file index");
        Ok(removed)
    }
}

const UPSERT_SQL: &str = "
INSERT INTO image_files (path, size, digest, modified_ns, first_seen, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?5)
ON CONFLICT(path) DO UPDATE SET
    size = excluded.size,
    digest = excluded.digest,
    modified_ns = excluded.modified_ns,
    updated_at = excluded.updated_at
";

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        size: size_from_sql(row.get(1)?),
        digest: row.get(2)?,
        modified_ns: row.get(3)?,
        first_seen: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

// SQLite integers are signed; file sizes never approach i64::MAX.
fn size_to_sql(size: u64) -> i64 {
    i64::try_from(size).unwrap_or(i64::MAX)
}

fn size_from_sql(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
