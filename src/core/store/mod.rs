//! SQLite-backed file record store
//!
//! This module provides the persistent metadata catalog for a library:
//! - One record per geometry/image file, keyed by library-relative path
//! - Fingerprints (size, mtime, sha256) for change detection
//! - Extracted titles and object names, tags, selection and exclusion state
//!
//! The store is shared between the background indexing pass and foreground
//! edits. Every public operation takes the connection lock for its whole
//! duration, and multi-statement mutations run inside a transaction, so a
//! reader never observes a half-updated record.

mod queries;
mod records;
mod schema;
mod types;

pub use queries::path_is_under;
pub use types::*;

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, Row};
use thiserror::Error;

use crate::core::Library;

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// Columns selected for every `FileRecord` query, in `record_from_row` order
const RECORD_COLUMNS: &str = "f.id, f.rel_path, f.kind, f.status, f.included, f.processed, \
     f.selected, f.file_size, f.file_mtime, f.file_hash, f.title, f.short_name, f.author, \
     f.thumbnail IS NOT NULL, f.discovered_at, f.processed_at, f.last_error";

/// Errors raised by the record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no record for {0}")]
    NotFound(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("metadata database has schema version {found}, expected {expected}; run 'cadventory reset' or remove the database")]
    SchemaMismatch { found: i32, expected: i32 },
}

/// The file record store backed by SQLite
pub struct FileStore {
    conn: Mutex<Connection>,
    counts: RwLock<LibraryCounts>,
}

impl FileStore {
    /// Open (creating if needed) the store of a library
    pub fn open_library(library: &Library) -> Result<Self, StoreError> {
        std::fs::create_dir_all(library.meta_dir())?;
        Self::open(&library.db_path())
    }

    /// Open or create a store at an explicit database path
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        // WAL lets a second process read while a pass is writing
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::from_connection(conn)
    }

    /// Store that lives only in memory (tests, dry runs)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        Self::init_schema(&conn)?;
        let counts = Self::compute_counts(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            counts: RwLock::new(counts),
        })
    }

    /// Cached aggregate counts as of the last `refresh`
    pub fn counts(&self) -> LibraryCounts {
        self.counts.read().clone()
    }

    /// Recompute cached aggregates after mutations
    pub fn refresh(&self) -> Result<LibraryCounts, StoreError> {
        let counts = {
            let conn = self.conn.lock();
            Self::compute_counts(&conn)?
        };
        *self.counts.write() = counts.clone();
        Ok(counts)
    }

    fn compute_counts(conn: &Connection) -> Result<LibraryCounts, StoreError> {
        let counts = conn.query_row(
            r#"SELECT
                COUNT(*),
                COALESCE(SUM(kind = 'geometry'), 0),
                COALESCE(SUM(kind = 'image'), 0),
                COALESCE(SUM(included = 1 AND status = 'present'), 0),
                COALESCE(SUM(included = 0), 0),
                COALESCE(SUM(status = 'missing'), 0),
                COALESCE(SUM(processed = 1 AND included = 1 AND status = 'present'), 0),
                COALESCE(SUM(processed = 0 AND included = 1 AND status = 'present' AND last_error IS NULL), 0),
                COALESCE(SUM(processed = 0 AND included = 1 AND status = 'present' AND last_error IS NOT NULL), 0),
                COALESCE(SUM(selected = 1), 0),
                (SELECT COUNT(DISTINCT file_id) FROM tags)
               FROM files"#,
            [],
            |row| {
                let n = |i: usize| row.get::<_, i64>(i).map(|v| v.max(0) as usize);
                Ok(LibraryCounts {
                    total: n(0)?,
                    geometry: n(1)?,
                    images: n(2)?,
                    included: n(3)?,
                    excluded: n(4)?,
                    missing: n(5)?,
                    processed: n(6)?,
                    pending: n(7)?,
                    failed: n(8)?,
                    selected: n(9)?,
                    tagged: n(10)?,
                })
            },
        )?;
        Ok(counts)
    }
}

/// Map a row selected with `RECORD_COLUMNS`; tags and objects are loaded separately
fn record_from_row(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let size: Option<i64> = row.get(7)?;
    let mtime: Option<i64> = row.get(8)?;
    let hash: Option<String> = row.get(9)?;
    let fingerprint = match (size, mtime) {
        (Some(size), Some(mtime_ns)) => Some(Fingerprint {
            size: size.max(0) as u64,
            mtime_ns,
            hash,
        }),
        _ => None,
    };

    Ok(FileRecord {
        id: row.get(0)?,
        rel_path: row.get(1)?,
        kind: parse_column(2, row.get(2)?)?,
        status: parse_column(3, row.get(3)?)?,
        included: row.get(4)?,
        processed: row.get(5)?,
        selected: row.get(6)?,
        fingerprint,
        title: row.get(10)?,
        short_name: row.get(11)?,
        author: row.get(12)?,
        object_names: Vec::new(),
        primary_object: None,
        tags: Vec::new(),
        has_thumbnail: row.get(13)?,
        discovered_at: parse_datetime(&row.get::<_, String>(14)?),
        processed_at: row
            .get::<_, Option<String>>(15)?
            .map(|s| parse_datetime(&s)),
        last_error: row.get(16)?,
    })
}

fn parse_column<T: FromStr<Err = String>>(idx: usize, value: String) -> rusqlite::Result<T> {
    value.parse().map_err(|e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

/// Parse an RFC 3339 timestamp written by this store
fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

/// Error unless an UPDATE/DELETE touched the record
fn ensure_updated(changed: usize, id: i64) -> Result<(), StoreError> {
    if changed == 0 {
        Err(StoreError::NotFound(format!("id {}", id)))
    } else {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_open_on_disk_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("metadata.db");
        {
            let store = FileStore::open(&db).unwrap();
            store
                .insert_discovered("a.g", FileKind::Geometry, true)
                .unwrap();
        }
        let store = FileStore::open(&db).unwrap();
        assert!(store.get_by_path("a.g").unwrap().is_some());
        assert_eq!(store.counts().total, 1);
    }

    #[test]
    fn test_counts_are_cached_until_refresh() {
        let store = store();
        processed_geometry(&store, "a.g", &["a"]);
        assert_eq!(store.counts().total, 0);

        let counts = store.refresh().unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.processed, 1);
        assert_eq!(store.counts(), counts);
    }

    #[test]
    fn test_counts_classify_states() {
        let store = store();
        processed_geometry(&store, "done.g", &[]);
        store
            .insert_discovered("pending.g", FileKind::Geometry, true)
            .unwrap();
        let failed = store
            .insert_discovered("failed.g", FileKind::Geometry, true)
            .unwrap();
        store
            .record_failure(failed, &fingerprint(1, 1), "bad header")
            .unwrap();
        let gone = processed_geometry(&store, "gone.g", &[]);
        store.mark_missing(gone).unwrap();
        store.insert_discovered("pic.png", FileKind::Image, false).unwrap();

        let counts = store.refresh().unwrap();
        assert_eq!(counts.total, 5);
        assert_eq!(counts.geometry, 4);
        assert_eq!(counts.images, 1);
        assert_eq!(counts.processed, 1);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.missing, 1);
        assert_eq!(counts.excluded, 1);
    }
}
