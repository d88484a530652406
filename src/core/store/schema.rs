//! Database schema initialization

use rusqlite::{params, Connection, OptionalExtension};

use super::{FileStore, StoreError, SCHEMA_VERSION};

impl FileStore {
    /// Create tables on a fresh database, or verify the version of an existing one
    ///
    /// Unlike a disposable cache the store holds user data (tags, exclusions),
    /// so a version mismatch is reported rather than rebuilt.
    pub(super) fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        let has_version_table: bool = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
                [],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        if has_version_table {
            let found: i32 = conn
                .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                    row.get(0)
                })
                .optional()?
                .unwrap_or(0);
            if found != SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    found,
                    expected: SCHEMA_VERSION,
                });
            }
            return Ok(());
        }

        // Tables and version row commit together; a half-initialized file
        // would otherwise read back as version 0
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(
            r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- One row per indexed file, keyed by library-relative path
            CREATE TABLE IF NOT EXISTS files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rel_path TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'present',
                included INTEGER NOT NULL DEFAULT 1,
                processed INTEGER NOT NULL DEFAULT 0,
                selected INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER,
                file_mtime INTEGER,
                file_hash TEXT,
                title TEXT NOT NULL DEFAULT '',
                short_name TEXT NOT NULL,
                author TEXT,
                thumbnail BLOB,
                discovered_at TEXT NOT NULL,
                processed_at TEXT,
                last_error TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_files_kind ON files(kind);
            CREATE INDEX IF NOT EXISTS idx_files_state ON files(status, included, processed);

            -- Ordered object names extracted from geometry files
            CREATE TABLE IF NOT EXISTS objects (
                file_id INTEGER NOT NULL,
                position INTEGER NOT NULL,
                name TEXT NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (file_id, position),
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_objects_name ON objects(name);

            -- User or generated tags; insertion order is rowid order
            CREATE TABLE IF NOT EXISTS tags (
                file_id INTEGER NOT NULL,
                tag TEXT NOT NULL COLLATE NOCASE,
                added_at TEXT NOT NULL,
                PRIMARY KEY (file_id, tag),
                FOREIGN KEY (file_id) REFERENCES files(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_tags_tag ON tags(tag);

            -- Directories the user excluded; files under them start excluded
            CREATE TABLE IF NOT EXISTS excluded_dirs (
                rel_dir TEXT PRIMARY KEY
            );
            "#,
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
            params![SCHEMA_VERSION],
        )?;
        tx.commit()?;

        Ok(())
    }
}
