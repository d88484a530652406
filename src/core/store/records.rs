//! Record mutations
//!
//! Indexing-side writes (discovery, extraction results, missing marks) and
//! user-side edits (tags, inclusion, selection, properties).

use rusqlite::{params, Connection, OptionalExtension};

use super::{ensure_updated, now, FileKind, FileStore, Fingerprint, StoreError};

impl FileStore {
    // =====================================================================
    // Indexing-side writes
    // =====================================================================

    /// Insert a newly seen file, or return the id of the existing record.
    ///
    /// A file under an excluded directory is inserted with `included = 0`
    /// whatever `included` says; the rule is read under the same lock that
    /// `exclude_dir` takes.
    pub fn insert_discovered(
        &self,
        rel_path: &str,
        kind: FileKind,
        included: bool,
    ) -> Result<i64, StoreError> {
        let short_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        let conn = self.conn.lock();
        conn.execute(
            r#"INSERT OR IGNORE INTO files (rel_path, kind, included, short_name, discovered_at)
               SELECT ?1, ?2, ?3 AND NOT EXISTS (
                   SELECT 1 FROM excluded_dirs d
                   WHERE ?1 = d.rel_dir
                      OR substr(?1, 1, length(d.rel_dir) + 1) = d.rel_dir || '/'
               ), ?4, ?5"#,
            params![rel_path, kind.as_str(), included, short_name, now()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM files WHERE rel_path = ?1",
            params![rel_path],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// File was seen on disk again
    pub fn mark_present(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET status = 'present' WHERE id = ?1",
            params![id],
        )?;
        ensure_updated(n, id)
    }

    /// Soft-remove: the file is gone from disk but its tags and metadata stay
    pub fn mark_missing(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET status = 'missing', selected = 0 WHERE id = ?1",
            params![id],
        )?;
        ensure_updated(n, id)
    }

    /// Content changed: drop the processed flag before re-extraction
    pub fn mark_stale(&self, id: i64) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET processed = 0 WHERE id = ?1",
            params![id],
        )?;
        ensure_updated(n, id)
    }

    /// Commit a successful extraction in one transaction
    ///
    /// Objects are replaced wholesale. A primary object survives when an
    /// object of the same name still exists in the new list.
    pub fn complete_extraction(
        &self,
        id: i64,
        fingerprint: &Fingerprint,
        title: &str,
        object_names: &[String],
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let n = tx.execute(
            r#"UPDATE files SET processed = 1, title = ?2, file_size = ?3, file_mtime = ?4,
                   file_hash = ?5, processed_at = ?6, last_error = NULL
               WHERE id = ?1"#,
            params![
                id,
                title,
                fingerprint.size as i64,
                fingerprint.mtime_ns,
                fingerprint.hash,
                now()
            ],
        )?;
        ensure_updated(n, id)?;

        let primary: Option<String> = tx
            .query_row(
                "SELECT name FROM objects WHERE file_id = ?1 AND is_primary = 1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        tx.execute("DELETE FROM objects WHERE file_id = ?1", params![id])?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO objects (file_id, position, name, is_primary) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut primary_kept = false;
            for (position, name) in object_names.iter().enumerate() {
                let is_primary = !primary_kept && primary.as_deref() == Some(name.as_str());
                primary_kept |= is_primary;
                insert.execute(params![id, position as i64, name, is_primary])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    /// Record a failed extraction; the fingerprint is kept so the file is not
    /// retried until it changes (or retry is requested)
    pub fn record_failure(
        &self,
        id: i64,
        fingerprint: &Fingerprint,
        message: &str,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            r#"UPDATE files SET processed = 0, file_size = ?2, file_mtime = ?3, file_hash = ?4,
                   last_error = ?5
               WHERE id = ?1"#,
            params![
                id,
                fingerprint.size as i64,
                fingerprint.mtime_ns,
                fingerprint.hash,
                message
            ],
        )?;
        ensure_updated(n, id)
    }

    /// Images need no extraction; recording the fingerprint completes them
    pub fn mark_image_processed(
        &self,
        id: i64,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            r#"UPDATE files SET processed = 1, file_size = ?2, file_mtime = ?3, file_hash = ?4,
                   processed_at = ?5, last_error = NULL
               WHERE id = ?1"#,
            params![
                id,
                fingerprint.size as i64,
                fingerprint.mtime_ns,
                fingerprint.hash,
                now()
            ],
        )?;
        ensure_updated(n, id)
    }

    /// Store a new fingerprint without touching extraction state
    pub fn update_fingerprint(&self, id: i64, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET file_size = ?2, file_mtime = ?3, file_hash = ?4 WHERE id = ?1",
            params![
                id,
                fingerprint.size as i64,
                fingerprint.mtime_ns,
                fingerprint.hash
            ],
        )?;
        ensure_updated(n, id)
    }

    pub fn set_thumbnail(&self, id: i64, data: Option<&[u8]>) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET thumbnail = ?2 WHERE id = ?1",
            params![id, data],
        )?;
        ensure_updated(n, id)
    }

    // =====================================================================
    // User-side edits
    // =====================================================================

    pub fn set_included(&self, id: i64, included: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET included = ?2, selected = selected AND ?2 WHERE id = ?1",
            params![id, included],
        )?;
        ensure_updated(n, id)
    }

    pub fn set_selected(&self, id: i64, selected: bool) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET selected = ?2 WHERE id = ?1",
            params![id, selected],
        )?;
        ensure_updated(n, id)
    }

    /// Deselect everything; returns how many records were selected
    pub fn clear_selection(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Ok(conn.execute("UPDATE files SET selected = 0 WHERE selected = 1", [])?)
    }

    pub fn set_short_name(&self, id: i64, short_name: &str) -> Result<(), StoreError> {
        let short_name = short_name.trim();
        if short_name.is_empty() {
            return Err(StoreError::InvalidValue("short name cannot be empty".into()));
        }
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET short_name = ?2 WHERE id = ?1",
            params![id, short_name],
        )?;
        ensure_updated(n, id)
    }

    /// Set or clear (None / blank) the author
    pub fn set_author(&self, id: i64, author: Option<&str>) -> Result<(), StoreError> {
        let author = author.map(str::trim).filter(|a| !a.is_empty());
        let conn = self.conn.lock();
        let n = conn.execute(
            "UPDATE files SET author = ?2 WHERE id = ?1",
            params![id, author],
        )?;
        ensure_updated(n, id)
    }

    /// Choose the object reports render for this file (None clears it)
    pub fn set_primary_object(&self, id: i64, name: Option<&str>) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::require_record(&tx, id)?;

        tx.execute(
            "UPDATE objects SET is_primary = 0 WHERE file_id = ?1",
            params![id],
        )?;
        if let Some(name) = name {
            let n = tx.execute(
                r#"UPDATE objects SET is_primary = 1
                   WHERE file_id = ?1 AND position =
                       (SELECT MIN(position) FROM objects WHERE file_id = ?1 AND name = ?2)"#,
                params![id, name],
            )?;
            if n == 0 {
                return Err(StoreError::InvalidValue(format!(
                    "object '{}' is not in this file",
                    name
                )));
            }
        }

        tx.commit()?;
        Ok(())
    }

    // =====================================================================
    // Tags
    // =====================================================================

    /// Add a tag; returns false if it was already present (case-insensitive)
    pub fn add_tag(&self, id: i64, tag: &str) -> Result<bool, StoreError> {
        let tag = normalize_tag(tag)?;
        let conn = self.conn.lock();
        Self::require_record(&conn, id)?;
        let n = conn.execute(
            "INSERT OR IGNORE INTO tags (file_id, tag, added_at) VALUES (?1, ?2, ?3)",
            params![id, tag, now()],
        )?;
        Ok(n > 0)
    }

    /// Remove a tag; returns false if the record didn't have it
    pub fn remove_tag(&self, id: i64, tag: &str) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        Self::require_record(&conn, id)?;
        let n = conn.execute(
            "DELETE FROM tags WHERE file_id = ?1 AND tag = ?2",
            params![id, tag.trim()],
        )?;
        Ok(n > 0)
    }

    /// Remove all tags of a record; returns how many were removed
    pub fn clear_tags(&self, id: i64) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        Self::require_record(&conn, id)?;
        Ok(conn.execute("DELETE FROM tags WHERE file_id = ?1", params![id])?)
    }

    /// Add several tags at once, skipping blanks and duplicates; returns how many were new
    pub fn merge_tags(&self, id: i64, tags: &[String]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::require_record(&tx, id)?;

        let mut added = 0;
        {
            let mut insert = tx.prepare(
                "INSERT OR IGNORE INTO tags (file_id, tag, added_at) VALUES (?1, ?2, ?3)",
            )?;
            let stamp = now();
            for tag in tags {
                if let Ok(tag) = normalize_tag(tag) {
                    added += insert.execute(params![id, tag, stamp])?;
                }
            }
        }

        tx.commit()?;
        Ok(added)
    }

    // =====================================================================
    // Directory exclusion rules
    // =====================================================================

    /// Exclude a directory: store the rule and exclude every record under it.
    /// Returns the number of records affected.
    pub fn exclude_dir(&self, rel_dir: &str) -> Result<usize, StoreError> {
        let rel_dir = normalize_dir(rel_dir)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO excluded_dirs (rel_dir) VALUES (?1)",
            params![rel_dir],
        )?;
        let n = tx.execute(
            r#"UPDATE files SET included = 0, selected = 0
               WHERE included = 1 AND substr(rel_path, 1, length(?1) + 1) = ?1 || '/'"#,
            params![rel_dir],
        )?;
        tx.commit()?;
        Ok(n)
    }

    /// Drop the rule for a directory (and nested rules) and re-include its records.
    /// Returns the number of records affected.
    pub fn include_dir(&self, rel_dir: &str) -> Result<usize, StoreError> {
        let rel_dir = normalize_dir(rel_dir)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            r#"DELETE FROM excluded_dirs
               WHERE rel_dir = ?1 OR substr(rel_dir, 1, length(?1) + 1) = ?1 || '/'"#,
            params![rel_dir],
        )?;
        let n = tx.execute(
            r#"UPDATE files SET included = 1
               WHERE included = 0 AND substr(rel_path, 1, length(?1) + 1) = ?1 || '/'"#,
            params![rel_dir],
        )?;
        tx.commit()?;
        Ok(n)
    }

    // =====================================================================
    // Reset
    // =====================================================================

    /// Drop every record, tag, object and exclusion rule
    pub fn reset(&self) -> Result<(), StoreError> {
        {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            tx.execute_batch(
                r#"
                DELETE FROM tags;
                DELETE FROM objects;
                DELETE FROM files;
                DELETE FROM excluded_dirs;
                DELETE FROM sqlite_sequence WHERE name = 'files';
                "#,
            )?;
            tx.commit()?;
        }
        self.refresh()?;
        Ok(())
    }

    fn require_record(conn: &Connection, id: i64) -> Result<(), StoreError> {
        let exists: Option<i64> = conn
            .query_row("SELECT id FROM files WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound(format!("id {}", id))),
        }
    }
}

fn normalize_tag(tag: &str) -> Result<&str, StoreError> {
    let tag = tag.trim();
    if tag.is_empty() {
        Err(StoreError::InvalidValue("tag cannot be empty".into()))
    } else {
        Ok(tag)
    }
}

fn normalize_dir(rel_dir: &str) -> Result<&str, StoreError> {
    let rel_dir = rel_dir.trim_matches('/');
    if rel_dir.is_empty() {
        Err(StoreError::InvalidValue(
            "cannot exclude the library root".into(),
        ))
    } else {
        Ok(rel_dir)
    }
}
