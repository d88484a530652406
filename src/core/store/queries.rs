//! Query methods for retrieving file records
//!
//! Lookups by id/path, filtered listings, consumer-facing search, and the
//! snapshot the scanner classifies against.

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use super::{
    parse_column, record_from_row, FileRecord, FileStore, Fingerprint, RecordFilter,
    SearchField, SnapshotEntry, StoreError, RECORD_COLUMNS,
};

impl FileStore {
    /// Get a record by id; `Ok(None)` when no such record exists
    pub fn get(&self, id: i64) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn.lock();
        Self::fetch_one(&conn, "f.id = ?1", Value::Integer(id))
    }

    /// Get a record by its library-relative path
    pub fn get_by_path(&self, rel_path: &str) -> Result<Option<FileRecord>, StoreError> {
        let conn = self.conn.lock();
        Self::fetch_one(&conn, "f.rel_path = ?1", Value::Text(rel_path.to_string()))
    }

    /// List records matching a filter, ordered by path
    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<FileRecord>, StoreError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(kind) = filter.kind {
            values.push(Value::Text(kind.as_str().to_string()));
            clauses.push(format!("f.kind = ?{}", values.len()));
        }
        if let Some(status) = filter.status {
            values.push(Value::Text(status.as_str().to_string()));
            clauses.push(format!("f.status = ?{}", values.len()));
        }
        if let Some(included) = filter.included {
            values.push(Value::Integer(included as i64));
            clauses.push(format!("f.included = ?{}", values.len()));
        }
        if let Some(processed) = filter.processed {
            values.push(Value::Integer(processed as i64));
            clauses.push(format!("f.processed = ?{}", values.len()));
        }
        if let Some(selected) = filter.selected {
            values.push(Value::Integer(selected as i64));
            clauses.push(format!("f.selected = ?{}", values.len()));
        }

        let where_clause = if clauses.is_empty() {
            "1 = 1".to_string()
        } else {
            clauses.join(" AND ")
        };

        let conn = self.conn.lock();
        Self::fetch_many(&conn, &where_clause, values)
    }

    /// Records consumers show: included, present on disk, and processed
    pub fn presented(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.list(&RecordFilter::presented())
    }

    /// Selected records eligible for a report
    pub fn selected_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        self.list(&RecordFilter {
            selected: Some(true),
            ..RecordFilter::presented()
        })
    }

    /// Case-insensitive substring search over presented records
    ///
    /// An empty query matches every presented record. Matching happens here
    /// rather than in SQL because SQLite's `lower()` only folds ASCII.
    pub fn search(&self, query: &str, field: SearchField) -> Result<Vec<FileRecord>, StoreError> {
        let query = query.trim().to_lowercase();
        let records = self.presented()?;
        if query.is_empty() {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .filter(|record| record_matches(record, field, &query))
            .collect())
    }

    /// Tags of one record in insertion order
    pub fn tags_for(&self, id: i64) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        Ok(Self::load_tags(&conn, id)?)
    }

    /// Every distinct tag with the number of records carrying it
    pub fn all_tags(&self) -> Result<Vec<(String, usize)>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT tag, COUNT(*) FROM tags GROUP BY tag COLLATE NOCASE ORDER BY tag COLLATE NOCASE",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as usize))
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Thumbnail bytes of a record, if one is stored
    pub fn thumbnail(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn.lock();
        let blob: Option<Option<Vec<u8>>> = conn
            .query_row(
                "SELECT thumbnail FROM files WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(data) => Ok(data),
            None => Err(StoreError::NotFound(format!("id {}", id))),
        }
    }

    /// Geometry record whose path matches `<stem>.g`, ignoring extension case
    pub fn find_geometry_by_stem(&self, rel_stem: &str) -> Result<Option<i64>, StoreError> {
        let conn = self.conn.lock();
        let id = conn
            .query_row(
                r#"SELECT id FROM files
                   WHERE kind = 'geometry' AND lower(rel_path) = lower(?1 || '.g')
                   ORDER BY id LIMIT 1"#,
                params![rel_stem],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Per-path view of every record, for scan classification
    pub fn snapshot(&self) -> Result<HashMap<String, SnapshotEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"SELECT id, rel_path, kind, status, included, processed,
                      file_size, file_mtime, file_hash, last_error IS NOT NULL
               FROM files"#,
        )?;
        let rows = stmt.query_map([], |row| {
            let size: Option<i64> = row.get(6)?;
            let mtime: Option<i64> = row.get(7)?;
            let fingerprint = match (size, mtime) {
                (Some(size), Some(mtime_ns)) => Some(Fingerprint {
                    size: size.max(0) as u64,
                    mtime_ns,
                    hash: row.get(8)?,
                }),
                _ => None,
            };
            Ok((
                row.get::<_, String>(1)?,
                SnapshotEntry {
                    id: row.get(0)?,
                    kind: parse_column(2, row.get(2)?)?,
                    status: parse_column(3, row.get(3)?)?,
                    included: row.get(4)?,
                    processed: row.get(5)?,
                    fingerprint,
                    has_error: row.get(9)?,
                },
            ))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    /// Directory exclusion rules, sorted
    pub fn excluded_dirs(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock();
        Ok(Self::load_excluded_dirs(&conn)?)
    }

    /// Current inclusion flag of a record
    pub fn is_included(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT included FROM files WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("id {}", id)))
    }

    /// True when a path falls under an excluded directory
    pub fn is_path_excluded(&self, rel_path: &str) -> Result<bool, StoreError> {
        let dirs = self.excluded_dirs()?;
        Ok(dirs.iter().any(|dir| path_is_under(rel_path, dir)))
    }

    // =====================================================================
    // Helpers (take the already-locked connection)
    // =====================================================================

    fn fetch_one(
        conn: &Connection,
        where_clause: &str,
        value: Value,
    ) -> Result<Option<FileRecord>, StoreError> {
        let sql = format!("SELECT {} FROM files f WHERE {}", RECORD_COLUMNS, where_clause);
        let record = conn
            .query_row(&sql, params![value], record_from_row)
            .optional()?;
        match record {
            Some(mut record) => {
                Self::load_children(conn, &mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn fetch_many(
        conn: &Connection,
        where_clause: &str,
        values: Vec<Value>,
    ) -> Result<Vec<FileRecord>, StoreError> {
        let sql = format!(
            "SELECT {} FROM files f WHERE {} ORDER BY f.rel_path",
            RECORD_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut records = stmt
            .query_map(params_from_iter(values), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for record in &mut records {
            Self::load_children(conn, record)?;
        }
        Ok(records)
    }

    fn load_children(conn: &Connection, record: &mut FileRecord) -> rusqlite::Result<()> {
        let mut stmt = conn.prepare_cached(
            "SELECT name, is_primary FROM objects WHERE file_id = ?1 ORDER BY position",
        )?;
        let rows = stmt.query_map(params![record.id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
        })?;
        for row in rows {
            let (name, is_primary) = row?;
            if is_primary && record.primary_object.is_none() {
                record.primary_object = Some(name.clone());
            }
            record.object_names.push(name);
        }
        record.tags = Self::load_tags(conn, record.id)?;
        Ok(())
    }

    fn load_tags(conn: &Connection, id: i64) -> rusqlite::Result<Vec<String>> {
        let mut stmt =
            conn.prepare_cached("SELECT tag FROM tags WHERE file_id = ?1 ORDER BY rowid")?;
        let rows = stmt.query_map(params![id], |row| row.get(0))?;
        rows.collect()
    }

    fn load_excluded_dirs(conn: &Connection) -> rusqlite::Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT rel_dir FROM excluded_dirs ORDER BY rel_dir")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}

/// `rel_path` equals `dir` or lies beneath it
/// `query` is already lowercased
fn record_matches(record: &FileRecord, field: SearchField, query: &str) -> bool {
    let hit = |text: &str| text.to_lowercase().contains(query);
    match field {
        SearchField::Title => hit(&record.title),
        SearchField::Name => hit(&record.short_name),
        SearchField::Path => hit(&record.rel_path),
        SearchField::Tags => record.tags.iter().any(|t| hit(t)),
        SearchField::Object => record.object_names.iter().any(|o| hit(o)),
        SearchField::Any => [
            SearchField::Title,
            SearchField::Name,
            SearchField::Path,
            SearchField::Tags,
            SearchField::Object,
        ]
        .into_iter()
        .any(|f| record_matches(record, f, query)),
    }
}

pub fn path_is_under(rel_path: &str, dir: &str) -> bool {
    rel_path == dir
        || (rel_path.len() > dir.len()
            && rel_path.starts_with(dir)
            && rel_path.as_bytes()[dir.len()] == b'/')
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::{FileKind, FileStatus};
    use super::*;

    #[test]
    fn test_get_missing_is_none() {
        let store = store();
        assert!(store.get(7).unwrap().is_none());
        assert!(store.get_by_path("nope.g").unwrap().is_none());
        assert!(matches!(
            store.thumbnail(7).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn test_list_filters_combine() {
        let store = store();
        processed_geometry(&store, "b.g", &[]);
        processed_geometry(&store, "a.g", &[]);
        store
            .insert_discovered("pending.g", FileKind::Geometry, true)
            .unwrap();
        store.insert_discovered("pic.png", FileKind::Image, true).unwrap();

        let all = store.list(&RecordFilter::default()).unwrap();
        let paths: Vec<_> = all.iter().map(|r| r.rel_path.as_str()).collect();
        assert_eq!(paths, vec!["a.g", "b.g", "pending.g", "pic.png"]);

        let pending = store
            .list(&RecordFilter {
                kind: Some(FileKind::Geometry),
                processed: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].rel_path, "pending.g");
    }

    #[test]
    fn test_presented_excludes_missing_excluded_and_pending() {
        let store = store();
        processed_geometry(&store, "shown.g", &[]);
        let gone = processed_geometry(&store, "gone.g", &[]);
        store.mark_missing(gone).unwrap();
        let hidden = processed_geometry(&store, "hidden.g", &[]);
        store.set_included(hidden, false).unwrap();
        store
            .insert_discovered("pending.g", FileKind::Geometry, true)
            .unwrap();

        let presented = store.presented().unwrap();
        assert_eq!(presented.len(), 1);
        assert_eq!(presented[0].rel_path, "shown.g");
        assert_eq!(
            store.get(gone).unwrap().unwrap().status,
            FileStatus::Missing
        );
    }

    #[test]
    fn test_search_fields() {
        let store = store();
        let truck = processed_geometry(&store, "vehicles/m35.g", &["cab.r", "Wheel.s"]);
        store.add_tag(truck, "Military").unwrap();
        let other = processed_geometry(&store, "ships/boat.g", &["hull"]);
        store.set_short_name(other, "Patrol Boat").unwrap();

        let ids = |field, q: &str| -> Vec<String> {
            store
                .search(q, field)
                .unwrap()
                .into_iter()
                .map(|r| r.rel_path)
                .collect()
        };

        assert_eq!(ids(SearchField::Tags, "milit"), vec!["vehicles/m35.g"]);
        assert_eq!(ids(SearchField::Object, "WHEEL"), vec!["vehicles/m35.g"]);
        assert_eq!(ids(SearchField::Name, "patrol"), vec!["ships/boat.g"]);
        assert_eq!(ids(SearchField::Path, "ships/"), vec!["ships/boat.g"]);
        assert_eq!(ids(SearchField::Title, "m35"), vec!["vehicles/m35.g"]);
        assert!(ids(SearchField::Title, "military").is_empty());
        assert_eq!(ids(SearchField::Any, "hull"), vec!["ships/boat.g"]);
        assert_eq!(ids(SearchField::Any, "").len(), 2);
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let store = store();
        processed_geometry(&store, "a_b.g", &[]);
        processed_geometry(&store, "axb.g", &[]);
        let hits = store.search("a_b", SearchField::Path).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_folds_non_ascii_case() {
        let store = store();
        let id = processed_geometry(&store, "pastry.g", &[]);
        store
            .complete_extraction(id, &fingerprint(1, 1), "Éclair Assembly", &[])
            .unwrap();
        store.add_tag(id, "Überlast").unwrap();

        assert_eq!(store.search("éclair", SearchField::Title).unwrap().len(), 1);
        assert_eq!(store.search("ÉCLAIR", SearchField::Any).unwrap().len(), 1);
        assert_eq!(store.search("über", SearchField::Tags).unwrap().len(), 1);
    }

    #[test]
    fn test_selected_records_only_presented() {
        let store = store();
        let a = processed_geometry(&store, "a.g", &[]);
        let b = processed_geometry(&store, "b.g", &[]);
        store.set_selected(a, true).unwrap();
        store.set_selected(b, true).unwrap();
        store.mark_missing(b).unwrap();

        let selected = store.selected_records().unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, a);
        assert_eq!(store.clear_selection().unwrap(), 1);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let store = store();
        let id = processed_geometry(&store, "a.g", &[]);
        let snapshot = store.snapshot().unwrap();
        let entry = &snapshot["a.g"];
        assert_eq!(entry.id, id);
        assert!(entry.processed);
        assert_eq!(entry.fingerprint, Some(fingerprint(10, 1)));
        assert!(!entry.has_error);
    }

    #[test]
    fn test_thumbnail_and_sibling_lookup() {
        let store = store();
        let id = processed_geometry(&store, "parts/Bolt.G", &[]);
        assert_eq!(store.find_geometry_by_stem("parts/bolt").unwrap(), Some(id));
        assert_eq!(store.find_geometry_by_stem("parts/nut").unwrap(), None);

        assert!(store.thumbnail(id).unwrap().is_none());
        store.set_thumbnail(id, Some(&[1, 2, 3])).unwrap();
        assert_eq!(store.thumbnail(id).unwrap(), Some(vec![1, 2, 3]));
        assert!(store.get(id).unwrap().unwrap().has_thumbnail);
    }

    #[test]
    fn test_all_tags_counts() {
        let store = store();
        let a = processed_geometry(&store, "a.g", &[]);
        let b = processed_geometry(&store, "b.g", &[]);
        store.add_tag(a, "truck").unwrap();
        store.add_tag(b, "Truck").unwrap();
        store.add_tag(b, "armor").unwrap();

        let tags = store.all_tags().unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0], ("armor".to_string(), 1));
        assert_eq!(tags[1].1, 2);
    }

    #[test]
    fn test_path_is_under() {
        assert!(path_is_under("old/a.g", "old"));
        assert!(path_is_under("old", "old"));
        assert!(!path_is_under("older/a.g", "old"));
    }
}
