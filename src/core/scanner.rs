//! Directory scanner
//!
//! Walks a library root, collects geometry and image files, and classifies
//! each one against a snapshot of the store. Scanning never writes to the
//! store; applying the result is the reconciliation engine's job.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

use crate::core::cancel::CancelFlag;
use crate::core::library::{relative_key, META_DIR};
use crate::core::store::{
    hash_file, path_is_under, FileKind, FileStatus, Fingerprint, SnapshotEntry,
};

/// Fatal scan failures; per-directory problems are warnings instead
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("library root {path:?} is unreadable: {source}")]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Knobs for a single scan
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanOptions {
    /// Skip directories whose name starts with '.'
    pub skip_hidden: bool,
    /// Treat unchanged files whose last extraction failed as changed
    pub retry_failed: bool,
}

/// A candidate file found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub kind: FileKind,
}

/// Raw result of walking the tree
#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<DiscoveredFile>,
    /// Unreadable subdirectories, library-relative
    pub unreadable: Vec<String>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

/// How a discovered file compares to its stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// No record yet
    New,
    /// Record exists but content differs, or it still needs extraction
    Changed,
    /// Record is current
    Unchanged,
}

/// One classified file, in traversal order
#[derive(Debug, Clone)]
pub struct ScanEntry {
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub kind: FileKind,
    pub class: Classification,
    pub record_id: Option<i64>,
    /// Current on-disk fingerprint (hash filled only when it had to be compared)
    pub fingerprint: Fingerprint,
    /// Record was marked missing and the file is back
    pub restored: bool,
    /// Unchanged content but size/mtime moved, so the stored stat is stale
    pub stat_changed: bool,
    /// Inclusion flag at scan time (true for new files); reconcile re-reads it
    pub included: bool,
}

/// A present record whose file was not seen by this scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingEntry {
    pub id: i64,
    pub rel_path: String,
    pub kind: FileKind,
}

/// Classified scan of a library
#[derive(Debug, Default)]
pub struct ScanReport {
    pub entries: Vec<ScanEntry>,
    pub missing: Vec<MissingEntry>,
    pub warnings: Vec<String>,
    pub cancelled: bool,
}

impl ScanReport {
    pub fn count(&self, class: Classification) -> usize {
        self.entries.iter().filter(|e| e.class == class).count()
    }

    pub fn count_kind(&self, kind: FileKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }
}

/// Walk and classify in one step
pub fn scan(
    root: &Path,
    snapshot: &HashMap<String, SnapshotEntry>,
    options: ScanOptions,
    cancel: &CancelFlag,
) -> Result<ScanReport, ScanError> {
    let discovery = discover(root, options, cancel)?;
    Ok(classify(discovery, snapshot, options))
}

/// Enumerate candidate files under `root` in sorted traversal order
///
/// Cancellation is checked at every directory; a cancelled discovery returns
/// what it found so far with `cancelled` set.
pub fn discover(
    root: &Path,
    options: ScanOptions,
    cancel: &CancelFlag,
) -> Result<Discovery, ScanError> {
    fs::read_dir(root).map_err(|source| ScanError::RootUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut discovery = Discovery::default();
    let mut seen = HashSet::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| keep_entry(e, options.skip_hidden));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let rel = err
                    .path()
                    .and_then(|p| p.strip_prefix(root).ok())
                    .map(relative_key)
                    .unwrap_or_default();
                tracing::warn!(dir = %rel, error = %err, "skipping unreadable directory");
                discovery.warnings.push(format!("{}: {}", display_rel(&rel), err));
                discovery.unreadable.push(rel);
                continue;
            }
        };

        if entry.file_type().is_dir() {
            if cancel.is_cancelled() {
                tracing::debug!("scan cancelled");
                discovery.cancelled = true;
                break;
            }
            continue;
        }

        let is_file = entry.file_type().is_file()
            || (entry.file_type().is_symlink() && entry.path().is_file());
        if !is_file {
            continue;
        }

        let Some(kind) = FileKind::from_path(entry.path()) else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(root) else {
            continue;
        };
        let rel_path = relative_key(rel);
        if !seen.insert(rel_path.clone()) {
            continue;
        }

        tracing::trace!(path = %rel_path, kind = %kind, "discovered");
        discovery.files.push(DiscoveredFile {
            rel_path,
            abs_path: entry.path().to_path_buf(),
            kind,
        });
    }

    Ok(discovery)
}

/// Compare discovered files against the stored snapshot
pub fn classify(
    discovery: Discovery,
    snapshot: &HashMap<String, SnapshotEntry>,
    options: ScanOptions,
) -> ScanReport {
    let mut report = ScanReport {
        warnings: discovery.warnings,
        cancelled: discovery.cancelled,
        ..Default::default()
    };
    let mut seen = HashSet::with_capacity(discovery.files.len());

    for file in discovery.files {
        let current = match Fingerprint::stat(&file.abs_path) {
            Ok(fp) => fp,
            Err(err) => {
                // Vanished between walk and stat; let the missing check handle it
                tracing::warn!(path = %file.rel_path, error = %err, "unable to stat file");
                report
                    .warnings
                    .push(format!("{}: {}", file.rel_path, err));
                continue;
            }
        };
        seen.insert(file.rel_path.clone());

        let entry = match snapshot.get(&file.rel_path) {
            None => ScanEntry {
                rel_path: file.rel_path,
                abs_path: file.abs_path,
                kind: file.kind,
                class: Classification::New,
                record_id: None,
                fingerprint: current,
                restored: false,
                stat_changed: false,
                included: true,
            },
            Some(stored) => {
                let (class, fingerprint, stat_changed) =
                    compare(stored, current, &file.abs_path, options);
                ScanEntry {
                    rel_path: file.rel_path,
                    abs_path: file.abs_path,
                    kind: file.kind,
                    class,
                    record_id: Some(stored.id),
                    fingerprint,
                    restored: stored.status == FileStatus::Missing,
                    stat_changed,
                    included: stored.included,
                }
            }
        };
        tracing::trace!(path = %entry.rel_path, class = ?entry.class, "classified");
        report.entries.push(entry);
    }

    // A partial walk says nothing about files it never reached
    if !report.cancelled {
        let mut missing: Vec<MissingEntry> = snapshot
            .iter()
            .filter(|(path, entry)| {
                entry.status == FileStatus::Present
                    && !seen.contains(*path)
                    && !discovery
                        .unreadable
                        .iter()
                        .any(|dir| dir.is_empty() || path_is_under(path, dir))
            })
            .map(|(path, entry)| MissingEntry {
                id: entry.id,
                rel_path: path.clone(),
                kind: entry.kind,
            })
            .collect();
        missing.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        report.missing = missing;
    }

    report
}

/// Classify an existing record; returns (class, fingerprint to store, stat moved)
fn compare(
    stored: &SnapshotEntry,
    mut current: Fingerprint,
    path: &Path,
    options: ScanOptions,
) -> (Classification, Fingerprint, bool) {
    let Some(previous) = &stored.fingerprint else {
        return (Classification::Changed, current, false);
    };

    let mut stat_changed = false;
    if !previous.same_stat(&current) {
        // Same size and a known hash: the content may be untouched (copy, touch)
        let content_same = match (&previous.hash, previous.size == current.size) {
            (Some(old_hash), true) => match hash_file(path) {
                Ok(hash) => {
                    let same = &hash == old_hash;
                    current.hash = Some(hash);
                    same
                }
                Err(_) => false,
            },
            _ => false,
        };
        if !content_same {
            return (Classification::Changed, current, false);
        }
        stat_changed = true;
    } else {
        current.hash = previous.hash.clone();
    }

    // Unprocessed records are pending work unless their last attempt failed
    if !stored.processed && (!stored.has_error || options.retry_failed) {
        return (Classification::Changed, current, stat_changed);
    }

    (Classification::Unchanged, current, stat_changed)
}

fn keep_entry(entry: &DirEntry, skip_hidden: bool) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    let name = entry.file_name().to_string_lossy();
    if entry.depth() == 1 && name == META_DIR {
        return false;
    }
    !(skip_hidden && name.starts_with('.'))
}

fn display_rel(rel: &str) -> &str {
    if rel.is_empty() {
        "."
    } else {
        rel
    }
}
