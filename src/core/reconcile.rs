//! Reconciliation engine
//!
//! Applies a classified scan to the store one file at a time, invoking the
//! metadata extractor for new and changed geometry. Each file's mutation is
//! committed before the next file starts, so an interrupted pass leaves the
//! store consistent and the next scan re-detects unfinished work.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::core::cancel::CancelFlag;
use crate::core::extractor::MetadataExtractor;
use crate::core::scanner::{self, Classification, ScanEntry, ScanError, ScanOptions, ScanReport};
use crate::core::store::{FileKind, FileStore, Fingerprint, StoreError};

/// Pass-level failures; per-file failures never become one of these
#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    ScanRootUnreadable(#[from] ScanError),

    #[error("metadata store failure: {0}")]
    Store(#[from] StoreError),

    #[error("indexing worker panicked: {0}")]
    WorkerPanicked(String),
}

/// Settings for one scan+reconcile pass
#[derive(Debug, Clone, Copy)]
pub struct PassOptions {
    pub scan: ScanOptions,
    /// Images above this size are not copied into geometry thumbnails
    pub thumbnail_max_bytes: usize,
}

/// Everything a pass needs besides cancellation
#[derive(Clone)]
pub struct PassContext {
    pub root: PathBuf,
    pub store: Arc<FileStore>,
    pub extractor: Arc<dyn MetadataExtractor>,
    pub options: PassOptions,
}

/// Position within the current pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// Relative path of the file just reconciled
    pub current: String,
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    /// `completed / total * 100`, saturating at 100
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

/// What happened to a single file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum FileOutcome {
    Extracted,
    Failed(String),
    ImageRecorded,
    Unchanged,
    /// Excluded by the user; no extraction
    Skipped,
    MarkedMissing,
}

/// Progress event emitted after each file is committed
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub rel_path: String,
    pub kind: FileKind,
    pub outcome: FileOutcome,
    pub progress: Progress,
}

/// Classification totals, reported once the scan finishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScanCounts {
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    /// Files the reconciliation phase will report on
    pub total: usize,
}

/// Intermediate notifications from a running pass
#[derive(Debug, Clone)]
pub enum PassProgress {
    Scanned(ScanCounts),
    File(FileReport),
}

/// Aggregate result of a pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub geometry_found: usize,
    /// Geometry files found this pass that are included and processed afterwards
    pub geometry_processed: usize,
    pub images_found: usize,
    pub images_processed: usize,
    pub new: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub restored: usize,
    pub excluded_skipped: usize,
    pub extraction_calls: usize,
    pub extraction_failures: usize,
    pub warnings: Vec<String>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

/// Scan the library and reconcile the result
pub fn run_pass(
    ctx: &PassContext,
    cancel: &CancelFlag,
    on_progress: &mut dyn FnMut(PassProgress),
) -> Result<PassSummary, PassError> {
    let started = Instant::now();
    tracing::info!(root = %ctx.root.display(), "indexing pass started");

    let snapshot = ctx.store.snapshot()?;
    let report = scanner::scan(&ctx.root, &snapshot, ctx.options.scan, cancel)?;
    on_progress(PassProgress::Scanned(ScanCounts {
        new: report.count(Classification::New),
        changed: report.count(Classification::Changed),
        unchanged: report.count(Classification::Unchanged),
        missing: report.missing.len(),
        total: report.entries.len() + report.missing.len(),
    }));

    let mut summary = reconcile(
        &ctx.store,
        ctx.extractor.as_ref(),
        report,
        ctx.options.thumbnail_max_bytes,
        cancel,
        &mut |file| on_progress(PassProgress::File(file)),
    )?;
    summary.duration_ms = started.elapsed().as_millis() as u64;
    ctx.store.refresh()?;

    tracing::info!(
        geometry_found = summary.geometry_found,
        geometry_processed = summary.geometry_processed,
        extraction_calls = summary.extraction_calls,
        failures = summary.extraction_failures,
        cancelled = summary.cancelled,
        duration_ms = summary.duration_ms,
        "indexing pass finished"
    );
    Ok(summary)
}

/// Apply a classified scan to the store
pub fn reconcile(
    store: &FileStore,
    extractor: &dyn MetadataExtractor,
    report: ScanReport,
    thumbnail_max_bytes: usize,
    cancel: &CancelFlag,
    on_file: &mut dyn FnMut(FileReport),
) -> Result<PassSummary, StoreError> {
    let mut summary = PassSummary {
        geometry_found: report.count_kind(FileKind::Geometry),
        images_found: report.count_kind(FileKind::Image),
        new: report.count(Classification::New),
        changed: report.count(Classification::Changed),
        unchanged: report.count(Classification::Unchanged),
        restored: report.entries.iter().filter(|e| e.restored).count(),
        warnings: report.warnings,
        cancelled: report.cancelled,
        ..Default::default()
    };

    let total = report.entries.len() + report.missing.len();
    let mut completed = 0;
    let mut touched: Vec<(i64, FileKind)> = Vec::with_capacity(report.entries.len());

    for entry in &report.entries {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let (id, outcome) = apply_entry(
            store,
            extractor,
            entry,
            thumbnail_max_bytes,
            &mut summary,
        )?;
        touched.push((id, entry.kind));

        completed += 1;
        on_file(FileReport {
            rel_path: entry.rel_path.clone(),
            kind: entry.kind,
            outcome,
            progress: Progress {
                current: entry.rel_path.clone(),
                completed,
                total,
            },
        });
    }

    if !summary.cancelled {
        for missing in &report.missing {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            store.mark_missing(missing.id)?;
            summary.missing += 1;
            tracing::debug!(path = %missing.rel_path, "marked missing");

            completed += 1;
            on_file(FileReport {
                rel_path: missing.rel_path.clone(),
                kind: missing.kind,
                outcome: FileOutcome::MarkedMissing,
                progress: Progress {
                    current: missing.rel_path.clone(),
                    completed,
                    total,
                },
            });
        }
    }

    // Count from committed state so an unchanged rerun reports the same numbers
    let snapshot = store.snapshot()?;
    let processed_ids: HashMap<i64, bool> = snapshot
        .values()
        .map(|s| (s.id, s.processed && s.included))
        .collect();
    for (id, kind) in touched {
        if processed_ids.get(&id).copied().unwrap_or(false) {
            match kind {
                FileKind::Geometry => summary.geometry_processed += 1,
                FileKind::Image => summary.images_processed += 1,
            }
        }
    }
    if summary.cancelled {
        tracing::info!(completed, total, "pass cancelled");
    }

    Ok(summary)
}

/// Reconcile one entry; returns the record id and what was done
fn apply_entry(
    store: &FileStore,
    extractor: &dyn MetadataExtractor,
    entry: &ScanEntry,
    thumbnail_max_bytes: usize,
    summary: &mut PassSummary,
) -> Result<(i64, FileOutcome), StoreError> {
    match entry.class {
        Classification::Unchanged => {
            let id = existing_id(entry)?;
            if entry.restored {
                store.mark_present(id)?;
            }
            if entry.stat_changed {
                store.update_fingerprint(id, &entry.fingerprint)?;
            }
            tracing::trace!(path = %entry.rel_path, "unchanged");
            Ok((id, FileOutcome::Unchanged))
        }
        Classification::New | Classification::Changed => {
            let id = match entry.record_id {
                Some(id) => {
                    if entry.restored {
                        store.mark_present(id)?;
                    }
                    id
                }
                None => store.insert_discovered(&entry.rel_path, entry.kind, true)?,
            };

            // The scan snapshot may be stale: exclusions can land mid-pass
            if !store.is_included(id)? {
                summary.excluded_skipped += 1;
                tracing::debug!(path = %entry.rel_path, "excluded, skipping");
                return Ok((id, FileOutcome::Skipped));
            }

            if entry.class == Classification::Changed {
                store.mark_stale(id)?;
            }

            let outcome = match entry.kind {
                FileKind::Geometry => extract_geometry(store, extractor, entry, id, summary)?,
                FileKind::Image => {
                    record_image(store, entry, id, thumbnail_max_bytes, summary)?
                }
            };
            Ok((id, outcome))
        }
    }
}

fn extract_geometry(
    store: &FileStore,
    extractor: &dyn MetadataExtractor,
    entry: &ScanEntry,
    id: i64,
    summary: &mut PassSummary,
) -> Result<FileOutcome, StoreError> {
    // Fingerprint before extracting: edits during extraction show up next pass
    let fingerprint = content_fingerprint(entry);

    summary.extraction_calls += 1;
    match extractor.extract(&entry.abs_path) {
        Ok(metadata) => {
            store.complete_extraction(
                id,
                &fingerprint,
                &metadata.title,
                &metadata.object_names,
            )?;
            tracing::debug!(
                path = %entry.rel_path,
                objects = metadata.object_names.len(),
                "extracted"
            );
            Ok(FileOutcome::Extracted)
        }
        Err(err) => {
            summary.extraction_failures += 1;
            let message = err.to_string();
            tracing::warn!(path = %entry.rel_path, error = %message, "extraction failed");
            store.record_failure(id, &fingerprint, &message)?;
            Ok(FileOutcome::Failed(message))
        }
    }
}

fn record_image(
    store: &FileStore,
    entry: &ScanEntry,
    id: i64,
    thumbnail_max_bytes: usize,
    summary: &mut PassSummary,
) -> Result<FileOutcome, StoreError> {
    let fingerprint = content_fingerprint(entry);
    store.mark_image_processed(id, &fingerprint)?;

    // An image next to `<name>.g` becomes that geometry's thumbnail
    let stem = match entry.rel_path.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => entry.rel_path.as_str(),
    };
    if let Some(geometry_id) = store.find_geometry_by_stem(stem)? {
        if fingerprint.size as usize <= thumbnail_max_bytes {
            match std::fs::read(&entry.abs_path) {
                Ok(bytes) => store.set_thumbnail(geometry_id, Some(&bytes))?,
                Err(err) => {
                    let warning = format!("{}: {}", entry.rel_path, err);
                    tracing::warn!(path = %entry.rel_path, error = %err, "unable to read thumbnail");
                    summary.warnings.push(warning);
                }
            }
        }
    }

    Ok(FileOutcome::ImageRecorded)
}

/// Stat plus hash; falls back to the scan's stat if the file can't be read
fn content_fingerprint(entry: &ScanEntry) -> Fingerprint {
    if entry.fingerprint.hash.is_some() {
        return entry.fingerprint.clone();
    }
    Fingerprint::compute(&entry.abs_path).unwrap_or_else(|_| entry.fingerprint.clone())
}

fn existing_id(entry: &ScanEntry) -> Result<i64, StoreError> {
    entry
        .record_id
        .ok_or_else(|| StoreError::NotFound(entry.rel_path.clone()))
}
