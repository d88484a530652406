//! Tag generation
//!
//! The generator itself is an external black box behind [`Tagger`]: a file
//! path goes in, up to ten tags come out, and an empty list means the service
//! was unavailable or failed. [`TaggingJob`] runs a batch of files on a
//! background thread and merges the results into the store.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use serde::Serialize;
use thiserror::Error;

use crate::core::cancel::CancelFlag;
use crate::core::config::TaggerConfig;
use crate::core::library::absolute_path;
use crate::core::process::run_with_timeout;
use crate::core::reconcile::Progress;
use crate::core::store::{FileStore, StoreError};

/// Upper bound on tags accepted per file
pub const MAX_TAGS: usize = 10;

#[derive(Debug, Error)]
pub enum TagError {
    #[error("failed to spawn tagging worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("tagging worker panicked")]
    WorkerPanicked,
}

/// Capability: file path in, ordered tags out (empty on failure)
pub trait Tagger: Send + Sync {
    fn generate_tags(&self, path: &Path, cancel: &CancelFlag) -> Vec<String>;

    /// Whether calling `generate_tags` can produce anything at all
    fn is_available(&self) -> bool {
        true
    }
}

/// Runs `<program> <args...> <file>` and reads one tag per output line
#[derive(Debug, Clone)]
pub struct CommandTagger {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandTagger {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }
}

impl Tagger for CommandTagger {
    fn generate_tags(&self, path: &Path, cancel: &CancelFlag) -> Vec<String> {
        let mut args: Vec<&std::ffi::OsStr> = self.args.iter().map(|a| a.as_ref()).collect();
        args.push(path.as_os_str());

        match run_with_timeout(&self.program, args, self.timeout, Some(cancel)) {
            Ok(output) if output.success => parse_tags(&output.stdout),
            Ok(output) => {
                tracing::warn!(
                    program = %self.program,
                    code = ?output.code,
                    stderr = %output.stderr.trim(),
                    "tagger exited unsuccessfully"
                );
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(program = %self.program, error = %err, "tagger unavailable");
                Vec::new()
            }
        }
    }
}

/// Stand-in when no tagger is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableTagger;

impl Tagger for UnavailableTagger {
    fn generate_tags(&self, _path: &Path, _cancel: &CancelFlag) -> Vec<String> {
        Vec::new()
    }

    fn is_available(&self) -> bool {
        false
    }
}

/// Build the tagger described by the configuration
pub fn tagger_from_config(config: &TaggerConfig) -> Arc<dyn Tagger> {
    match &config.program {
        Some(program) => Arc::new(CommandTagger::new(
            program.clone(),
            config.args.clone(),
            config.timeout(),
        )),
        None => Arc::new(UnavailableTagger),
    }
}

/// First `MAX_TAGS` distinct non-empty lines, trimmed
pub fn parse_tags(output: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for line in output.lines() {
        let tag = line.trim();
        if tag.is_empty() || tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
            continue;
        }
        tags.push(tag.to_string());
        if tags.len() == MAX_TAGS {
            break;
        }
    }
    tags
}

/// A record queued for tagging
#[derive(Debug, Clone)]
pub struct TagTarget {
    pub id: i64,
    pub rel_path: String,
}

/// Per-file notification from a tagging job
#[derive(Debug, Clone, Serialize)]
pub struct TagReport {
    pub rel_path: String,
    pub generated: Vec<String>,
    /// How many of `generated` were new to the record
    pub added: usize,
    pub progress: Progress,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagSummary {
    pub files: usize,
    pub tagged: usize,
    pub tags_added: usize,
    /// Files for which the tagger returned nothing
    pub empty: usize,
    pub cancelled: bool,
}

/// Tag each target in order, merging results without duplicates
///
/// Cancellation is checked between files and passed to the tagger so an
/// in-flight call can be abandoned.
pub fn tag_records(
    store: &FileStore,
    root: &Path,
    tagger: &dyn Tagger,
    targets: &[TagTarget],
    cancel: &CancelFlag,
    on_file: &mut dyn FnMut(TagReport),
) -> Result<TagSummary, StoreError> {
    let mut summary = TagSummary::default();
    let total = targets.len();

    for (index, target) in targets.iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled = true;
            break;
        }

        let generated = tagger.generate_tags(&absolute_path(root, &target.rel_path), cancel);
        if cancel.is_cancelled() {
            // Results from an interrupted call are discarded
            summary.cancelled = true;
            break;
        }

        let added = if generated.is_empty() {
            summary.empty += 1;
            0
        } else {
            summary.tagged += 1;
            store.merge_tags(target.id, &generated)?
        };
        summary.files += 1;
        summary.tags_added += added;
        tracing::debug!(path = %target.rel_path, generated = generated.len(), added, "tagged");

        on_file(TagReport {
            rel_path: target.rel_path.clone(),
            generated,
            added,
            progress: Progress {
                current: target.rel_path.clone(),
                completed: index + 1,
                total,
            },
        });
    }

    store.refresh()?;
    Ok(summary)
}

/// Background tagging batch
pub struct TaggingJob {
    cancel: CancelFlag,
    events: Receiver<TagReport>,
    handle: JoinHandle<Result<TagSummary, StoreError>>,
}

impl TaggingJob {
    pub fn spawn(
        store: Arc<FileStore>,
        root: PathBuf,
        tagger: Arc<dyn Tagger>,
        targets: Vec<TagTarget>,
    ) -> Result<Self, TagError> {
        let cancel = CancelFlag::new();
        let (tx, rx): (Sender<TagReport>, Receiver<TagReport>) = unbounded();
        let worker_cancel = cancel.clone();

        let handle = thread::Builder::new()
            .name("cadventory-tagger".into())
            .spawn(move || {
                tag_records(
                    &store,
                    &root,
                    tagger.as_ref(),
                    &targets,
                    &worker_cancel,
                    &mut |report| {
                        let _ = tx.send(report);
                    },
                )
            })?;

        Ok(Self {
            cancel,
            events: rx,
            handle,
        })
    }

    /// Per-file reports; the channel closes when the job ends
    pub fn events(&self) -> &Receiver<TagReport> {
        &self.events
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the job and return its summary
    pub fn join(self) -> Result<TagSummary, TagError> {
        match self.handle.join() {
            Ok(result) => Ok(result?),
            Err(_) => Err(TagError::WorkerPanicked),
        }
    }
}
