//! `cadventory index` command - Run one coordinated indexing pass

use console::style;
use miette::Result;
use std::sync::Arc;

use crate::cli::commands::utils::{print_json, Workspace};
use crate::cli::helpers::format_duration_ms;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::reconcile::ScanCounts;
use crate::core::{
    Coordinator, FileOutcome, FileReport, IndexEvent, MetadataExtractor, MgedExtractor,
    PassContext, PassOptions, PassOutcome, PassSummary, ScanOptions,
};

#[derive(clap::Args, Debug)]
pub struct IndexArgs {
    /// Drop every record before indexing
    #[arg(long)]
    pub reset: bool,

    /// Re-extract unchanged files whose last extraction failed
    #[arg(long)]
    pub retry_failed: bool,

    /// Print a progress line every N files (0 disables progress)
    #[arg(long, default_value_t = 1)]
    pub every: usize,
}

pub fn run(args: IndexArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let index = &ws.config.index;

    let extractor: Arc<dyn MetadataExtractor> = Arc::new(MgedExtractor::new(&ws.config.extractor));
    let coordinator = Coordinator::new(PassContext {
        root: ws.library.root().to_path_buf(),
        store: Arc::clone(&ws.store),
        extractor,
        options: PassOptions {
            scan: ScanOptions {
                skip_hidden: index.skip_hidden,
                retry_failed: index.retry_failed || args.retry_failed,
            },
            thumbnail_max_bytes: index.thumbnail_max_bytes,
        },
    });

    // Subscribe first so no event of the pass is lost
    let events = coordinator.subscribe();
    let started = if args.reset {
        coordinator.reset_and_restart()
    } else {
        coordinator.start()
    };
    started.map_err(|e| miette::miette!("{}", e))?;

    let show_progress = !global.quiet && global.format != OutputFormat::Json;
    let mut sampler = ProgressSampler::new(args.every);
    let mut outcome = None;

    for event in events.iter() {
        match event {
            IndexEvent::PassStarted { .. } => {}
            IndexEvent::ScanFinished { counts, .. } => {
                if show_progress {
                    eprintln!("{}", format_scan_counts(&counts));
                }
            }
            IndexEvent::FileReconciled { report, .. } => {
                if show_progress && sampler.should_show(&report) {
                    eprintln!("{}", format_progress_line(&report));
                }
            }
            IndexEvent::PassCompleted { outcome: done, .. } => {
                outcome = Some(done);
                break;
            }
        }
    }
    coordinator.wait_idle();

    match outcome {
        Some(PassOutcome::Finished(summary)) => {
            if global.format == OutputFormat::Json {
                print_json(&summary)?;
            } else if !global.quiet {
                print_summary(&summary);
            }
            Ok(())
        }
        Some(PassOutcome::Failed(err)) => Err(miette::miette!("Indexing failed: {}", err)),
        None => Err(miette::miette!("Indexing worker exited without completing the pass")),
    }
}

/// Decides which per-file events are worth a progress line
///
/// Every `every`-th event is shown, plus the last one of the pass so the
/// display always ends at 100%.
pub struct ProgressSampler {
    every: usize,
    seen: usize,
}

impl ProgressSampler {
    pub fn new(every: usize) -> Self {
        Self { every, seen: 0 }
    }

    pub fn should_show(&mut self, report: &FileReport) -> bool {
        if self.every == 0 {
            return false;
        }
        self.seen += 1;
        let last = report.progress.completed >= report.progress.total;
        last || self.seen % self.every == 0
    }
}

fn format_scan_counts(counts: &ScanCounts) -> String {
    format!(
        "{} {} new, {} changed, {} unchanged, {} missing",
        style("Scanned:").bold(),
        counts.new,
        counts.changed,
        counts.unchanged,
        counts.missing
    )
}

fn format_progress_line(report: &FileReport) -> String {
    let outcome = match &report.outcome {
        FileOutcome::Extracted => style("extracted".to_string()).green(),
        FileOutcome::ImageRecorded => style("image".to_string()).magenta(),
        FileOutcome::Unchanged => style("unchanged".to_string()).dim(),
        FileOutcome::Skipped => style("excluded".to_string()).dim(),
        FileOutcome::MarkedMissing => style("missing".to_string()).yellow(),
        FileOutcome::Failed(msg) => style(format!("failed: {}", msg)).red(),
    };
    format!(
        "[{:>3}%] {}/{} {} {}",
        report.progress.percent(),
        report.progress.completed,
        report.progress.total,
        style(&report.rel_path).cyan(),
        outcome
    )
}

fn print_summary(summary: &PassSummary) {
    let headline = if summary.cancelled {
        style("Indexing cancelled").yellow().bold()
    } else {
        style("Indexing complete").green().bold()
    };
    println!("{} in {}", headline, format_duration_ms(summary.duration_ms));
    println!(
        "  Geometry: {} found, {} processed",
        summary.geometry_found, summary.geometry_processed
    );
    println!(
        "  Images:   {} found, {} processed",
        summary.images_found, summary.images_processed
    );
    println!(
        "  Changes:  {} new, {} changed, {} unchanged, {} missing, {} restored",
        summary.new, summary.changed, summary.unchanged, summary.missing, summary.restored
    );
    println!(
        "  Extractor: {} call(s), {} failure(s)",
        summary.extraction_calls,
        if summary.extraction_failures > 0 {
            style(summary.extraction_failures).red().to_string()
        } else {
            summary.extraction_failures.to_string()
        }
    );
    if summary.excluded_skipped > 0 {
        println!("  Excluded: {} skipped", summary.excluded_skipped);
    }
    for warning in &summary.warnings {
        println!("  {} {}", style("warning:").yellow(), warning);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{FileKind, Progress};

    fn report(completed: usize, total: usize) -> FileReport {
        FileReport {
            rel_path: format!("{}.g", completed),
            kind: FileKind::Geometry,
            outcome: FileOutcome::Extracted,
            progress: Progress {
                current: format!("{}.g", completed),
                completed,
                total,
            },
        }
    }

    #[test]
    fn test_sampler_every_third_plus_last() {
        let mut sampler = ProgressSampler::new(3);
        let shown: Vec<usize> = (1..=7)
            .filter(|i| sampler.should_show(&report(*i, 7)))
            .collect();
        assert_eq!(shown, vec![3, 6, 7]);
    }

    #[test]
    fn test_sampler_zero_is_silent() {
        let mut sampler = ProgressSampler::new(0);
        assert!(!sampler.should_show(&report(1, 1)));
    }

    #[test]
    fn test_progress_line_shows_percent() {
        let line = format_progress_line(&report(1, 4));
        assert!(line.contains("25%"));
        assert!(line.contains("1/4"));
        assert!(line.contains("1.g"));
    }
}
