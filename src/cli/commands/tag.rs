//! `cadventory tag` command - Manual and generated tags

use clap::Subcommand;
use console::style;
use miette::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::commands::utils::{print_json, Workspace};
use crate::cli::table::{CellValue, ColumnDef, TableConfig, TableFormatter, TableRow};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::store::FileKind;
use crate::core::tagging::{tagger_from_config, TagTarget};
use crate::core::TaggingJob;

#[derive(Subcommand, Debug)]
pub enum TagCommands {
    /// Add tags to a file
    Add {
        path: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove tags from a file
    Remove {
        path: PathBuf,
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Remove every tag from a file
    Clear { path: PathBuf },

    /// List a file's tags, or every tag in the library with its usage count
    List { path: Option<PathBuf> },

    /// Generate tags with the configured tagger
    Generate {
        /// Files to tag (default: every presented geometry file)
        paths: Vec<PathBuf>,

        /// Only files that have no tags yet
        #[arg(long)]
        untagged: bool,
    },
}

const TAG_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("tag", "TAG", 32),
    ColumnDef::new("files", "FILES", 7),
];

pub fn run(cmd: TagCommands, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    match cmd {
        TagCommands::Add { path, tags } => {
            let record = ws.record(&path)?;
            let mut added = 0;
            for tag in &tags {
                if ws.store.add_tag(record.id, tag).map_err(|e| miette::miette!("{}", e))? {
                    added += 1;
                }
            }
            report_change(global, "Added", added, &record.rel_path);
        }
        TagCommands::Remove { path, tags } => {
            let record = ws.record(&path)?;
            let mut removed = 0;
            for tag in &tags {
                if ws
                    .store
                    .remove_tag(record.id, tag)
                    .map_err(|e| miette::miette!("{}", e))?
                {
                    removed += 1;
                }
            }
            report_change(global, "Removed", removed, &record.rel_path);
        }
        TagCommands::Clear { path } => {
            let record = ws.record(&path)?;
            let removed = ws.store.clear_tags(record.id).map_err(|e| miette::miette!("{}", e))?;
            report_change(global, "Removed", removed, &record.rel_path);
        }
        TagCommands::List { path: Some(path) } => {
            let record = ws.record(&path)?;
            if global.format == OutputFormat::Json {
                print_json(&record.tags)?;
            } else {
                for tag in &record.tags {
                    println!("{}", tag);
                }
            }
        }
        TagCommands::List { path: None } => {
            let tags = ws.store.all_tags().map_err(|e| miette::miette!("{}", e))?;
            if global.format == OutputFormat::Json {
                let entries: Vec<_> = tags
                    .iter()
                    .map(|(tag, files)| serde_json::json!({ "tag": tag, "files": files }))
                    .collect();
                print_json(&entries)?;
            } else {
                let format = match global.format {
                    OutputFormat::Auto => OutputFormat::Tsv,
                    other => other,
                };
                let rows = tags.into_iter().map(|(tag, files)| {
                    TableRow::new(tag.clone())
                        .cell("tag", CellValue::Text(tag))
                        .cell("files", CellValue::Number(files as i64))
                });
                let config = if global.format == OutputFormat::Auto && !global.quiet {
                    TableConfig::default()
                } else {
                    TableConfig::for_pipe()
                };
                TableFormatter::new(TAG_COLUMNS, "tag")
                    .with_config(config)
                    .output(rows, format, &["tag", "files"]);
            }
        }
        TagCommands::Generate { paths, untagged } => {
            run_generate(&ws, paths, untagged, global)?;
        }
    }
    Ok(())
}

fn report_change(global: &GlobalOpts, verb: &str, count: usize, rel_path: &str) {
    if !global.quiet {
        println!(
            "{} {} {} tag(s) on {}",
            style("✓").green(),
            verb,
            count,
            style(rel_path).cyan()
        );
    }
}

fn run_generate(ws: &Workspace, paths: Vec<PathBuf>, untagged: bool, global: &GlobalOpts) -> Result<()> {
    let tagger = tagger_from_config(&ws.config.tagger);
    if !tagger.is_available() {
        return Err(miette::miette!(
            "No tagger configured. Set tagger.program in {} or CADVENTORY_TAGGER.",
            ws.library.config_path().display()
        ));
    }

    let records = if paths.is_empty() {
        ws.store.presented().map_err(|e| miette::miette!("{}", e))?
    } else {
        paths
            .iter()
            .map(|p| ws.record(p))
            .collect::<Result<Vec<_>>>()?
    };
    let targets: Vec<TagTarget> = records
        .into_iter()
        .filter(|r| r.kind == FileKind::Geometry)
        .filter(|r| !untagged || r.tags.is_empty())
        .map(|r| TagTarget {
            id: r.id,
            rel_path: r.rel_path,
        })
        .collect();

    let job = TaggingJob::spawn(
        Arc::clone(&ws.store),
        ws.library.root().to_path_buf(),
        tagger,
        targets,
    )
    .map_err(|e| miette::miette!("{}", e))?;

    for report in job.events().iter() {
        if global.quiet || global.format == OutputFormat::Json {
            continue;
        }
        let tags = if report.generated.is_empty() {
            style("no tags".to_string()).dim()
        } else {
            style(report.generated.join(", ")).white()
        };
        eprintln!(
            "[{:>3}%] {} {} (+{})",
            report.progress.percent(),
            style(&report.rel_path).cyan(),
            tags,
            report.added
        );
    }

    let summary = job.join().map_err(|e| miette::miette!("{}", e))?;
    if global.format == OutputFormat::Json {
        print_json(&summary)?;
    } else if !global.quiet {
        println!(
            "{} Tagged {} of {} file(s), {} new tag(s)",
            style("✓").green(),
            summary.tagged,
            summary.files,
            summary.tags_added
        );
    }
    Ok(())
}
