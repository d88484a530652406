//! `cadventory show` command - Everything known about one file

use chrono::Local;
use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::utils::{print_json, Workspace};
use crate::cli::helpers::format_size;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::store::FileRecord;

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// File path (library-relative, or relative to the current directory)
    pub path: PathBuf,

    /// Write the stored thumbnail to this file
    #[arg(long)]
    pub thumbnail: Option<PathBuf>,
}

pub fn run(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let record = ws.record(&args.path)?;

    if let Some(out) = &args.thumbnail {
        let data = ws
            .store
            .thumbnail(record.id)
            .map_err(|e| miette::miette!("{}", e))?
            .ok_or_else(|| miette::miette!("'{}' has no thumbnail", record.rel_path))?;
        std::fs::write(out, &data).map_err(|e| miette::miette!("{}: {}", out.display(), e))?;
        if !global.quiet {
            eprintln!(
                "{} Wrote {} thumbnail to {}",
                style("✓").green(),
                format_size(data.len() as u64),
                style(out.display()).cyan()
            );
        }
    }

    match global.format {
        OutputFormat::Json => print_json(&record),
        OutputFormat::Path => {
            println!("{}", record.rel_path);
            Ok(())
        }
        _ => {
            print_record(&record);
            Ok(())
        }
    }
}

fn print_record(record: &FileRecord) {
    let field = |label: &str, value: &str| {
        println!("{:<12} {}", style(label).bold(), value);
    };

    println!("{}", style(&record.rel_path).cyan().bold());
    field("Kind", record.kind.as_str());
    field("State", record.state_label());
    field("Name", &record.short_name);
    if !record.title.is_empty() {
        field("Title", &record.title);
    }
    if let Some(author) = &record.author {
        field("Author", author);
    }
    if let Some(fp) = &record.fingerprint {
        field("Size", &format_size(fp.size));
        if let Some(hash) = &fp.hash {
            field("SHA-256", hash);
        }
    }
    field(
        "Discovered",
        &record.discovered_at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
    );
    if let Some(at) = record.processed_at {
        field(
            "Processed",
            &at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
        );
    }
    field("Selected", if record.selected { "yes" } else { "no" });
    field("Thumbnail", if record.has_thumbnail { "yes" } else { "no" });
    if !record.tags.is_empty() {
        field("Tags", &record.tags.join(", "));
    }
    if let Some(err) = &record.last_error {
        println!("{:<12} {}", style("Error").bold().red(), err);
    }

    if !record.object_names.is_empty() {
        println!();
        println!("{} ({})", style("Objects").bold(), record.object_names.len());
        let primary = record.report_object();
        for name in &record.object_names {
            if Some(name.as_str()) == primary {
                println!("  {} {}", style("*").green(), style(name).green());
            } else {
                println!("    {}", name);
            }
        }
    }
}
