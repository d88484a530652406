//! `cadventory status` command - Library dashboard

use console::style;
use miette::Result;

use crate::cli::commands::utils::{print_json, Workspace};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::store::LibraryCounts;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {}

pub fn run(_args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let counts = ws.store.refresh().map_err(|e| miette::miette!("{}", e))?;
    let excluded_dirs = ws.store.excluded_dirs().map_err(|e| miette::miette!("{}", e))?;

    match global.format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "library": ws.library.root(),
            "counts": counts,
            "excluded_dirs": excluded_dirs,
        })),
        OutputFormat::Tsv | OutputFormat::Csv => {
            let sep = if global.format == OutputFormat::Csv { ',' } else { '\t' };
            for (key, value) in count_rows(&counts) {
                println!("{}{}{}", key, sep, value);
            }
            Ok(())
        }
        _ => {
            let width = 44;
            println!("{}", style("CADventory Library Status").bold().underlined());
            println!("{}", style(ws.library.root().display()).cyan());
            println!("{}", "═".repeat(width));
            for (key, value) in count_rows(&counts) {
                let label = key.replace('_', " ");
                let shown = match key {
                    "failed" | "missing" if value > 0 => style(value).red().to_string(),
                    "pending" if value > 0 => style(value).yellow().to_string(),
                    _ => value.to_string(),
                };
                println!("  {:<16}{:>8}", label, shown);
            }
            if !excluded_dirs.is_empty() {
                println!();
                println!("{}", style("Excluded directories:").dim());
                for dir in &excluded_dirs {
                    println!("  {}", dir);
                }
            }
            Ok(())
        }
    }
}

fn count_rows(counts: &LibraryCounts) -> [(&'static str, usize); 11] {
    [
        ("total", counts.total),
        ("geometry", counts.geometry),
        ("images", counts.images),
        ("processed", counts.processed),
        ("pending", counts.pending),
        ("failed", counts.failed),
        ("missing", counts.missing),
        ("included", counts.included),
        ("excluded", counts.excluded),
        ("selected", counts.selected),
        ("tagged", counts.tagged),
    ]
}
