//! `cadventory include` / `cadventory exclude` - User inclusion flags
//!
//! A path naming an indexed file toggles that record. A directory stores (or
//! drops) an exclusion rule, so files found under it later follow the rule.

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::utils::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct IncludeArgs {
    /// File or directory to include
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct ExcludeArgs {
    /// File or directory to exclude
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

pub fn run_include(args: IncludeArgs, global: &GlobalOpts) -> Result<()> {
    apply(&args.paths, true, global)
}

pub fn run_exclude(args: ExcludeArgs, global: &GlobalOpts) -> Result<()> {
    apply(&args.paths, false, global)
}

fn apply(paths: &[PathBuf], include: bool, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let verb = if include { "Included" } else { "Excluded" };

    for path in paths {
        let rel = ws.resolve(path)?;
        let record = ws
            .store
            .get_by_path(&rel)
            .map_err(|e| miette::miette!("{}", e))?;

        if let Some(record) = record {
            ws.store
                .set_included(record.id, include)
                .map_err(|e| miette::miette!("{}", e))?;
            if !global.quiet {
                println!("{} {} {}", style("✓").green(), verb, style(&rel).cyan());
            }
            continue;
        }

        let is_dir = ws.library.absolute_path(&rel).is_dir();
        let has_rule = ws
            .store
            .excluded_dirs()
            .map_err(|e| miette::miette!("{}", e))?
            .contains(&rel);
        if !is_dir && !has_rule {
            return Err(miette::miette!("No indexed file or directory at '{}'", rel));
        }

        let affected = if include {
            ws.store.include_dir(&rel)
        } else {
            ws.store.exclude_dir(&rel)
        }
        .map_err(|e| miette::miette!("{}", e))?;
        if !global.quiet {
            println!(
                "{} {} directory {} ({} file(s))",
                style("✓").green(),
                verb,
                style(format!("{}/", rel)).cyan(),
                affected
            );
        }
    }

    ws.store.refresh().map_err(|e| miette::miette!("{}", e))?;
    Ok(())
}
