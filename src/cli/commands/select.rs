//! `cadventory select` / `cadventory deselect` - Report selection

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::utils::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct SelectArgs {
    /// Files to add to the selection
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct DeselectArgs {
    /// Files to remove from the selection
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub paths: Vec<PathBuf>,

    /// Clear the whole selection
    #[arg(long)]
    pub all: bool,
}

pub fn run_select(args: SelectArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    for path in &args.paths {
        let record = ws.record(path)?;
        if !record.is_presented() {
            return Err(miette::miette!(
                "'{}' is {} and cannot be selected",
                record.rel_path,
                record.state_label()
            ));
        }
        ws.store
            .set_selected(record.id, true)
            .map_err(|e| miette::miette!("{}", e))?;
        if !global.quiet {
            println!("{} Selected {}", style("✓").green(), style(&record.rel_path).cyan());
        }
    }
    ws.store.refresh().map_err(|e| miette::miette!("{}", e))?;
    Ok(())
}

pub fn run_deselect(args: DeselectArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    if args.all {
        let cleared = ws.store.clear_selection().map_err(|e| miette::miette!("{}", e))?;
        if !global.quiet {
            println!("{} Cleared {} selected file(s)", style("✓").green(), cleared);
        }
    } else {
        for path in &args.paths {
            let record = ws.record(path)?;
            ws.store
                .set_selected(record.id, false)
                .map_err(|e| miette::miette!("{}", e))?;
            if !global.quiet {
                println!(
                    "{} Deselected {}",
                    style("✓").green(),
                    style(&record.rel_path).cyan()
                );
            }
        }
    }
    ws.store.refresh().map_err(|e| miette::miette!("{}", e))?;
    Ok(())
}
