//! `cadventory reset` command - Drop every record

use console::style;
use dialoguer::Confirm;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct ResetArgs {
    /// Skip the confirmation prompt
    #[arg(long, short = 'y')]
    pub yes: bool,
}

pub fn run(args: ResetArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let counts = ws.store.refresh().map_err(|e| miette::miette!("{}", e))?;

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Drop {} record(s) with their tags and selections?",
                counts.total
            ))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Reset cancelled");
            return Ok(());
        }
    }

    ws.store.reset().map_err(|e| miette::miette!("{}", e))?;
    tracing::info!(records = counts.total, "store reset");
    if !global.quiet {
        println!(
            "{} Dropped {} record(s). Run {} to rebuild.",
            style("✓").green(),
            counts.total,
            style("cadventory index").yellow()
        );
    }
    Ok(())
}
