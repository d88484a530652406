//! `cadventory set` command - Edit user-owned record properties

use console::style;
use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::utils::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
#[command(group = clap::ArgGroup::new("change").required(true).multiple(true))]
pub struct SetArgs {
    /// File to edit
    pub path: PathBuf,

    /// Display name
    #[arg(long, group = "change")]
    pub name: Option<String>,

    /// Author (empty string clears it)
    #[arg(long, group = "change")]
    pub author: Option<String>,

    /// Object reports should render (empty string clears it)
    #[arg(long, group = "change")]
    pub primary: Option<String>,
}

pub fn run(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let record = ws.record(&args.path)?;

    if let Some(name) = &args.name {
        ws.store
            .set_short_name(record.id, name)
            .map_err(|e| miette::miette!("{}", e))?;
    }
    if let Some(author) = &args.author {
        ws.store
            .set_author(record.id, Some(author))
            .map_err(|e| miette::miette!("{}", e))?;
    }
    if let Some(primary) = &args.primary {
        let primary = Some(primary.trim()).filter(|p| !p.is_empty());
        ws.store
            .set_primary_object(record.id, primary)
            .map_err(|e| miette::miette!("{}", e))?;
    }

    if !global.quiet {
        println!("{} Updated {}", style("✓").green(), style(&record.rel_path).cyan());
    }
    Ok(())
}
