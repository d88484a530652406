//! `cadventory init` command - Initialize a new library

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::store::FileStore;
use crate::core::{Library, LibraryError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Re-create missing metadata files even if .cadventory/ already exists
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
        if !global.quiet {
            println!(
                "{} Created directory {}",
                style("✓").green(),
                style(path.display()).cyan()
            );
        }
    }

    let library = if args.force {
        Library::init_force(&path)
    } else {
        Library::init(&path)
    };

    match library {
        Ok(library) => {
            // Opening the store creates the schema
            FileStore::open_library(&library).map_err(|e| miette::miette!("{}", e))?;
            if !global.quiet {
                println!(
                    "{} Initialized CADventory library at {}",
                    style("✓").green(),
                    style(library.root().display()).cyan()
                );
                println!();
                println!("Next steps:");
                println!(
                    "  {} Index geometry and image files",
                    style("cadventory index").yellow()
                );
                println!(
                    "  {} List what was found",
                    style("cadventory list").yellow()
                );
            }
            Ok(())
        }
        Err(LibraryError::AlreadyExists(path)) => {
            println!(
                "{} CADventory library already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!(
                "Use {} to reinitialize",
                style("cadventory init --force").yellow()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
