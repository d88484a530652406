//! `cadventory config` command - Inspect configuration

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::commands::utils::open_library;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::Config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective (merged) configuration
    Show,

    /// Show paths to configuration files
    Path,
}

pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    // Config is readable outside a library; only the library layer is skipped
    let library = open_library(global).ok();

    match cmd {
        ConfigCommands::Show => {
            let config = Config::load(library.as_ref());
            if global.format == OutputFormat::Json {
                let json = serde_json::to_string_pretty(&config).into_diagnostic()?;
                println!("{}", json);
                return Ok(());
            }

            let yaml = serde_yml::to_string(&config).into_diagnostic()?;
            print!("{}", yaml);
            if !global.quiet {
                println!();
                println!("{}", style("Config Sources (in priority order):").dim());
                println!("  1. Environment variables (CADVENTORY_EXTRACTOR, CADVENTORY_TAGGER)");
                println!("  2. Library config (.cadventory/config.yaml)");
                println!("  3. Global config (~/.config/cadventory/config.yaml)");
            }
        }
        ConfigCommands::Path => {
            if let Some(path) = Config::global_config_path() {
                println!("{:<8} {}", style("global").bold(), path.display());
            }
            if let Some(library) = &library {
                println!("{:<8} {}", style("library").bold(), library.config_path().display());
            }
        }
    }
    Ok(())
}
