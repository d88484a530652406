//! `cadventory report` command - Manifest of the selected models

use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::cli::commands::utils::Workspace;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::ReportManifest;

#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Write the report to a file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// Emit JSON instead of Markdown
    #[arg(long)]
    pub json: bool,

    /// Label printed at the top of the report
    #[arg(long)]
    pub label: Option<String>,
}

pub fn run(args: ReportArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let manifest = ReportManifest::from_selection(&ws.store, args.label)
        .map_err(|e| miette::miette!("{}", e))?;

    if manifest.is_empty() && !global.quiet {
        eprintln!(
            "{} No files selected. Use {} to add some.",
            style("!").yellow(),
            style("cadventory select <PATH>").yellow()
        );
    }

    let content = if args.json || global.format == OutputFormat::Json {
        let mut json = serde_json::to_string_pretty(&manifest).into_diagnostic()?;
        json.push('\n');
        json
    } else {
        manifest.to_markdown()
    };
    write_output(&content, args.output)
}

fn write_output(content: &str, output_path: Option<PathBuf>) -> Result<()> {
    if let Some(path) = output_path {
        let file = File::create(&path).into_diagnostic()?;
        let mut writer = BufWriter::new(file);
        writer.write_all(content.as_bytes()).into_diagnostic()?;
        writer.flush().into_diagnostic()?;
        println!("{} Report written to {}", style("✓").green(), style(path.display()).cyan());
    } else {
        print!("{}", content);
    }
    Ok(())
}
