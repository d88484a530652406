//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs,
    config::ConfigCommands,
    include::{ExcludeArgs, IncludeArgs},
    index::IndexArgs,
    init::InitArgs,
    list::ListArgs,
    report::ReportArgs,
    reset::ResetArgs,
    search::SearchArgs,
    select::{DeselectArgs, SelectArgs},
    set::SetArgs,
    show::ShowArgs,
    status::StatusArgs,
    tag::TagCommands,
};

#[derive(Parser)]
#[command(name = "cadventory")]
#[command(author, version, about = "Incremental indexer for BRL-CAD model libraries")]
#[command(long_about = "Keeps a metadata store of the geometry and image files under a library \
directory, re-reading only the files that changed since the last pass.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Library root (default: auto-detect by finding .cadventory/)
    #[arg(long, global = true, env = "CADVENTORY_LIBRARY")]
    pub library: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new library
    Init(InitArgs),

    /// Scan the library and process new or changed files
    Index(IndexArgs),

    /// Show aggregate counts for the library
    Status(StatusArgs),

    /// List indexed files
    List(ListArgs),

    /// Show everything known about one file
    Show(ShowArgs),

    /// Search titles, tags, names, paths and object names
    Search(SearchArgs),

    /// Manage tags
    #[command(subcommand)]
    Tag(TagCommands),

    /// Include a file or directory in the library listing
    Include(IncludeArgs),

    /// Exclude a file or directory from the library listing
    Exclude(ExcludeArgs),

    /// Add files to the report selection
    Select(SelectArgs),

    /// Remove files from the report selection
    Deselect(DeselectArgs),

    /// Edit a file's name, author or primary object
    Set(SetArgs),

    /// Build a report manifest for the selected files
    Report(ReportArgs),

    /// Drop every record and start over
    Reset(ResetArgs),

    /// Show configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable tables and summaries
    #[default]
    Auto,
    /// Tab-aligned columns (for piping)
    Tsv,
    /// JSON format (for programming)
    Json,
    /// CSV format (for spreadsheets)
    Csv,
    /// Markdown tables
    Md,
    /// Just relative paths, one per line
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_opts_after_subcommand() {
        let cli = Cli::try_parse_from(["cadventory", "list", "-f", "json", "--library", "/tmp/lib"])
            .unwrap();
        assert_eq!(cli.global.format, OutputFormat::Json);
        assert_eq!(cli.global.library, Some(PathBuf::from("/tmp/lib")));
        assert!(matches!(cli.command, Commands::List(_)));
    }
}
