//! `cadventory search` command - Text search over presented files

use miette::Result;

use crate::cli::commands::list::output_records;
use crate::cli::commands::utils::Workspace;
use crate::cli::table::DEFAULT_RECORD_COLUMNS;
use crate::cli::GlobalOpts;
use crate::core::store::SearchField;

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Case-insensitive substring to look for
    pub query: String,

    /// Field to search
    #[arg(long, value_enum, default_value_t = SearchField::Any)]
    pub field: SearchField,

    /// Wrap long titles and tags at this width
    #[arg(long, short = 'w')]
    pub wrap: Option<usize>,
}

pub fn run(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let records = ws
        .store
        .search(&args.query, args.field)
        .map_err(|e| miette::miette!("{}", e))?;
    output_records(&records, global, args.wrap, DEFAULT_RECORD_COLUMNS)
}
