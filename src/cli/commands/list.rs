//! `cadventory list` command - List indexed files

use miette::Result;

use crate::cli::commands::utils::{print_json, Workspace};
use crate::cli::table::{
    TableConfig, TableFormatter, TableRow, DEFAULT_RECORD_COLUMNS, LONG_RECORD_COLUMNS,
    RECORD_COLUMNS,
};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::store::{FileKind, FileRecord, FileStatus, RecordFilter};

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Include every record, not just processed and included ones
    #[arg(long, short = 'a')]
    pub all: bool,

    /// Only this kind of file
    #[arg(long, short = 'k', value_enum)]
    pub kind: Option<FileKind>,

    /// Only files not yet processed (or whose extraction failed)
    #[arg(long, conflicts_with_all = ["missing", "excluded"])]
    pub pending: bool,

    /// Only files that disappeared from disk
    #[arg(long, conflicts_with = "excluded")]
    pub missing: bool,

    /// Only files excluded by the user
    #[arg(long)]
    pub excluded: bool,

    /// Only files selected for the report
    #[arg(long)]
    pub selected: bool,

    /// Wrap long titles and tags at this width
    #[arg(long, short = 'w')]
    pub wrap: Option<usize>,

    /// Also show selection and processing time
    #[arg(long, short = 'l')]
    pub long: bool,
}

impl ListArgs {
    fn filter(&self) -> RecordFilter {
        let mut filter = if self.all || self.pending || self.missing || self.excluded {
            RecordFilter::default()
        } else {
            RecordFilter::presented()
        };
        filter.kind = self.kind;
        if self.pending {
            filter.status = Some(FileStatus::Present);
            filter.included = Some(true);
            filter.processed = Some(false);
        }
        if self.missing {
            filter.status = Some(FileStatus::Missing);
        }
        if self.excluded {
            filter.included = Some(false);
        }
        if self.selected {
            filter.selected = Some(true);
        }
        filter
    }
}

pub fn run(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ws = Workspace::open(global)?;
    let records = ws
        .store
        .list(&args.filter())
        .map_err(|e| miette::miette!("{}", e))?;
    let columns = if args.long {
        LONG_RECORD_COLUMNS
    } else {
        DEFAULT_RECORD_COLUMNS
    };
    output_records(&records, global, args.wrap, columns)
}

/// Print records in the chosen format; shared with `search`
pub fn output_records(
    records: &[FileRecord],
    global: &GlobalOpts,
    wrap: Option<usize>,
    columns: &[&str],
) -> Result<()> {
    if global.format == OutputFormat::Json {
        return print_json(&records);
    }

    let config = if global.quiet || global.format != OutputFormat::Auto {
        TableConfig::for_pipe()
    } else {
        match wrap {
            Some(width) => TableConfig::with_wrap(width),
            None => TableConfig::default(),
        }
    };
    let format = match global.format {
        OutputFormat::Auto => OutputFormat::Tsv,
        other => other,
    };

    TableFormatter::new(RECORD_COLUMNS, "file")
        .with_config(config)
        .output(records.iter().map(TableRow::from_record), format, columns);
    Ok(())
}
