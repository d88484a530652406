//! Table formatting for record listings
//!
//! One formatter renders every listing command (`list`, `search`, `tag list`)
//! in the selected output format.
//!
//! # Text Wrapping
//!
//! - Use `TableConfig::with_wrap(width)` to enable word-wrapped multi-line rows
//! - CSV and path output stay single-line for pipability

use chrono::{DateTime, Local, Utc};
use console::style;

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;
use crate::core::store::{FileKind, FileRecord};

/// Configuration for table output
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Maximum width for text columns before wrapping (None = truncate instead)
    pub wrap_width: Option<usize>,
    /// Show summary line after table (e.g., "5 file(s) found")
    pub show_summary: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            wrap_width: None,
            show_summary: true,
        }
    }
}

impl TableConfig {
    pub fn with_wrap(width: usize) -> Self {
        Self {
            wrap_width: Some(width),
            show_summary: true,
        }
    }

    /// No wrapping, no summary
    pub fn for_pipe() -> Self {
        Self {
            wrap_width: None,
            show_summary: false,
        }
    }
}

/// Wrap text at word boundaries
fn wrap_text(text: &str, max_width: usize) -> Vec<String> {
    if text.chars().count() <= max_width || max_width < 5 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let current_len = current.chars().count();
        if !current.is_empty() && current_len + 1 + word_len <= max_width {
            current.push(' ');
            current.push_str(word);
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        // Words longer than a line are force-broken
        let chars: Vec<char> = word.chars().collect();
        let mut chunks = chars.chunks(max_width).peekable();
        while let Some(chunk) = chunks.next() {
            let piece: String = chunk.iter().collect();
            if chunks.peek().is_some() {
                lines.push(piece);
            } else {
                current = piece;
            }
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

/// A typed cell value with semantic meaning for formatting
#[derive(Debug, Clone)]
pub enum CellValue {
    /// Plain text, truncated to the column
    Text(String),
    /// Library-relative path (cyan)
    Path(String),
    Kind(FileKind),
    /// Record state label with color coding
    State(&'static str),
    Number(i64),
    /// Tags as comma-separated
    Tags(Vec<String>),
    /// Yes/no flag
    Flag(bool),
    Date(DateTime<Utc>),
    Empty,
}

impl CellValue {
    /// Format for TSV output (with colors if terminal)
    pub fn format_tsv(&self, width: usize) -> String {
        match self {
            CellValue::Text(s) => {
                format!("{:<width$}", truncate_str(s, width.saturating_sub(2)), width = width)
            }
            CellValue::Path(p) => {
                let shown = truncate_str(p, width.saturating_sub(2));
                format!("{:<width$}", style(shown).cyan(), width = width)
            }
            CellValue::Kind(kind) => {
                let styled = match kind {
                    FileKind::Geometry => style(kind.as_str()).white(),
                    FileKind::Image => style(kind.as_str()).magenta(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::State(state) => {
                let styled = match *state {
                    "processed" => style(*state).green(),
                    "pending" => style(*state).yellow(),
                    "failed" => style(*state).red().bold(),
                    "missing" => style(*state).red().dim(),
                    _ => style(*state).dim(),
                };
                format!("{:<width$}", styled, width = width)
            }
            CellValue::Number(n) => format!("{:>width$}", n, width = width),
            CellValue::Tags(tags) => {
                let joined = tags.join(", ");
                format!("{:<width$}", truncate_str(&joined, width.saturating_sub(2)), width = width)
            }
            CellValue::Flag(true) => format!("{:<width$}", style("yes").green(), width = width),
            CellValue::Flag(false) => format!("{:<width$}", style("-").dim(), width = width),
            CellValue::Date(dt) => {
                let local: DateTime<Local> = dt.with_timezone(&Local);
                format!("{:<width$}", local.format("%Y-%m-%d %H:%M"), width = width)
            }
            CellValue::Empty => format!("{:<width$}", "-", width = width),
        }
    }

    /// Format for Markdown output (no colors, escaped pipes)
    pub fn format_md(&self) -> String {
        let raw = match self {
            CellValue::Empty => "-".to_string(),
            CellValue::Flag(true) => "**yes**".to_string(),
            CellValue::Flag(false) => "-".to_string(),
            other => other.raw(),
        };
        raw.replace('|', "\\|")
    }

    /// Unstyled value, used for CSV and wrapping
    pub fn raw(&self) -> String {
        match self {
            CellValue::Text(s) | CellValue::Path(s) => s.clone(),
            CellValue::Kind(kind) => kind.as_str().to_string(),
            CellValue::State(state) => state.to_string(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Tags(tags) => tags.join(", "),
            CellValue::Flag(b) => (if *b { "yes" } else { "no" }).to_string(),
            CellValue::Date(dt) => {
                let local: DateTime<Local> = dt.with_timezone(&Local);
                local.format("%Y-%m-%dT%H:%M:%S").to_string()
            }
            CellValue::Empty => String::new(),
        }
    }

    /// Display width of the content, for dynamic column sizing
    pub fn display_width(&self) -> usize {
        match self {
            CellValue::Flag(_) => 3,
            CellValue::Date(_) => 16,
            CellValue::Empty => 1,
            other => other.raw().chars().count(),
        }
    }
}

/// Column definition with header label and maximum width
#[derive(Debug, Clone)]
pub struct ColumnDef {
    pub key: &'static str,
    pub header: &'static str,
    pub width: usize,
}

impl ColumnDef {
    pub const fn new(key: &'static str, header: &'static str, width: usize) -> Self {
        Self { key, header, width }
    }
}

/// Columns shared by every record listing
pub const RECORD_COLUMNS: &[ColumnDef] = &[
    ColumnDef::new("path", "PATH", 48),
    ColumnDef::new("kind", "KIND", 9),
    ColumnDef::new("state", "STATE", 10),
    ColumnDef::new("title", "TITLE", 40),
    ColumnDef::new("tags", "TAGS", 30),
    ColumnDef::new("selected", "SEL", 4),
    ColumnDef::new("processed", "PROCESSED", 17),
];

/// Default visible columns for record listings
pub const DEFAULT_RECORD_COLUMNS: &[&str] = &["path", "kind", "state", "title", "tags"];

/// Columns for `--long` listings
pub const LONG_RECORD_COLUMNS: &[&str] =
    &["path", "kind", "state", "title", "tags", "selected", "processed"];

/// A row of cell values keyed by the record's relative path
pub struct TableRow {
    pub key: String,
    pub cells: Vec<(&'static str, CellValue)>,
}

impl TableRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cells: Vec::new(),
        }
    }

    pub fn cell(mut self, key: &'static str, value: CellValue) -> Self {
        self.cells.push((key, value));
        self
    }

    pub fn get(&self, key: &str) -> Option<&CellValue> {
        self.cells.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Standard row for a file record
    pub fn from_record(record: &FileRecord) -> Self {
        let title = if record.title.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(record.title.clone())
        };
        Self::new(record.rel_path.clone())
            .cell("path", CellValue::Path(record.rel_path.clone()))
            .cell("kind", CellValue::Kind(record.kind))
            .cell("state", CellValue::State(record.state_label()))
            .cell("title", title)
            .cell("tags", CellValue::Tags(record.tags.clone()))
            .cell("selected", CellValue::Flag(record.selected))
            .cell(
                "processed",
                record.processed_at.map_or(CellValue::Empty, CellValue::Date),
            )
    }
}

/// Renders rows in the requested output format
pub struct TableFormatter<'a> {
    columns: &'a [ColumnDef],
    item_name: &'static str,
    config: TableConfig,
}

impl<'a> TableFormatter<'a> {
    pub fn new(columns: &'a [ColumnDef], item_name: &'static str) -> Self {
        Self {
            columns,
            item_name,
            config: TableConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.config = config;
        self
    }

    /// Print rows in the specified format
    pub fn output<I>(&self, rows: I, format: OutputFormat, visible_columns: &[&str])
    where
        I: IntoIterator<Item = TableRow>,
    {
        let rows: Vec<TableRow> = rows.into_iter().collect();
        print!("{}", self.render(&rows, format, visible_columns));
    }

    pub fn render(&self, rows: &[TableRow], format: OutputFormat, visible_columns: &[&str]) -> String {
        match format {
            OutputFormat::Csv => self.render_csv(rows, visible_columns),
            OutputFormat::Md => self.render_md(rows, visible_columns),
            OutputFormat::Path => rows.iter().map(|r| format!("{}\n", r.key)).collect(),
            _ => self.render_tsv(rows, visible_columns),
        }
    }

    fn visible(&self, visible_columns: &[&str]) -> Vec<&ColumnDef> {
        self.columns
            .iter()
            .filter(|c| visible_columns.contains(&c.key))
            .collect()
    }

    fn calculate_widths(&self, rows: &[TableRow], columns: &[&ColumnDef]) -> Vec<usize> {
        columns
            .iter()
            .map(|col| {
                let max_content = rows
                    .iter()
                    .filter_map(|r| r.get(col.key))
                    .map(|v| v.display_width())
                    .max()
                    .unwrap_or(0);
                // +2 leaves room for truncate_str's ellipsis buffer
                col.header
                    .len()
                    .max(max_content.saturating_add(2))
                    .min(col.width)
            })
            .collect()
    }

    fn render_tsv(&self, rows: &[TableRow], visible_columns: &[&str]) -> String {
        let columns = self.visible(visible_columns);
        let widths = self.calculate_widths(rows, &columns);
        let mut out = String::new();

        let header: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("{:<width$}", style(col.header).bold(), width = *w))
            .collect();
        out.push_str(&header.join(" "));
        out.push('\n');

        let total_width: usize = widths.iter().sum::<usize>() + widths.len().saturating_sub(1);
        out.push_str(&"-".repeat(total_width));
        out.push('\n');

        for row in rows {
            match self.config.wrap_width {
                Some(wrap) => self.render_tsv_row_wrapped(&mut out, row, &columns, &widths, wrap),
                None => {
                    let parts: Vec<String> = columns
                        .iter()
                        .zip(&widths)
                        .map(|(col, w)| match row.get(col.key) {
                            Some(value) => value.format_tsv(*w),
                            None => format!("{:<width$}", "-", width = *w),
                        })
                        .collect();
                    out.push_str(parts.join(" ").trim_end());
                    out.push('\n');
                }
            }
        }

        if self.config.show_summary {
            out.push('\n');
            out.push_str(&format!(
                "{} {}(s) found.\n",
                style(rows.len()).cyan(),
                self.item_name
            ));
        }
        out
    }

    fn render_tsv_row_wrapped(
        &self,
        out: &mut String,
        row: &TableRow,
        columns: &[&ColumnDef],
        widths: &[usize],
        wrap_width: usize,
    ) {
        let wrapped: Vec<Vec<String>> = columns
            .iter()
            .map(|col| match row.get(col.key) {
                Some(value @ (CellValue::Text(_) | CellValue::Tags(_))) => {
                    wrap_text(&value.raw(), wrap_width)
                }
                Some(value) => vec![value.raw()],
                None => vec!["-".to_string()],
            })
            .collect();

        let max_lines = wrapped.iter().map(Vec::len).max().unwrap_or(1);
        for line_idx in 0..max_lines {
            let parts: Vec<String> = wrapped
                .iter()
                .zip(widths)
                .map(|(lines, w)| {
                    let content = lines.get(line_idx).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", content, width = *w)
                })
                .collect();
            out.push_str(parts.join(" ").trim_end());
            out.push('\n');
        }
        if max_lines > 1 {
            out.push('\n');
        }
    }

    fn render_csv(&self, rows: &[TableRow], visible_columns: &[&str]) -> String {
        let columns = self.visible(visible_columns);
        let mut writer = csv::Writer::from_writer(Vec::new());

        let header: Vec<&str> = columns.iter().map(|c| c.key).collect();
        let mut records = vec![header.iter().map(|s| s.to_string()).collect::<Vec<_>>()];
        for row in rows {
            records.push(
                columns
                    .iter()
                    .map(|col| row.get(col.key).map(CellValue::raw).unwrap_or_default())
                    .collect(),
            );
        }
        for record in &records {
            if let Err(e) = writer.write_record(record) {
                tracing::warn!("failed to write CSV row: {}", e);
            }
        }

        writer
            .into_inner()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    }

    fn render_md(&self, rows: &[TableRow], visible_columns: &[&str]) -> String {
        let columns = self.visible(visible_columns);
        let mut out = String::new();

        let headers: Vec<&str> = columns.iter().map(|c| c.header).collect();
        out.push_str(&format!("| {} |\n", headers.join(" | ")));
        let separators: Vec<&str> = headers.iter().map(|_| "---").collect();
        out.push_str(&format!("|{}|\n", separators.join("|")));

        for row in rows {
            let values: Vec<String> = columns
                .iter()
                .map(|col| {
                    row.get(col.key)
                        .map(CellValue::format_md)
                        .unwrap_or_else(|| "-".to_string())
                })
                .collect();
            out.push_str(&format!("| {} |\n", values.join(" | ")));
        }
        out
    }
}
