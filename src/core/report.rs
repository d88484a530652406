//! Report manifest for selected models
//!
//! Describes what a report renderer would produce for each selected record:
//! which file, which object to draw, and the image name it would write.
//! Rendering itself happens elsewhere.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

use crate::core::store::{FileRecord, FileStore, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub sequence: usize,
    pub rel_path: String,
    pub short_name: String,
    pub title: String,
    pub primary_object: Option<String>,
    pub author: Option<String>,
    pub tags: Vec<String>,
    /// Output image a renderer writes for this entry
    pub image_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportManifest {
    pub label: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
}

impl ReportManifest {
    /// Build from the store's current selection
    pub fn from_selection(store: &FileStore, label: Option<String>) -> Result<Self, StoreError> {
        Ok(Self::from_records(&store.selected_records()?, label))
    }

    /// Images are numbered from 0 in record order
    pub fn from_records(records: &[FileRecord], label: Option<String>) -> Self {
        let entries = records
            .iter()
            .enumerate()
            .map(|(i, record)| ReportEntry {
                sequence: i,
                rel_path: record.rel_path.clone(),
                short_name: record.short_name.clone(),
                title: record.title.clone(),
                primary_object: record.report_object().map(String::from),
                author: record.author.clone(),
                tags: record.tags.clone(),
                image_name: format!("{}.png", i),
            })
            .collect();

        Self {
            label,
            generated_at: Utc::now(),
            entries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::new();
        output.push_str("# Model Report\n\n");
        if let Some(label) = &self.label {
            output.push_str(&format!("**Label:** {}\n\n", label));
        }
        output.push_str(&format!(
            "**Generated:** {}\n\n",
            self.generated_at.format("%Y-%m-%d %H:%M UTC")
        ));

        if self.entries.is_empty() {
            output.push_str("_No models selected._\n");
            return output;
        }

        let mut builder = Builder::default();
        builder.push_record(["#", "Image", "File", "Title", "Object", "Tags"]);
        for entry in &self.entries {
            builder.push_record([
                entry.sequence.to_string(),
                entry.image_name.clone(),
                entry.rel_path.clone(),
                entry.title.clone(),
                entry.primary_object.clone().unwrap_or_else(|| "-".to_string()),
                entry.tags.join(", "),
            ]);
        }
        output.push_str(&builder.build().with(Style::markdown()).to_string());
        output.push_str(&format!("\n\n**Models:** {}\n", self.entries.len()));
        output
    }
}
