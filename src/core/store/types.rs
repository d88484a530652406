//! Store type definitions
//!
//! Records, fingerprints and query filters shared by the scanner, the
//! reconciliation engine and the CLI.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

// =========================================================================
// Classification enums
// =========================================================================

/// Kind of indexed file, decided by extension at scan time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Geometry,
    Image,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Geometry => "geometry",
            FileKind::Image => "image",
        }
    }

    /// Classify a path by extension (case-insensitive); None for unrecognized files
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "g" => Some(FileKind::Geometry),
            "png" | "jpg" | "gif" => Some(FileKind::Image),
            _ => None,
        }
    }
}

impl FromStr for FileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "geometry" => Ok(FileKind::Geometry),
            "image" => Ok(FileKind::Image),
            other => Err(format!("unknown file kind '{}'", other)),
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the file was seen on disk by the most recent pass
///
/// Kept separate from the user-controlled `included` flag so that a file
/// vanishing from disk never overwrites the user's exclusion choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Present,
    Missing,
}

impl FileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileStatus::Present => "present",
            FileStatus::Missing => "missing",
        }
    }
}

impl FromStr for FileStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(FileStatus::Present),
            "missing" => Ok(FileStatus::Missing),
            other => Err(format!("unknown file status '{}'", other)),
        }
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// Fingerprints
// =========================================================================

/// Cheap change signal: size and mtime, plus a content hash once computed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fingerprint {
    pub size: u64,
    /// Modification time in nanoseconds since the Unix epoch
    pub mtime_ns: i64,
    pub hash: Option<String>,
}

impl Fingerprint {
    /// Stat a file without reading its contents
    pub fn stat(path: &Path) -> std::io::Result<Self> {
        let metadata = fs::metadata(path)?;
        let mtime_ns = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0);
        Ok(Self {
            size: metadata.len(),
            mtime_ns,
            hash: None,
        })
    }

    /// Stat and hash a file
    pub fn compute(path: &Path) -> std::io::Result<Self> {
        let mut fp = Self::stat(path)?;
        fp.hash = Some(hash_file(path)?);
        Ok(fp)
    }

    /// Size and mtime agree (hash not consulted)
    pub fn same_stat(&self, other: &Fingerprint) -> bool {
        self.size == other.size && self.mtime_ns == other.mtime_ns
    }
}

/// Streaming SHA256 of a file's contents, hex encoded
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

// =========================================================================
// Records
// =========================================================================

/// One indexed file
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub rel_path: String,
    pub kind: FileKind,
    pub status: FileStatus,
    pub included: bool,
    pub processed: bool,
    pub selected: bool,
    pub fingerprint: Option<Fingerprint>,
    pub title: String,
    pub short_name: String,
    pub author: Option<String>,
    pub object_names: Vec<String>,
    pub primary_object: Option<String>,
    pub tags: Vec<String>,
    pub has_thumbnail: bool,
    pub discovered_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl FileRecord {
    /// Visible to consumers: included by the user, on disk, and extracted
    pub fn is_presented(&self) -> bool {
        self.included && self.processed && self.status == FileStatus::Present
    }

    /// Object used by reports: the chosen primary, else the first object
    pub fn report_object(&self) -> Option<&str> {
        self.primary_object
            .as_deref()
            .or_else(|| self.object_names.first().map(String::as_str))
    }

    /// Human-readable processing state
    pub fn state_label(&self) -> &'static str {
        if self.status == FileStatus::Missing {
            "missing"
        } else if !self.included {
            "excluded"
        } else if self.processed {
            "processed"
        } else if self.last_error.is_some() {
            "failed"
        } else {
            "pending"
        }
    }
}

/// Minimal per-record view used to classify a scan
#[derive(Debug, Clone)]
pub struct SnapshotEntry {
    pub id: i64,
    pub kind: FileKind,
    pub status: FileStatus,
    pub included: bool,
    pub processed: bool,
    pub fingerprint: Option<Fingerprint>,
    pub has_error: bool,
}

// =========================================================================
// Queries
// =========================================================================

/// Filter for `FileStore::list`; `None` fields do not constrain
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub kind: Option<FileKind>,
    pub status: Option<FileStatus>,
    pub included: Option<bool>,
    pub processed: Option<bool>,
    pub selected: Option<bool>,
}

impl RecordFilter {
    /// Records a consumer would show (included, present, processed)
    pub fn presented() -> Self {
        Self {
            status: Some(FileStatus::Present),
            included: Some(true),
            processed: Some(true),
            ..Default::default()
        }
    }
}

/// Field a text search applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SearchField {
    Title,
    Tags,
    Name,
    Path,
    Object,
    #[default]
    Any,
}

/// Cached aggregate counts over the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryCounts {
    pub total: usize,
    pub geometry: usize,
    pub images: usize,
    pub included: usize,
    pub excluded: usize,
    pub missing: usize,
    pub processed: usize,
    pub pending: usize,
    pub failed: usize,
    pub selected: usize,
    pub tagged: usize,
}
