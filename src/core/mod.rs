//! Core module - indexing pipeline, record store and collaborators

pub mod cancel;
pub mod config;
pub mod coordinator;
pub mod extractor;
pub mod library;
pub mod process;
pub mod reconcile;
pub mod report;
pub mod scanner;
pub mod store;
pub mod tagging;

pub use cancel::CancelFlag;
pub use config::Config;
pub use coordinator::{Coordinator, CoordinatorState, IndexEvent, PassOutcome, StartOutcome};
pub use extractor::{ExtractError, ExtractedMetadata, MetadataExtractor, MgedExtractor};
pub use library::{Library, LibraryError};
pub use reconcile::{FileOutcome, FileReport, PassContext, PassError, PassOptions, PassSummary, Progress};
pub use report::ReportManifest;
pub use scanner::{Classification, ScanError, ScanOptions};
pub use store::{FileKind, FileRecord, FileStatus, FileStore, RecordFilter, SearchField, StoreError};
pub use tagging::{Tagger, TaggingJob};
