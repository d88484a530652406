//! Shared utilities for CLI commands

use miette::{IntoDiagnostic, Result};
use std::path::Path;
use std::sync::Arc;

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::store::{FileRecord, FileStore};
use crate::core::{Config, Library};

/// An opened library with its merged configuration and store
pub struct Workspace {
    pub library: Library,
    pub config: Config,
    pub store: Arc<FileStore>,
}

impl Workspace {
    /// Open the library named by `--library`, or discover it from the cwd
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let library = open_library(global)?;
        let config = Config::load(Some(&library));
        let store = FileStore::open_library(&library).map_err(|e| miette::miette!("{}", e))?;
        Ok(Self {
            library,
            config,
            store: Arc::new(store),
        })
    }

    /// Resolve a user-supplied path (absolute, cwd-relative or library-relative)
    /// to the library-relative key used by the store
    pub fn resolve(&self, input: &Path) -> Result<String> {
        if input.is_absolute() {
            return self
                .library
                .relative_path(input)
                .map_err(|e| miette::miette!("{}", e));
        }

        // Inside the library, relative paths are taken from the cwd
        let cwd = std::env::current_dir().into_diagnostic()?;
        let cwd = cwd.canonicalize().unwrap_or(cwd);
        if cwd.starts_with(self.library.root()) {
            return self
                .library
                .relative_path(input)
                .map_err(|e| miette::miette!("{}", e));
        }

        let rel = input.to_string_lossy().replace('\\', "/");
        Ok(rel.trim_start_matches("./").trim_end_matches('/').to_string())
    }

    /// Look up a record by user-supplied path, failing if the store has none
    pub fn record(&self, input: &Path) -> Result<FileRecord> {
        let rel = self.resolve(input)?;
        self.store
            .get_by_path(&rel)
            .map_err(|e| miette::miette!("{}", e))?
            .ok_or_else(|| miette::miette!("No indexed file at '{}'. Run 'cadventory index' first.", rel))
    }
}

pub fn open_library(global: &GlobalOpts) -> Result<Library> {
    let library = match &global.library {
        Some(path) => Library::open(path),
        None => Library::discover(),
    };
    library.map_err(|e| miette::miette!("{}", e))
}

/// Print a value as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{}", json);
    Ok(())
}

/// True when the chosen format should get human-oriented output
pub fn is_human(format: OutputFormat) -> bool {
    matches!(format, OutputFormat::Auto | OutputFormat::Tsv)
}
