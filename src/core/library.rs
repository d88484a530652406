//! Library discovery and structure

use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Name of the metadata directory inside a library root
pub const META_DIR: &str = ".cadventory";

/// Database file inside the metadata directory
const DB_FILE: &str = "metadata.db";

/// Represents a CADventory library
#[derive(Debug, Clone)]
pub struct Library {
    /// Root directory of the library (parent of .cadventory/)
    root: PathBuf,
}

impl Library {
    /// Find library root by walking up from the current directory
    pub fn discover() -> Result<Self, LibraryError> {
        let current =
            std::env::current_dir().map_err(|e| LibraryError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find library root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, LibraryError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| LibraryError::IoError(e.to_string()))?;

        loop {
            if current.join(META_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(LibraryError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Open a library whose root is known, without walking up
    pub fn open(root: &Path) -> Result<Self, LibraryError> {
        let root = root
            .canonicalize()
            .map_err(|e| LibraryError::IoError(e.to_string()))?;
        if !root.join(META_DIR).is_dir() {
            return Err(LibraryError::NotFound {
                searched_from: root,
            });
        }
        Ok(Self { root })
    }

    /// Create the library structure at the given path
    pub fn init(path: &Path) -> Result<Self, LibraryError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

        if root.join(META_DIR).exists() {
            return Err(LibraryError::AlreadyExists(root));
        }

        Self::create_meta_dir(&root)?;
        Ok(Self { root })
    }

    /// Force initialization even if .cadventory/ exists (keeps the database)
    pub fn init_force(path: &Path) -> Result<Self, LibraryError> {
        let root = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        Self::create_meta_dir(&root)?;
        Ok(Self { root })
    }

    fn create_meta_dir(root: &Path) -> Result<(), LibraryError> {
        let meta = root.join(META_DIR);
        std::fs::create_dir_all(&meta).map_err(|e| LibraryError::IoError(e.to_string()))?;

        let config_path = meta.join("config.yaml");
        if !config_path.exists() {
            std::fs::write(&config_path, Self::default_config())
                .map_err(|e| LibraryError::IoError(e.to_string()))?;
        }

        Ok(())
    }

    fn default_config() -> &'static str {
        r#"# CADventory library configuration

# External geometry parser (BRL-CAD mged)
# extractor:
#   program: mged
#   timeout_secs: 30
#   max_depth: 9

# External tag generator, invoked as `<program> <args...> <file>`
# tagger:
#   program: ""
#   args: []
#   timeout_secs: 120

# index:
#   retry_failed: false
#   skip_hidden: true
#   thumbnail_max_bytes: 4194304
"#
    }

    /// Get the library root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .cadventory metadata directory
    pub fn meta_dir(&self) -> PathBuf {
        self.root.join(META_DIR)
    }

    /// Path of the metadata database
    pub fn db_path(&self) -> PathBuf {
        self.meta_dir().join(DB_FILE)
    }

    /// Path of the library-local config file
    pub fn config_path(&self) -> PathBuf {
        self.meta_dir().join("config.yaml")
    }

    /// Resolve a relative record path against the library root
    pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
        absolute_path(&self.root, rel_path)
    }

    /// Turn a user-supplied path (absolute, or relative to the current
    /// directory) into the '/'-separated key used by the store.
    pub fn relative_path(&self, path: &Path) -> Result<String, LibraryError> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| LibraryError::IoError(e.to_string()))?
                .join(path)
        };
        let normalized = normalize(&absolute);
        // Canonicalize when possible so symlinked roots (e.g. /tmp on macOS) match
        let candidate = normalized.canonicalize().unwrap_or(normalized);

        match candidate.strip_prefix(&self.root) {
            Ok(rel) => Ok(relative_key(rel)),
            Err(_) => Err(LibraryError::OutsideLibrary(path.to_path_buf())),
        }
    }
}

/// Join a '/'-separated relative key onto a root
pub fn absolute_path(root: &Path, rel_path: &str) -> PathBuf {
    rel_path
        .split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Convert a root-relative path into the store key ('/' separators on all platforms)
pub fn relative_key(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Errors that can occur during library operations
#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("not a CADventory library (searched from {searched_from:?}). Run 'cadventory init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("CADventory library already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("path {0:?} is outside the library")]
    OutsideLibrary(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}
