//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::core::Library;

/// CADventory configuration with layered hierarchy
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub extractor: ExtractorConfig,
    pub tagger: TaggerConfig,
    pub index: IndexConfig,
}

/// External geometry parser settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Program used to read titles and object trees (BRL-CAD `mged`)
    pub program: String,
    /// Upper bound for a single extractor invocation
    pub timeout_secs: u64,
    /// Object search depths 1..=max_depth are queried
    pub max_depth: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            program: "mged".to_string(),
            timeout_secs: 30,
            max_depth: 9,
        }
    }
}

impl ExtractorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// External tag generator settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TaggerConfig {
    /// Program invoked as `<program> <args...> <file>`; None disables tagging
    pub program: Option<String>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl TaggerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Indexing pass settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    /// Re-extract unchanged files whose previous extraction failed
    pub retry_failed: bool,
    /// Skip dot-directories while walking the library
    pub skip_hidden: bool,
    /// Images larger than this are not copied into geometry thumbnails
    pub thumbnail_max_bytes: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            retry_failed: false,
            skip_hidden: true,
            thumbnail_max_bytes: 4 * 1024 * 1024,
        }
    }
}

/// Partial config as read from a single YAML layer
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    extractor: Option<ExtractorLayer>,
    tagger: Option<TaggerLayer>,
    index: Option<IndexLayer>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExtractorLayer {
    program: Option<String>,
    timeout_secs: Option<u64>,
    max_depth: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TaggerLayer {
    program: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IndexLayer {
    retry_failed: Option<bool>,
    skip_hidden: Option<bool>,
    thumbnail_max_bytes: Option<usize>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load(library: Option<&Library>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/cadventory/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            config.merge_file(&global_path);
        }

        // 3. Library config (.cadventory/config.yaml)
        if let Some(library) = library {
            config.merge_file(&library.config_path());
        }

        // 4. Environment variables
        if let Ok(program) = std::env::var("CADVENTORY_EXTRACTOR") {
            if !program.is_empty() {
                config.extractor.program = program;
            }
        }
        if let Ok(program) = std::env::var("CADVENTORY_TAGGER") {
            if !program.is_empty() {
                config.tagger.program = Some(program);
            }
        }

        config
    }

    /// Parse a single YAML document as a layer on top of the defaults
    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        let layer: ConfigLayer = serde_yml::from_str(contents)?;
        let mut config = Config::default();
        config.merge(layer);
        Ok(config)
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "cadventory")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn merge_file(&mut self, path: &std::path::Path) {
        if !path.exists() {
            return;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yml::from_str::<ConfigLayer>(&contents) {
                Ok(layer) => self.merge(layer),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ignoring malformed config file")
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unable to read config file")
            }
        }
    }

    /// Merge another layer into this one (other takes precedence)
    fn merge(&mut self, other: ConfigLayer) {
        if let Some(extractor) = other.extractor {
            if let Some(program) = extractor.program {
                self.extractor.program = program;
            }
            if let Some(timeout) = extractor.timeout_secs {
                self.extractor.timeout_secs = timeout;
            }
            if let Some(depth) = extractor.max_depth {
                self.extractor.max_depth = depth;
            }
        }
        if let Some(tagger) = other.tagger {
            if let Some(program) = tagger.program {
                self.tagger.program = if program.is_empty() { None } else { Some(program) };
            }
            if let Some(args) = tagger.args {
                self.tagger.args = args;
            }
            if let Some(timeout) = tagger.timeout_secs {
                self.tagger.timeout_secs = timeout;
            }
        }
        if let Some(index) = other.index {
            if let Some(retry) = index.retry_failed {
                self.index.retry_failed = retry;
            }
            if let Some(skip) = index.skip_hidden {
                self.index.skip_hidden = skip;
            }
            if let Some(max) = index.thumbnail_max_bytes {
                self.index.thumbnail_max_bytes = max;
            }
        }
    }
}
