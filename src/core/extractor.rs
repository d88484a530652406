//! Geometry metadata extraction
//!
//! The indexing pipeline only sees the [`MetadataExtractor`] capability;
//! [`MgedExtractor`] is the production implementation that shells out to
//! BRL-CAD's `mged`.

use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::config::ExtractorConfig;
use crate::core::process::{run_with_timeout, ProcessError};

/// Title and object tree read from one geometry file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedMetadata {
    pub title: String,
    /// Object paths in discovery order, without duplicates
    pub object_names: Vec<String>,
}

/// Per-file extraction failures; never fatal to a pass
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("file not found or unreadable: {0}")]
    NotFound(String),

    #[error("extraction failed: {message}")]
    Failed { message: String },

    #[error("extraction timed out after {secs}s")]
    TimedOut { secs: u64 },
}

/// Capability: path in, title and objects out
pub trait MetadataExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ExtractError>;
}

/// Runs `mged -c <file> title` and `mged -c <file> search / -depth N`
#[derive(Debug, Clone)]
pub struct MgedExtractor {
    program: String,
    timeout: Duration,
    max_depth: u32,
}

impl MgedExtractor {
    pub fn new(config: &ExtractorConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: config.timeout(),
            max_depth: config.max_depth.max(1),
        }
    }

    /// Run one mged command against the file, sharing the per-file time budget
    fn mged(&self, path: &Path, command: &[&str], deadline: Instant) -> Result<String, ExtractError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ExtractError::TimedOut {
                secs: self.timeout.as_secs(),
            });
        }

        let mut args: Vec<&OsStr> = vec![OsStr::new("-c"), path.as_os_str()];
        args.extend(command.iter().map(|s| OsStr::new(*s)));

        let output = run_with_timeout(&self.program, args, remaining, None).map_err(|e| match e {
            ProcessError::TimedOut { .. } => ExtractError::TimedOut {
                secs: self.timeout.as_secs(),
            },
            other => ExtractError::Failed {
                message: other.to_string(),
            },
        })?;

        if !output.success {
            let detail = output.stderr.trim();
            return Err(ExtractError::Failed {
                message: format!(
                    "'{} {}' exited with {}{}",
                    self.program,
                    command.join(" "),
                    output
                        .code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "signal".to_string()),
                    if detail.is_empty() {
                        String::new()
                    } else {
                        format!(": {}", detail)
                    }
                ),
            });
        }

        Ok(output.stdout)
    }
}

impl MetadataExtractor for MgedExtractor {
    fn extract(&self, path: &Path) -> Result<ExtractedMetadata, ExtractError> {
        if std::fs::File::open(path).is_err() {
            return Err(ExtractError::NotFound(path.display().to_string()));
        }

        let deadline = Instant::now() + self.timeout;
        let title = self.mged(path, &["title"], deadline)?.trim_end().to_string();

        let mut outputs = Vec::with_capacity(self.max_depth as usize);
        for depth in 1..=self.max_depth {
            let depth = depth.to_string();
            outputs.push(self.mged(path, &["search", "/", "-depth", &depth], deadline)?);
        }

        Ok(ExtractedMetadata {
            title,
            object_names: collect_object_names(outputs.iter().map(String::as_str)),
        })
    }
}

/// Merge line-oriented search output, trimming blanks and keeping first occurrences
pub fn collect_object_names<'a>(outputs: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for output in outputs {
        for line in output.lines() {
            let name = line.trim();
            if !name.is_empty() && seen.insert(name.to_string()) {
                names.push(name.to_string());
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_object_names_dedups_in_order() {
        let names = collect_object_names([
            "/truck\n/ground\n",
            "  /truck/cab.r \n\n/truck/wheel.s\n",
            "/truck/cab.r\n",
        ]);
        assert_eq!(
            names,
            vec!["/truck", "/ground", "/truck/cab.r", "/truck/wheel.s"]
        );
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let extractor = MgedExtractor::new(&ExtractorConfig::default());
        let err = extractor
            .extract(Path::new("/definitely/not/here.g"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotFound(_)));
    }

    #[test]
    fn test_missing_program_is_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.g");
        std::fs::write(&file, b"geometry").unwrap();

        let extractor = MgedExtractor::new(&ExtractorConfig {
            program: "cadventory-no-such-mged".into(),
            ..Default::default()
        });
        let err = extractor.extract(&file).unwrap_err();
        assert!(matches!(err, ExtractError::Failed { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_fake_mged_script() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let script = tmp.path().join("fake-mged");
        std::fs::write(
            &script,
            "#!/bin/sh\nif [ \"$3\" = title ]; then echo 'M35 Truck'; else echo \"/m35\"; echo \"/m35/depth$6\"; fi\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        let file = tmp.path().join("m35.g");
        std::fs::write(&file, b"geometry").unwrap();

        let extractor = MgedExtractor::new(&ExtractorConfig {
            program: script.display().to_string(),
            timeout_secs: 10,
            max_depth: 2,
        });
        let meta = extractor.extract(&file).unwrap();
        assert_eq!(meta.title, "M35 Truck");
        assert_eq!(meta.object_names, vec!["/m35", "/m35/depth1", "/m35/depth2"]);
    }
}
