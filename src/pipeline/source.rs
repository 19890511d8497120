//! Source file resolution for pipeline stages.
//!
//! A [`SourceSpec`] pairs ordered include globs with exclude globs. Patterns
//! are relative to a root directory supplied at resolution time, so the same
//! spec can run against the source root in development and the dev root in
//! production.

use glob::{glob, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Error during source resolution. Unreadable directory entries are
/// warned about and skipped, not surfaced here.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Invalid glob pattern
    #[error("Invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

/// A file matched by a [`SourceSpec`], with its path relative to the
/// resolution root preserved for destination mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    /// Path relative to the resolution root
    pub relative: PathBuf,
}

/// Include/exclude glob patterns describing a set of source files.
#[derive(Debug, Clone, Default)]
pub struct SourceSpec {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl SourceSpec {
    /// Create a spec from include patterns.
    pub fn new(include: Vec<String>) -> Self {
        Self { include, exclude: Vec::new() }
    }

    /// Add exclude patterns. Exclusions are evaluated after inclusions:
    /// a file matching any exclusion is dropped regardless of includes.
    pub fn with_excludes(mut self, exclude: Vec<String>) -> Self {
        self.exclude.extend(exclude);
        self
    }

    /// Resolve the spec against a root directory.
    ///
    /// Files matched by more than one include pattern appear once. The
    /// returned list is sorted by path.
    pub fn resolve(&self, root: &Path) -> Result<Vec<SourceFile>, SourceError> {
        let excludes = self.compiled_excludes()?;
        let mut matched = BTreeSet::new();

        for pattern in &self.include {
            let full_pattern = root.join(pattern);
            let entries = glob(&full_pattern.to_string_lossy()).map_err(|e| {
                SourceError::InvalidPattern { pattern: pattern.clone(), source: e }
            })?;

            for entry in entries {
                match entry {
                    Ok(path) => {
                        if path.is_file() {
                            matched.insert(path);
                        }
                    }
                    Err(e) => {
                        // Unreadable entries are skipped, not fatal
                        eprintln!("Warning: error reading path: {}", e);
                    }
                }
            }
        }

        let files = matched
            .into_iter()
            .filter_map(|path| {
                let relative =
                    path.strip_prefix(root).unwrap_or(path.as_path()).to_path_buf();
                if excludes.iter().any(|ex| ex.matches_path(&relative)) {
                    None
                } else {
                    Some(SourceFile { path, relative })
                }
            })
            .collect();

        Ok(files)
    }

    /// Check whether a root-relative path would be selected by this spec.
    ///
    /// Used by the watch controller to route change events to stages
    /// without touching the filesystem.
    pub fn matches(&self, relative: &Path) -> Result<bool, SourceError> {
        for pattern in &self.include {
            let compiled = Pattern::new(pattern).map_err(|e| SourceError::InvalidPattern {
                pattern: pattern.clone(),
                source: e,
            })?;
            if compiled.matches_path(relative) {
                let excludes = self.compiled_excludes()?;
                return Ok(!excludes.iter().any(|ex| ex.matches_path(relative)));
            }
        }
        Ok(false)
    }

    fn compiled_excludes(&self) -> Result<Vec<Pattern>, SourceError> {
        self.exclude
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| SourceError::InvalidPattern {
                    pattern: p.clone(),
                    source: e,
                })
            })
            .collect()
    }
}
