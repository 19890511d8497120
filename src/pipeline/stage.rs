//! Pipeline stages.
//!
//! A stage binds a source root, a [`SourceSpec`], a [`Transform`], and a
//! destination directory. Stages are immutable once registered; running one
//! produces a [`RunResult`]. Per-file transform failures are collected and
//! reported without aborting the stage; failure to write an output is fatal
//! for the stage only.

use crate::pipeline::cache::ChangeCache;
use crate::pipeline::result::{ErrorKind, RunResult};
use crate::pipeline::source::{SourceError, SourceFile, SourceSpec};
use crate::pipeline::transform::Transform;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// A named unit of work: select files, transform them, write the outputs.
pub struct Stage {
    name: String,
    source_root: PathBuf,
    base: PathBuf,
    spec: SourceSpec,
    triggers: Option<SourceSpec>,
    transform: Box<dyn Transform>,
    destination: PathBuf,
    cache_eligible: bool,
}

enum FileOutcome {
    Done { source: PathBuf, failed_write: Option<String> },
    TransformFailed { source: PathBuf, message: String },
}

impl Stage {
    /// Create a stage. `destination` is the directory outputs are written
    /// under; it is created on first run.
    pub fn new(
        name: impl Into<String>,
        source_root: impl Into<PathBuf>,
        spec: SourceSpec,
        transform: Box<dyn Transform>,
        destination: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            source_root: source_root.into(),
            base: PathBuf::new(),
            spec,
            triggers: None,
            transform,
            destination: destination.into(),
            cache_eligible: false,
        }
    }

    /// Strip a leading directory from matched paths before destination
    /// mapping, so `img/gallery/a.jpg` with base `img` lands at
    /// `<dest>/gallery/a.jpg`.
    pub fn with_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.base = base.into();
        self
    }

    /// Opt the stage into change-cache skipping.
    pub fn with_cache(mut self) -> Self {
        self.cache_eligible = true;
        self
    }

    /// Extra patterns whose changes rerun the stage even though the files
    /// they match are not stage inputs (template partials).
    pub fn with_triggers(mut self, triggers: SourceSpec) -> Self {
        self.triggers = Some(triggers);
        self
    }

    /// Stage name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination directory.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Transform name, for logs and dry-run output.
    pub fn transform_name(&self) -> &str {
        self.transform.name()
    }

    /// Whether a change to a root-relative path should rerun this stage:
    /// either the spec selects it or a trigger pattern matches it.
    pub fn rebuilds_on(&self, relative: &Path) -> bool {
        self.spec.matches(relative).unwrap_or(false)
            || self
                .triggers
                .as_ref()
                .is_some_and(|t| t.matches(relative).unwrap_or(false))
    }

    /// Resolve the stage's sources without running the transform.
    ///
    /// Relative paths are already base-stripped, matching where outputs
    /// would land under the destination.
    pub fn resolve(&self) -> Result<Vec<SourceFile>, SourceError> {
        let files = self.spec.resolve(&self.source_root)?;
        Ok(files
            .into_iter()
            .map(|f| {
                let relative =
                    f.relative.strip_prefix(&self.base).unwrap_or(&f.relative).to_path_buf();
                SourceFile { path: f.path, relative }
            })
            .collect())
    }

    /// Run the stage.
    ///
    /// Files skipped by the cache are counted in `files_skipped`. A write
    /// failure marks the result fatal; transform failures only degrade it.
    pub fn run(&self, cache: &ChangeCache) -> RunResult {
        let start = Instant::now();
        let mut result = RunResult::new(&self.name);

        let files = match self.resolve() {
            Ok(files) => files,
            Err(e) => {
                let mut result = RunResult::fatal(&self.name, e.to_string());
                result.duration = start.elapsed();
                return result;
            }
        };

        if files.is_empty() {
            eprintln!("Warning: stage '{}' matched 0 files", self.name);
            result.duration = start.elapsed();
            return result;
        }

        if let Err(e) = std::fs::create_dir_all(&self.destination) {
            let mut result = RunResult::fatal(
                &self.name,
                format!("cannot create destination {}: {}", self.destination.display(), e),
            );
            result.duration = start.elapsed();
            return result;
        }

        let (to_process, skipped): (Vec<_>, Vec<_>) = if self.cache_eligible {
            files.into_iter().partition(|f| !cache.is_unchanged(&f.path))
        } else {
            (files, Vec::new())
        };
        result.files_skipped = skipped.len();

        let outcomes: Vec<FileOutcome> =
            to_process.par_iter().map(|file| self.process_file(file)).collect();

        for outcome in outcomes {
            match outcome {
                FileOutcome::Done { source, failed_write: None } => {
                    result.files_processed += 1;
                    if self.cache_eligible {
                        cache.record_processed(&source);
                    }
                }
                FileOutcome::Done { source, failed_write: Some(message) } => {
                    result.add_error(source, ErrorKind::Write, message.clone());
                    if result.fatal.is_none() {
                        result.fatal = Some(message);
                    }
                }
                FileOutcome::TransformFailed { source, message } => {
                    result.add_error(source, ErrorKind::Transform, message);
                }
            }
        }

        result.duration = start.elapsed();
        result
    }

    fn process_file(&self, file: &SourceFile) -> FileOutcome {
        let outputs = match self.transform.apply(file) {
            Ok(outputs) => outputs,
            Err(e) => {
                return FileOutcome::TransformFailed {
                    source: file.path.clone(),
                    message: e.to_string(),
                }
            }
        };

        for output in &outputs {
            let dest = self.destination.join(&output.relative);
            if let Err(e) = write_output(&dest, &output.contents) {
                return FileOutcome::Done {
                    source: file.path.clone(),
                    failed_write: Some(format!("cannot write {}: {}", dest.display(), e)),
                };
            }
        }

        FileOutcome::Done { source: file.path.clone(), failed_write: None }
    }
}

fn write_output(dest: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, contents)
}
