//! Result types for stage and group runs.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Classification of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The transform rejected or failed on the file
    Transform,
    /// The output could not be written
    Write,
}

/// A single failed file within a stage run.
#[derive(Debug, Clone, Serialize)]
pub struct FileError {
    /// Source file that failed
    pub path: PathBuf,
    /// Failure classification
    pub kind: ErrorKind,
    /// Human-readable message
    pub message: String,
}

/// Outcome of running one stage.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Stage name
    pub stage: String,
    /// Files transformed and written
    pub files_processed: usize,
    /// Files skipped by the change cache
    pub files_skipped: usize,
    /// Per-file failures (non-fatal)
    pub errors: Vec<FileError>,
    /// Set when the stage aborted (e.g. destination unwritable)
    pub fatal: Option<String>,
    /// Wall-clock duration of the stage
    #[serde(skip)]
    pub duration: Duration,
}

impl RunResult {
    /// Create an empty result for a stage.
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            files_processed: 0,
            files_skipped: 0,
            errors: Vec::new(),
            fatal: None,
            duration: Duration::ZERO,
        }
    }

    /// Create a fatal result for a stage that could not run at all.
    pub fn fatal(stage: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::new(stage);
        result.fatal = Some(message.into());
        result
    }

    /// Record a per-file failure.
    pub fn add_error(&mut self, path: PathBuf, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(FileError { path, kind, message: message.into() });
    }

    /// True when the stage aborted before completing.
    pub fn is_fatal(&self) -> bool {
        self.fatal.is_some()
    }

    /// True when the stage completed but some files failed.
    pub fn is_degraded(&self) -> bool {
        !self.is_fatal() && !self.errors.is_empty()
    }

    /// True when every selected file was processed or skipped cleanly.
    pub fn is_clean(&self) -> bool {
        !self.is_fatal() && self.errors.is_empty()
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if let Some(msg) = &self.fatal {
            return format!("{}: FAILED ({})", self.stage, msg);
        }

        let mut line = format!(
            "{}: {} processed, {} skipped",
            self.stage, self.files_processed, self.files_skipped
        );
        if !self.errors.is_empty() {
            line.push_str(&format!(", {} failed", self.errors.len()));
        }
        line.push_str(&format!(" ({})", format_duration(self.duration)));
        line
    }
}

/// Aggregate over a group run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroupResult {
    /// Per-stage results in completion order
    pub stages: Vec<RunResult>,
    /// Wall-clock duration of the whole group
    #[serde(skip)]
    pub duration: Duration,
}

impl GroupResult {
    /// Create an empty group result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage result.
    pub fn add(&mut self, result: RunResult) {
        self.stages.push(result);
    }

    /// True when no stage aborted. Degraded stages still count as success.
    pub fn is_success(&self) -> bool {
        self.stages.iter().all(|s| !s.is_fatal())
    }

    /// Total files processed across stages.
    pub fn total_processed(&self) -> usize {
        self.stages.iter().map(|s| s.files_processed).sum()
    }

    /// Total files skipped across stages.
    pub fn total_skipped(&self) -> usize {
        self.stages.iter().map(|s| s.files_skipped).sum()
    }

    /// Total per-file failures across stages.
    pub fn total_errors(&self) -> usize {
        self.stages.iter().map(|s| s.errors.len()).sum()
    }

    /// Multi-line human summary.
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self.stages.iter().map(|s| s.summary()).collect();
        lines.push(format!(
            "total: {} processed, {} skipped, {} failed ({})",
            self.total_processed(),
            self.total_skipped(),
            self.total_errors(),
            format_duration(self.duration)
        ));
        lines.join("\n")
    }
}

/// Format a duration compactly: sub-second as milliseconds, otherwise seconds.
pub fn format_duration(d: Duration) -> String {
    if d.as_secs() == 0 {
        format!("{}ms", d.as_millis())
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
