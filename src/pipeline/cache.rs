//! In-memory change detection for cache-eligible stages.
//!
//! Fingerprints are file size plus modification time, held for the lifetime
//! of the process. There is no on-disk persistence: a fresh process starts
//! with an empty cache and reprocesses everything once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;

/// Size + mtime fingerprint of a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: u64,
    modified: Option<SystemTime>,
}

impl Fingerprint {
    fn of(path: &Path) -> std::io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        Ok(Self { len: meta.len(), modified: meta.modified().ok() })
    }
}

/// Process-lifetime change cache keyed by source path.
///
/// Interior mutability lets stages running on worker threads share one
/// cache behind `&self`.
#[derive(Debug, Default)]
pub struct ChangeCache {
    entries: Mutex<HashMap<PathBuf, Fingerprint>>,
}

impl ChangeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether a file's current fingerprint matches the recorded one.
    ///
    /// Unknown files, and files whose metadata cannot be read, count as
    /// changed so they are never silently skipped.
    pub fn is_unchanged(&self, path: &Path) -> bool {
        let current = match Fingerprint::of(path) {
            Ok(fp) => fp,
            Err(_) => return false,
        };

        match self.entries.lock() {
            Ok(entries) => entries.get(path) == Some(&current),
            Err(_) => false,
        }
    }

    /// Record a file's current fingerprint after successful processing.
    pub fn record_processed(&self, path: &Path) {
        if let Ok(fp) = Fingerprint::of(path) {
            if let Ok(mut entries) = self.entries.lock() {
                entries.insert(path.to_path_buf(), fp);
            }
        }
    }

    /// Number of recorded files.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    /// Check if the cache has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
