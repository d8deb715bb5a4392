//! Last observed content of every tracked file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

/// State kept for one tracked file.
#[derive(Debug, Clone)]
pub struct FileState {
    /// Content as last observed.
    pub content: String,

    /// Modification time of the file when it was read.
    pub modified: Option<DateTime<Utc>>,

    /// When a record was last emitted for this path.
    pub last_emitted: Option<Instant>,
}

/// Per-path content snapshots used as the "previous" side of a diff.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    files: HashMap<PathBuf, FileState>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last stored content, or an empty string for a path never seen.
    pub fn get_previous(&self, path: &Path) -> &str {
        self.files
            .get(path)
            .map(|state| state.content.as_str())
            .unwrap_or_default()
    }

    /// Store the content observed for `path`, keeping its emission time.
    pub fn put(&mut self, path: &Path, content: String, modified: Option<DateTime<Utc>>) {
        let state = self.files.entry(path.to_path_buf()).or_insert(FileState {
            content: String::new(),
            modified: None,
            last_emitted: None,
        });
        state.content = content;
        state.modified = modified;
    }

    /// Record that a change record for `path` was emitted at `at`.
    pub fn mark_emitted(&mut self, path: &Path, at: Instant) {
        if let Some(state) = self.files.get_mut(path) {
            state.last_emitted = Some(at);
        }
    }

    pub fn last_emitted(&self, path: &Path) -> Option<Instant> {
        self.files.get(path).and_then(|state| state.last_emitted)
    }

    pub fn get(&self, path: &Path) -> Option<&FileState> {
        self.files.get(path)
    }

    /// Drop all state for `path` and, when it was a directory, for every
    /// file below it. Returns how many entries were dropped.
    pub fn evict(&mut self, path: &Path) -> usize {
        let before = self.files.len();
        self.files.retain(|tracked, _| !tracked.starts_with(path));
        let removed = before - self.files.len();
        if removed > 0 {
            debug!(path = %path.display(), removed, "Evicted snapshots");
        }
        removed
    }

    /// Evict every path not in `present`. Returns how many were dropped.
    pub fn retain_present(&mut self, present: &HashSet<PathBuf>) -> usize {
        let before = self.files.len();
        self.files.retain(|path, _| present.contains(path));
        let removed = before - self.files.len();
        if removed > 0 {
            debug!(removed, "Pruned snapshots no longer under root");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Outcome of reading a tracked file as text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// File content and modification time.
    Text {
        content: String,
        modified: Option<DateTime<Utc>>,
    },
    /// File could not be read as text this cycle.
    Skip,
}

/// Read `path` as UTF-8 text.
///
/// Read failures and invalid encodings are logged and reported as
/// [`ReadOutcome::Skip`] so the caller leaves its state untouched.
pub fn read_text(path: &Path) -> ReadOutcome {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), "Failed to read file: {e}");
            return ReadOutcome::Skip;
        }
    };

    let content = match String::from_utf8(bytes) {
        Ok(content) => content,
        Err(_) => {
            debug!(path = %path.display(), "Skipping file that is not valid UTF-8");
            return ReadOutcome::Skip;
        }
    };

    let modified = path
        .metadata()
        .ok()
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Utc>::from);

    ReadOutcome::Text { content, modified }
}
