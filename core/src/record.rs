//! Change records and their wire representation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::diff::DiffLine;
use crate::error::Result;

/// Why a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Part of the snapshot sent to a newly connected subscriber.
    Initial,
    /// A change observed after startup.
    Update,
}

/// One file's observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// Path relative to the watched root, `/`-separated.
    pub filename: String,

    /// Extension without the dot, if any.
    pub extension: Option<String>,

    pub previous_content: String,
    pub current_content: String,
    pub diff: Vec<DiffLine>,

    /// Language tag shown to subscribers.
    pub language: String,

    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

impl ChangeRecord {
    /// Build an update record for a file under `root`.
    pub fn update(
        root: &Path,
        path: &Path,
        previous_content: String,
        current_content: String,
        diff: Vec<DiffLine>,
    ) -> Self {
        Self::build(
            root,
            path,
            previous_content,
            current_content,
            diff,
            Action::Update,
        )
    }

    /// Build an initial-snapshot record: no previous content, no diff.
    pub fn initial(root: &Path, path: &Path, content: String) -> Self {
        Self::build(
            root,
            path,
            String::new(),
            content,
            Vec::new(),
            Action::Initial,
        )
    }

    fn build(
        root: &Path,
        path: &Path,
        previous_content: String,
        current_content: String,
        diff: Vec<DiffLine>,
        action: Action,
    ) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        Self {
            filename: relative_name(root, path),
            language: language_hint(extension.as_deref()),
            extension,
            path: path.to_path_buf(),
            previous_content,
            current_content,
            diff,
            action,
            timestamp: Utc::now(),
        }
    }

    /// Wire form of this record.
    pub fn to_message(&self) -> WireMessage<'_> {
        WireMessage {
            kind: "text",
            filename: &self.filename,
            content: &self.current_content,
            previous_content: &self.previous_content,
            diff: &self.diff,
            language: &self.language,
            action: self.action,
            timestamp: self.timestamp,
        }
    }

    /// Serialize the wire form to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_message())?)
    }
}

/// JSON message sent to subscribers.
#[derive(Debug, Serialize)]
pub struct WireMessage<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub filename: &'a str,
    pub content: &'a str,
    pub previous_content: &'a str,
    pub diff: &'a [DiffLine],
    pub language: &'a str,
    pub action: Action,
    pub timestamp: DateTime<Utc>,
}

/// Root-relative, `/`-separated name for `path`. Falls back to the full
/// path for files outside the root.
pub fn relative_name(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

/// Language tag for an extension: the extension itself, or `txt`.
pub fn language_hint(extension: Option<&str>) -> String {
    match extension {
        Some(ext) if !ext.is_empty() => ext.to_string(),
        _ => "txt".to_string(),
    }
}
