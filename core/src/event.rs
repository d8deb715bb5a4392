//! Raw notifications from the filesystem notification source.

use std::path::PathBuf;

use notify::event::{ModifyKind, RemoveKind, RenameMode};
use serde::{Deserialize, Serialize};

/// A raw filesystem notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Path to the affected file or directory.
    pub path: PathBuf,

    /// The kind of event.
    pub kind: RawEventKind,

    /// Whether the path is a directory.
    pub is_directory: bool,
}

impl RawEvent {
    /// Create a notification for a file.
    pub fn file(kind: RawEventKind, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory: false,
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::file(RawEventKind::Created, path)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::file(RawEventKind::Modified, path)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::file(RawEventKind::Deleted, path)
    }

    /// Translate a notify event into raw notifications.
    ///
    /// Renames become a deletion of the old path and a creation of the new
    /// one. Access and other events that cannot change content are dropped.
    pub fn from_notify(event: notify::Event) -> Vec<Self> {
        use notify::EventKind;

        let dir_hint = matches!(event.kind, EventKind::Remove(RemoveKind::Folder));

        let make = |kind: RawEventKind, path: PathBuf| {
            let is_directory = dir_hint || path.is_dir();
            Self {
                path,
                kind,
                is_directory,
            }
        };

        match event.kind {
            EventKind::Create(_) => event
                .paths
                .into_iter()
                .map(|p| make(RawEventKind::Created, p))
                .collect(),
            EventKind::Remove(_) => event
                .paths
                .into_iter()
                .map(|p| make(RawEventKind::Deleted, p))
                .collect(),
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => event
                    .paths
                    .into_iter()
                    .map(|p| make(RawEventKind::Deleted, p))
                    .collect(),
                RenameMode::To => event
                    .paths
                    .into_iter()
                    .map(|p| make(RawEventKind::Created, p))
                    .collect(),
                RenameMode::Both => {
                    let mut paths = event.paths.into_iter();
                    let mut out = Vec::with_capacity(2);
                    if let Some(from) = paths.next() {
                        out.push(make(RawEventKind::Deleted, from));
                    }
                    if let Some(to) = paths.next() {
                        out.push(make(RawEventKind::Created, to));
                    }
                    out
                }
                // Platforms that cannot tell which side of the rename a path
                // is on: decide by whether it still exists.
                _ => event
                    .paths
                    .into_iter()
                    .map(|p| {
                        if p.exists() {
                            make(RawEventKind::Created, p)
                        } else {
                            make(RawEventKind::Deleted, p)
                        }
                    })
                    .collect(),
            },
            EventKind::Modify(_) => event
                .paths
                .into_iter()
                .map(|p| make(RawEventKind::Modified, p))
                .collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }
}

/// Kind of raw notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RawEventKind {
    /// File was created.
    Created,

    /// File content changed.
    Modified,

    /// File was deleted.
    Deleted,
}
