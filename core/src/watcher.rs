//! Filesystem notification source backed by `notify`.

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{Result, StreamError};
use crate::event::{RawEvent, RawEventKind};

/// Capacity of the channel between the notify thread and the pipeline.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Watches a root recursively and forwards file notifications.
///
/// Notifications are produced on notify's own thread and handed to the
/// pipeline through a bounded channel. Dropping the watcher stops it.
pub struct FsWatcher {
    root: PathBuf,
    watcher: RecommendedWatcher,
}

impl FsWatcher {
    /// Start watching `root`. Returns the watcher and the receiving end of
    /// its notification channel.
    pub fn start(root: &Path) -> Result<(Self, mpsc::Receiver<RawEvent>)> {
        if !root.exists() {
            return Err(StreamError::RootNotFound(root.display().to_string()));
        }
        if !root.is_dir() {
            return Err(StreamError::NotADirectory(root.display().to_string()));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    for raw in RawEvent::from_notify(event) {
                        // Directory deletions still evict what was below them.
                        if raw.is_directory && raw.kind != RawEventKind::Deleted {
                            continue;
                        }
                        if let Err(e) = event_tx.blocking_send(raw) {
                            error!("Failed to send file event: {e}");
                        }
                    }
                }
                Err(e) => {
                    error!("Watch error: {e}");
                }
            },
        )?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        info!(root = %root.display(), "Started watching");

        Ok((
            Self {
                root: root.to_path_buf(),
                watcher,
            },
            event_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Stop watching.
    pub fn stop(mut self) {
        if let Err(e) = self.watcher.unwatch(&self.root) {
            debug!("Failed to unwatch {}: {e}", self.root.display());
        }
        info!(root = %self.root.display(), "Stopped watching");
    }
}
