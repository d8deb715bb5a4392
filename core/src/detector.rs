//! Turns raw notifications into change records.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::config::StreamConfig;
use crate::diff;
use crate::event::{RawEvent, RawEventKind};
use crate::filter::IgnoreFilter;
use crate::record::ChangeRecord;
use crate::snapshot::{ReadOutcome, SnapshotStore, read_text};

/// What the detector did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// A change worth broadcasting.
    Record(Box<ChangeRecord>),
    /// Directory notification, discarded.
    Directory,
    /// The ignore file changed and the rules were reloaded.
    RulesReloaded,
    /// The path was deleted and its snapshot dropped.
    Evicted,
    /// The path is not tracked.
    Ignored,
    /// A record for the path was emitted within the debounce window.
    Debounced,
    /// The file could not be read as text this cycle.
    Unreadable,
    /// Content is identical to the last snapshot.
    Unchanged,
}

/// Per-path change detection with debounce and diffing.
pub struct ChangeDetector {
    root: PathBuf,
    filter: IgnoreFilter,
    snapshots: SnapshotStore,
    debounce: Duration,
}

impl ChangeDetector {
    /// Create a detector for the config's root, loading its ignore rules.
    pub fn new(config: &StreamConfig) -> Self {
        Self {
            root: config.root.clone(),
            filter: IgnoreFilter::load(config),
            snapshots: SnapshotStore::new(),
            debounce: config.debounce(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Handle a notification using the current time.
    pub fn handle(&mut self, event: &RawEvent) -> Detection {
        self.handle_at(event, Instant::now())
    }

    /// Handle a notification as if it arrived at `now`.
    pub fn handle_at(&mut self, event: &RawEvent, now: Instant) -> Detection {
        let path = event.path.as_path();

        if self.filter.is_ignore_file(path) {
            info!(path = %path.display(), "Ignore file changed, reloading rules");
            self.filter.reload();
            return Detection::RulesReloaded;
        }

        // A vanished directory takes every snapshot below it along.
        if event.kind == RawEventKind::Deleted {
            self.snapshots.evict(path);
            return Detection::Evicted;
        }

        if event.is_directory {
            return Detection::Directory;
        }

        if self.filter.is_ignored(path) {
            return Detection::Ignored;
        }

        if let Some(last) = self.snapshots.last_emitted(path) {
            if now.saturating_duration_since(last) < self.debounce {
                debug!(path = %path.display(), "Debounced change");
                return Detection::Debounced;
            }
        }

        let (content, modified) = match read_text(path) {
            ReadOutcome::Text { content, modified } => (content, modified),
            ReadOutcome::Skip => return Detection::Unreadable,
        };

        let previous = self.snapshots.get_previous(path);
        let lines = diff::diff(previous, &content);
        if lines.is_empty() {
            debug!(path = %path.display(), "Content unchanged");
            return Detection::Unchanged;
        }

        let record = ChangeRecord::update(
            &self.root,
            path,
            previous.to_string(),
            content.clone(),
            lines,
        );
        self.snapshots.put(path, content, modified);
        self.snapshots.mark_emitted(path, now);

        debug!(path = %path.display(), lines = record.diff.len(), "Detected change");
        Detection::Record(Box::new(record))
    }

    /// Drop snapshots for paths that are no longer tracked under the root.
    pub fn prune(&mut self, present: &HashSet<PathBuf>) -> usize {
        self.snapshots.retain_present(present)
    }
}
