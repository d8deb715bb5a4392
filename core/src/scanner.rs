//! Enumeration of tracked files under the watched root.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::filter::IgnoreFilter;
use crate::record::ChangeRecord;
use crate::snapshot::{ReadOutcome, read_text};

/// A tracked file found by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Walk `root` and return every tracked file, most recently modified first.
///
/// Ties on modification time are ordered by the path string, byte by byte,
/// so repeated scans of an unchanged tree give the same order.
pub fn scan_tracked(root: &Path, filter: &IgnoreFilter) -> Vec<TrackedFile> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !entry.file_type().is_dir() || !filter.is_ignored_dir(entry.path()));

    let mut files: Vec<TrackedFile> = walker
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| !filter.is_ignored(entry.path()))
        .map(|entry| {
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            TrackedFile {
                path: entry.into_path(),
                modified,
            }
        })
        .collect();

    files.sort_by(|a, b| {
        b.modified
            .cmp(&a.modified)
            .then_with(|| a.path.as_os_str().cmp(b.path.as_os_str()))
    });
    files
}

/// Records for a newly connected subscriber plus the set of tracked paths
/// seen while building them.
#[derive(Debug, Default)]
pub struct InitialSnapshot {
    pub records: Vec<ChangeRecord>,
    pub tracked: HashSet<PathBuf>,
}

/// Build the initial snapshot: up to `limit` of the most recently modified
/// tracked files, each as an `initial` record. Files that cannot be read as
/// text are skipped and the next candidate is used.
pub fn initial_snapshot(root: &Path, filter: &IgnoreFilter, limit: usize) -> InitialSnapshot {
    let start = Instant::now();
    let files = scan_tracked(root, filter);
    let tracked: HashSet<PathBuf> = files.iter().map(|f| f.path.clone()).collect();

    let mut records = Vec::with_capacity(limit.min(files.len()));
    for file in &files {
        if records.len() >= limit {
            break;
        }
        if let ReadOutcome::Text { content, .. } = read_text(&file.path) {
            records.push(ChangeRecord::initial(root, &file.path, content));
        }
    }

    info!(
        "Built initial snapshot of {} files out of {} tracked in {:?}",
        records.len(),
        tracked.len(),
        start.elapsed()
    );

    InitialSnapshot { records, tracked }
}
