//! Ignore rules deciding which paths under a root are tracked.
//!
//! Rules come from two places: the root's ignore file (one pattern per
//! line, `#` comments and blank lines skipped) and a fixed always-ignore set
//! taken from [`StreamConfig`]: denied file names, non-allowed extensions,
//! editor swap/backup suffixes and vendored directory names.

use std::path::{Component, Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, info, warn};

use crate::config::StreamConfig;

/// Kind of an ignore-file rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    /// Pattern ended with `/`: matches a directory anywhere in the path.
    DirectoryPrefix,
    /// Pattern contains `*`, `?` or `[`.
    Glob,
    /// Any other pattern: a literal path.
    ExactPath,
}

/// A single rule parsed from the ignore file.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    /// Pattern with the anchoring `/` and trailing `/` removed.
    pub pattern: String,
    pub kind: RuleKind,
    /// Pattern started with `/` and only matches from the root.
    pub anchored: bool,
    /// Pattern ended with `/` and only matches directories.
    pub dir_only: bool,
    matcher: Gitignore,
}

impl IgnoreRule {
    /// Parse one ignore-file line for a matcher rooted at `root`. Returns
    /// `None` for blanks, comments and patterns that fail to compile.
    pub fn parse(root: &Path, line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (anchored, rest) = match line.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, line),
        };
        let (dir_only, rest) = match rest.strip_suffix('/') {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        let pattern = rest.trim_matches('/').to_string();
        if pattern.is_empty() {
            return None;
        }

        let kind = if pattern.contains(['*', '?', '[']) {
            RuleKind::Glob
        } else if dir_only {
            RuleKind::DirectoryPrefix
        } else {
            RuleKind::ExactPath
        };

        // Unanchored patterns match at any depth, even with an inner `/`.
        let mut glob = if anchored {
            format!("/{pattern}")
        } else if pattern.contains('/') {
            format!("**/{pattern}")
        } else {
            pattern.clone()
        };
        if dir_only {
            glob.push('/');
        }

        let mut builder = GitignoreBuilder::new(root);
        let matcher = match builder.add_line(None, &glob).and_then(|b| b.build()) {
            Ok(matcher) => matcher,
            Err(e) => {
                warn!(pattern = %line, "Skipping invalid ignore pattern: {e}");
                return None;
            }
        };

        Some(Self {
            pattern,
            kind,
            anchored,
            dir_only,
            matcher,
        })
    }

    /// Whether the rule matches `path` or one of its parent directories.
    /// `path` must lie under the matcher's root.
    fn matches(&self, path: &Path, is_dir: bool) -> bool {
        self.matcher
            .matched_path_or_any_parents(path, is_dir)
            .is_ignore()
    }
}

/// Rules loaded from a root's ignore file.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<IgnoreRule>,
}

impl RuleSet {
    /// Parse ignore-file contents for a root.
    pub fn parse(root: &Path, contents: &str) -> Self {
        Self {
            rules: contents
                .lines()
                .filter_map(|line| IgnoreRule::parse(root, line))
                .collect(),
        }
    }

    /// Load the ignore file at `path`. A missing file yields no rules.
    pub fn load(root: &Path, path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(root, &contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                warn!(path = %path.display(), "Failed to read ignore file: {e}");
                Self::default()
            }
        }
    }

    pub fn rules(&self) -> &[IgnoreRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Why a path was ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    OutsideRoot,
    IgnoreFile,
    DeniedFilename,
    Extension,
    EditorSuffix,
    Directory(String),
    Anchored(String),
    Glob(String),
    ExactPath(String),
    Vendored(String),
}

/// Decides whether paths under a root are tracked.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    root: PathBuf,
    ignore_file: PathBuf,
    allowed_extensions: Vec<String>,
    denied_filenames: Vec<String>,
    editor_suffixes: Vec<String>,
    vendored_dirs: Vec<String>,
    rules: RuleSet,
}

impl IgnoreFilter {
    /// Build a filter for the config's root and load its ignore file.
    pub fn load(config: &StreamConfig) -> Self {
        let mut filter = Self {
            root: config.root.clone(),
            ignore_file: config.ignore_file_path(),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
            denied_filenames: config.denied_filenames.clone(),
            editor_suffixes: config.editor_suffixes.clone(),
            vendored_dirs: config.vendored_dirs.clone(),
            rules: RuleSet::default(),
        };
        filter.reload();
        filter
    }

    /// Re-read the ignore file.
    pub fn reload(&mut self) {
        self.rules = RuleSet::load(&self.root, &self.ignore_file);
        info!(
            path = %self.ignore_file.display(),
            rules = self.rules.len(),
            "Loaded ignore rules"
        );
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Whether `path` is the root's ignore file.
    pub fn is_ignore_file(&self, path: &Path) -> bool {
        path == self.ignore_file
    }

    /// Whether `path` is excluded from tracking.
    pub fn is_ignored(&self, path: &Path) -> bool {
        match self.ignore_reason(path) {
            Some(reason) => {
                debug!(path = %path.display(), ?reason, "Ignoring path");
                true
            }
            None => false,
        }
    }

    /// The first rule that excludes `path`, if any.
    pub fn ignore_reason(&self, path: &Path) -> Option<IgnoreReason> {
        let Some(segments) = self.relative_segments(path) else {
            return Some(IgnoreReason::OutsideRoot);
        };
        let Some(filename) = segments.last().map(String::as_str) else {
            return Some(IgnoreReason::OutsideRoot);
        };

        if self.is_ignore_file(path) {
            return Some(IgnoreReason::IgnoreFile);
        }

        // (a) denied file names
        if self.denied_filenames.iter().any(|d| d == filename) {
            return Some(IgnoreReason::DeniedFilename);
        }

        // (b) extension allow-list
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);
        match extension {
            Some(ext) if self.allowed_extensions.contains(&ext) => {}
            _ => return Some(IgnoreReason::Extension),
        }

        // (c) editor swap and backup files
        if self
            .editor_suffixes
            .iter()
            .any(|suffix| filename.ends_with(suffix.as_str()))
            || filename.starts_with(".#")
        {
            return Some(IgnoreReason::EditorSuffix);
        }

        let rules = self.rules.rules();
        let first = |category: fn(&IgnoreRule) -> bool| {
            rules
                .iter()
                .find(|&rule| category(rule) && rule.matches(path, false))
                .map(|rule| rule.pattern.clone())
        };

        // (d) directory rules
        if let Some(pattern) = first(|r| r.kind == RuleKind::DirectoryPrefix && !r.anchored) {
            return Some(IgnoreReason::Directory(pattern));
        }

        // (e) root-anchored rules
        if let Some(pattern) = first(|r| r.anchored && r.kind != RuleKind::Glob) {
            return Some(IgnoreReason::Anchored(pattern));
        }

        // (f) globs, then literal paths
        if let Some(pattern) = first(|r| r.kind == RuleKind::Glob) {
            return Some(IgnoreReason::Glob(pattern));
        }
        if let Some(pattern) = first(|r| r.kind == RuleKind::ExactPath && !r.anchored) {
            return Some(IgnoreReason::ExactPath(pattern));
        }

        // (g) vendored directories
        let dirs = &segments[..segments.len() - 1];
        if let Some(dir) = dirs
            .iter()
            .find(|d| self.vendored_dirs.iter().any(|v| v == *d))
        {
            return Some(IgnoreReason::Vendored(dir.clone()));
        }

        None
    }

    /// Whether nothing below directory `path` can be tracked, so a scan can
    /// skip descending into it.
    pub fn is_ignored_dir(&self, path: &Path) -> bool {
        let Some(segments) = self.relative_segments(path) else {
            return true;
        };
        if segments.is_empty() {
            return false;
        }

        if segments
            .iter()
            .any(|s| self.vendored_dirs.iter().any(|v| v == s))
        {
            return true;
        }

        self.rules.rules().iter().any(|rule| rule.matches(path, true))
    }

    /// Path relative to the root, split into normal components.
    fn relative_segments(&self, path: &Path) -> Option<Vec<String>> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(segments)
    }
}
