//! Configuration for the change stream.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Default port subscribers connect to.
pub const DEFAULT_PORT: u16 = 8765;

/// Configuration for a watched root and its subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Root directory to watch.
    pub root: PathBuf,

    /// Name of the ignore file looked up at the root.
    pub ignore_file_name: String,

    /// Bound of the pending queue and of the initial snapshot.
    pub capacity: usize,

    /// Minimum interval between two records for the same path.
    pub debounce_ms: u64,

    /// Interval between two queue drains.
    pub drain_interval_ms: u64,

    /// Extensions (without the dot) that are tracked.
    pub allowed_extensions: Vec<String>,

    /// File names that are never tracked.
    pub denied_filenames: Vec<String>,

    /// Suffixes written by editors for swap and backup files.
    pub editor_suffixes: Vec<String>,

    /// Directory names holding vendored dependencies.
    pub vendored_dirs: Vec<String>,

    /// Address the subscriber endpoint listens on.
    pub listen: SocketAddr,
}

impl StreamConfig {
    /// Create a new config for the given root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore_file_name: ".gitignore".to_string(),
            capacity: 10,
            debounce_ms: 1000,
            drain_interval_ms: 100,
            allowed_extensions: Self::default_extensions(),
            denied_filenames: strings(&[
                "package-lock.json",
                "yarn.lock",
                "pnpm-lock.yaml",
                "Cargo.lock",
                "poetry.lock",
            ]),
            editor_suffixes: strings(&[".swp", ".swo", ".swx", "~", ".bak", ".orig", ".tmp"]),
            vendored_dirs: strings(&[
                "node_modules",
                "bower_components",
                "vendor",
                "site-packages",
                "__pycache__",
                ".venv",
                "venv",
                ".git",
                ".hg",
                ".svn",
            ]),
            listen: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
        }
    }

    /// Load a config from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        Ok(config)
    }

    /// Set the watched root.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    /// Set the queue and snapshot capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the debounce window in milliseconds.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Set the drain interval in milliseconds.
    pub fn with_drain_interval_ms(mut self, drain_interval_ms: u64) -> Self {
        self.drain_interval_ms = drain_interval_ms;
        self
    }

    /// Replace the allowed extension set.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_lowercase())
            .collect();
        self
    }

    /// Set the listen address.
    pub fn with_listen(mut self, listen: SocketAddr) -> Self {
        self.listen = listen;
        self
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Full path of the root's ignore file.
    pub fn ignore_file_path(&self) -> PathBuf {
        self.root.join(&self.ignore_file_name)
    }

    /// Check the config for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(StreamError::Config(
                "capacity must be at least 1".to_string(),
            ));
        }
        if self.allowed_extensions.is_empty() {
            return Err(StreamError::Config(
                "at least one allowed extension is required".to_string(),
            ));
        }
        if self.drain_interval_ms == 0 {
            return Err(StreamError::Config(
                "drain interval must be positive".to_string(),
            ));
        }
        Ok(())
    }

    fn default_extensions() -> Vec<String> {
        strings(&[
            // Scripting
            "py", "rb", "php", "sh", "lua", "pl",
            // Web
            "js", "jsx", "mjs", "ts", "tsx", "html", "css", "scss", "vue", "svelte",
            // Systems
            "rs", "go", "c", "h", "cpp", "hpp", "cc", "cs", "java", "kt", "swift", "scala",
            // Data and docs
            "json", "yaml", "yml", "toml", "md", "sql", "txt",
        ])
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

/// Find the project folder inside a workspace directory.
///
/// The project folder is the first subdirectory in lexical order. Returns
/// `None` when the workspace holds no directory yet.
pub fn discover_project_root(workspace: &Path) -> Result<Option<PathBuf>> {
    if !workspace.is_dir() {
        return Err(StreamError::RootNotFound(workspace.display().to_string()));
    }

    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(workspace)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();

    Ok(dirs.into_iter().next())
}
