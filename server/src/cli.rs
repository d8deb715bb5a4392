//! Command-line and environment configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use codestream_core::{StreamConfig, discover_project_root};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// How often a workspace is checked for a project folder.
const DISCOVERY_INTERVAL: Duration = Duration::from_secs(1);

/// Stream live source-file changes to WebSocket subscribers.
#[derive(Debug, Parser)]
#[command(name = "codestream", version)]
pub struct Cli {
    /// TOML config file; flags override its values.
    #[arg(long, env = "CODESTREAM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory to watch.
    #[arg(long, env = "CODESTREAM_ROOT", conflicts_with = "workspace")]
    pub root: Option<PathBuf>,

    /// Watch the first project folder inside this directory, waiting for
    /// one to appear if needed.
    #[arg(long, env = "CODESTREAM_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, env = "CODESTREAM_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Pending queue bound and initial snapshot size.
    #[arg(long, env = "CODESTREAM_CAPACITY")]
    pub capacity: Option<usize>,

    /// Minimum milliseconds between two records for the same file.
    #[arg(long, env = "CODESTREAM_DEBOUNCE_MS")]
    pub debounce_ms: Option<u64>,

    /// Milliseconds between queue drains.
    #[arg(long, env = "CODESTREAM_DRAIN_INTERVAL_MS")]
    pub drain_interval_ms: Option<u64>,

    /// Comma-separated extensions to track, replacing the default set.
    #[arg(long, env = "CODESTREAM_EXTENSIONS", value_delimiter = ',')]
    pub extensions: Vec<String>,
}

impl Cli {
    /// Merge the config file (if any) with flag overrides.
    pub fn to_config(&self) -> Result<StreamConfig> {
        let mut config = match &self.config {
            Some(path) => StreamConfig::from_toml_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => StreamConfig::default(),
        };

        if let Some(root) = &self.root {
            config.root = root.clone();
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(capacity) = self.capacity {
            config.capacity = capacity;
        }
        if let Some(debounce_ms) = self.debounce_ms {
            config.debounce_ms = debounce_ms;
        }
        if let Some(drain_interval_ms) = self.drain_interval_ms {
            config.drain_interval_ms = drain_interval_ms;
        }
        if !self.extensions.is_empty() {
            config = config.with_extensions(self.extensions.iter().map(String::as_str));
        }

        config.validate()?;
        Ok(config)
    }
}

/// Wait until `workspace` contains a project folder and return it.
///
/// Returns `None` if `cancel` fires first.
pub async fn wait_for_project_root(
    workspace: &Path,
    cancel: &CancellationToken,
) -> Result<Option<PathBuf>> {
    let mut announced = false;
    loop {
        if let Some(root) = discover_project_root(workspace)? {
            info!(root = %root.display(), "Project folder found");
            return Ok(Some(root));
        }
        if !announced {
            info!(
                workspace = %workspace.display(),
                "No project folder yet, waiting for one to appear"
            );
            announced = true;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(None),
            _ = tokio::time::sleep(DISCOVERY_INTERVAL) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "codestream",
            "--root",
            "/srv/app",
            "--capacity",
            "3",
            "--debounce-ms",
            "250",
            "--extensions",
            "py,rs",
            "--listen",
            "0.0.0.0:9000",
        ])
        .unwrap();
        let config = cli.to_config().unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/app"));
        assert_eq!(config.capacity, 3);
        assert_eq!(config.debounce_ms, 250);
        assert_eq!(config.allowed_extensions, vec!["py", "rs"]);
        assert_eq!(config.listen.port(), 9000);
    }

    #[test]
    fn test_config_file_with_override() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("codestream.toml");
        std::fs::write(&path, "root = \"/srv/app\"\ncapacity = 7\n").unwrap();

        let cli = Cli::try_parse_from([
            "codestream",
            "--config",
            path.to_str().unwrap(),
            "--capacity",
            "2",
        ])
        .unwrap();
        let config = cli.to_config().unwrap();

        assert_eq!(config.root, PathBuf::from("/srv/app"));
        assert_eq!(config.capacity, 2);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let cli = Cli::try_parse_from(["codestream", "--capacity", "0"]).unwrap();
        assert!(cli.to_config().is_err());
    }

    #[test]
    fn test_root_conflicts_with_workspace() {
        let result = Cli::try_parse_from(["codestream", "--root", "a", "--workspace", "b"]);
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_project_root_finds_late_folder() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = temp_dir.path().to_path_buf();
        let project = workspace.join("project");

        let creator = {
            let project = project.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                std::fs::create_dir(&project).unwrap();
            })
        };

        let cancel = CancellationToken::new();
        let found = tokio::time::timeout(
            Duration::from_secs(10),
            wait_for_project_root(&workspace, &cancel),
        )
        .await
        .unwrap()
        .unwrap();

        creator.await.unwrap();
        assert_eq!(found, Some(project));
    }

    #[tokio::test]
    async fn test_wait_for_project_root_cancelled() {
        let temp_dir = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let found = wait_for_project_root(temp_dir.path(), &cancel).await.unwrap();
        assert_eq!(found, None);
    }
}
