use anyhow::Result;
use clap::Parser;
use codestream_server::Server;
use codestream_server::cli::{Cli, wait_for_project_root};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "codestream=info,codestream_core=info,codestream_server=info";

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let mut config = cli.to_config()?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for ctrl-c: {e}");
                return;
            }
            info!("Shutting down");
            cancel.cancel();
        });
    }

    if let Some(workspace) = &cli.workspace {
        match wait_for_project_root(workspace, &cancel).await? {
            Some(root) => config.root = root,
            None => return Ok(()),
        }
    }

    let server = Server::bind(config).await?;
    info!("Listening on ws://{}", server.local_addr()?);
    server.run(cancel).await
}
