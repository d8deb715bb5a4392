//! Codestream server: watches a root and serves its changes over WebSocket.

pub mod cli;
pub mod transport;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use codestream_core::{FsWatcher, Pipeline, PipelineHandle, StreamConfig};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::{TransportState, router};

/// A bound server ready to run.
pub struct Server {
    listener: TcpListener,
    watcher: FsWatcher,
    pipeline: Pipeline,
    handle: PipelineHandle,
}

impl Server {
    /// Start watching the config's root and bind the listen address.
    pub async fn bind(mut config: StreamConfig) -> Result<Self> {
        config.validate()?;
        config.root = config
            .root
            .canonicalize()
            .with_context(|| format!("cannot watch {}", config.root.display()))?;

        let (watcher, events) = FsWatcher::start(&config.root)?;
        let (pipeline, handle) = Pipeline::new(&config, events);
        let listener = TcpListener::bind(config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;

        Ok(Self {
            listener,
            watcher,
            pipeline,
            handle,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let Self {
            listener,
            watcher,
            pipeline,
            handle,
        } = self;

        let pipeline_task = pipeline.spawn(cancel.clone());
        let app = router(TransportState {
            handle,
            cancel: cancel.clone(),
        });

        info!(
            addr = %listener.local_addr()?,
            root = %watcher.root().display(),
            "Serving changes"
        );
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .await;

        cancel.cancel();
        if let Err(e) = pipeline_task.await {
            warn!("Pipeline task failed: {e}");
        }
        watcher.stop();

        served.context("server error")
    }
}
