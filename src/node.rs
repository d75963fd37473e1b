//! Node agent: watcher -> batcher -> client, wired for one watch root.

pub mod client;

pub use client::{ClientState, NodeClient};

use crate::config::NodeConfig;
use crate::error::ServiceError;
use crate::service::Runnable;
use crate::types::NodeId;
use crate::watch::{DirectoryWatcher, EventBatcher};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Host name, or `localhost` when the platform won't say.
pub fn default_node_id() -> NodeId {
    sysinfo::System::host_name().unwrap_or_else(|| "localhost".to_string())
}

pub struct NodeAgent {
    config: NodeConfig,
    node_id: NodeId,
    watch_root: PathBuf,
    cancel: CancellationToken,
    tasks: TaskTracker,
    watcher: Option<Arc<DirectoryWatcher>>,
    client: Option<Arc<NodeClient>>,
}

impl NodeAgent {
    /// Resolve host-dependent defaults; nothing is started.
    pub fn initialize(config: NodeConfig) -> Self {
        let node_id = config.node_id.clone().unwrap_or_else(default_node_id);
        let watch_root = config.watch_root.clone().unwrap_or_else(std::env::temp_dir);
        Self {
            config,
            node_id,
            watch_root,
            cancel: CancellationToken::new(),
            tasks: TaskTracker::new(),
            watcher: None,
            client: None,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn watch_root(&self) -> &Path {
        &self.watch_root
    }

    /// Connection state, once running
    pub fn client_state(&self) -> Option<ClientState> {
        self.client.as_ref().map(|c| c.state())
    }
}

#[async_trait]
impl Runnable for NodeAgent {
    fn name(&self) -> &'static str {
        "node agent"
    }

    async fn run(&mut self) -> Result<(), ServiceError> {
        if self.watcher.is_some() {
            return Err(ServiceError::AlreadyRunning(self.name()));
        }

        let watcher = Arc::new(DirectoryWatcher::new(&self.watch_root)?);
        watcher.check_root()?;
        let scan = tokio::task::spawn_blocking({
            let watcher = Arc::clone(&watcher);
            move || watcher.initial_scan()
        })
        .await??;

        let (sink, source, batcher) =
            EventBatcher::spawn(self.config.event_buffer, self.cancel.clone());
        let client = Arc::new(NodeClient::new(
            self.node_id.clone(),
            self.config.storage_address.clone(),
            Duration::from_millis(self.config.reconnect_backoff_ms),
        ));

        self.tasks.spawn(async move {
            if let Err(e) = batcher.await {
                error!(error = %e, "Event batcher failed");
            }
        });
        self.tasks.spawn({
            let watcher = Arc::clone(&watcher);
            async move {
                let scanned = scan.len();
                for op in scan {
                    if !sink.send(op).await {
                        return;
                    }
                }
                debug!(entries = scanned, "Initial listing queued");
                watcher.stream_events(sink).await;
            }
        });
        self.tasks.spawn({
            let client = Arc::clone(&client);
            async move { client.run(source).await }
        });

        info!(
            node_id = %self.node_id,
            root = %watcher.root().display(),
            storage = %self.config.storage_address,
            "Node agent running"
        );
        self.watcher = Some(watcher);
        self.client = Some(client);
        Ok(())
    }

    async fn stop(&mut self) {
        if let Some(watcher) = &self.watcher {
            watcher.stop();
        }
        if let Some(client) = &self.client {
            client.stop();
        }
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
        debug!(node_id = %self.node_id, "Node agent stopped");
    }
}
