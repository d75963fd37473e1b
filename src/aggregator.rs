//! Aggregator: pulls every node's file set from storage and serves it,
//! falling back to the last good pull when storage is unreachable.

pub mod cache;
pub mod http;

pub use cache::SnapshotCache;
pub use http::{router, AggregatorService, STALE_HEADER};

use crate::error::{AggregateError, RemoteError, RpcError};
use crate::rpc::StorageClient;
use crate::types::NodeSnapshot;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Where snapshots come from
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn list_files(&self) -> Result<Vec<NodeSnapshot>, RpcError>;
}

/// Pulls from the storage service, one connection per pull.
pub struct RemoteStorage {
    address: String,
    timeout: Duration,
}

impl RemoteStorage {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }
}

#[async_trait]
impl SnapshotSource for RemoteStorage {
    async fn list_files(&self) -> Result<Vec<NodeSnapshot>, RpcError> {
        let pull = async {
            let mut client = StorageClient::connect(&self.address).await?;
            client.list_files().await
        };
        tokio::time::timeout(self.timeout, pull)
            .await
            .map_err(|_| RpcError::Timeout)?
    }
}

/// Result of one list request
#[derive(Debug, Clone)]
pub enum Listing {
    /// Pulled just now
    Fresh(Arc<Vec<NodeSnapshot>>),
    /// Storage unreachable; the last good pull
    Stale(Arc<Vec<NodeSnapshot>>),
}

impl Listing {
    pub fn nodes(&self) -> &[NodeSnapshot] {
        match self {
            Listing::Fresh(nodes) | Listing::Stale(nodes) => nodes,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Listing::Stale(_))
    }
}

pub struct Aggregator {
    source: Arc<dyn SnapshotSource>,
    cache: SnapshotCache,
}

impl Aggregator {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            cache: SnapshotCache::new(),
        }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Pull a fresh listing, or serve the cached one if the pull fails.
    ///
    /// Files are sorted within each node and nodes are sorted by id.
    pub async fn list(&self) -> Result<Listing, AggregateError> {
        match self.source.list_files().await {
            Ok(nodes) => {
                let mut nodes: Vec<NodeSnapshot> =
                    nodes.into_iter().map(NodeSnapshot::sorted).collect();
                nodes.sort_by(|a, b| a.id.cmp(&b.id));
                let nodes = Arc::new(nodes);
                self.cache.replace(Arc::clone(&nodes));
                debug!(nodes = nodes.len(), "Pulled fresh listing");
                Ok(Listing::Fresh(nodes))
            }
            Err(e) => {
                if matches!(e, RpcError::Remote(RemoteError::ResponseTooLarge(_))) {
                    error!(error = %e, "Storage listing no longer fits in one frame");
                }
                match self.cache.get() {
                    Some(nodes) => {
                        warn!(error = %e, "Storage unreachable, serving cached listing");
                        Ok(Listing::Stale(nodes))
                    }
                    None => Err(AggregateError::BackendUnreachable(e)),
                }
            }
        }
    }
}
