//! Storage service: serves a [`PathStore`] to remote callers.

use super::protocol::{read_frame, write_frame, Request, Response};
use crate::config::StorageConfig;
use crate::error::{RemoteError, RpcError, ServiceError};
use crate::service::Runnable;
use crate::store::{PathStore, SledPathStore};
use crate::types::Transaction;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so descriptor exhaustion can't spin the loop
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

pub struct StorageService {
    config: StorageConfig,
    store: Option<Arc<dyn PathStore>>,
    cancel: CancellationToken,
    connections: TaskTracker,
    accept_task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl StorageService {
    pub fn initialize(config: StorageConfig) -> Self {
        Self {
            config,
            store: None,
            cancel: CancellationToken::new(),
            connections: TaskTracker::new(),
            accept_task: None,
            local_addr: None,
        }
    }

    /// Serve `store` instead of opening `db_path`.
    pub fn with_store(config: StorageConfig, store: Arc<dyn PathStore>) -> Self {
        let mut service = Self::initialize(config);
        service.store = Some(store);
        service
    }

    /// Bound address, once running
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    async fn open_store(&mut self) -> Result<Arc<dyn PathStore>, ServiceError> {
        if let Some(store) = &self.store {
            return Ok(Arc::clone(store));
        }
        let path = self.config.db_path.clone();
        let store = tokio::task::spawn_blocking(move || SledPathStore::open(&path)).await??;
        let store: Arc<dyn PathStore> = Arc::new(store);
        self.store = Some(Arc::clone(&store));
        Ok(store)
    }
}

#[async_trait]
impl Runnable for StorageService {
    fn name(&self) -> &'static str {
        "storage service"
    }

    async fn run(&mut self) -> Result<(), ServiceError> {
        if self.accept_task.is_some() {
            return Err(ServiceError::AlreadyRunning(self.name()));
        }

        let store = self.open_store().await?;
        let listener = TcpListener::bind(&self.config.listen_address)
            .await
            .map_err(|source| ServiceError::Bind {
                address: self.config.listen_address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServiceError::Bind {
            address: self.config.listen_address.clone(),
            source,
        })?;
        self.local_addr = Some(local_addr);
        info!(address = %local_addr, "Storage service listening");

        self.accept_task = Some(tokio::spawn(accept_loop(
            listener,
            store,
            self.cancel.clone(),
            self.connections.clone(),
        )));
        Ok(())
    }

    async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Accept loop failed");
            }
        }
        self.connections.close();
        self.connections.wait().await;

        // Dropping the last handle closes the database.
        if let Some(store) = self.store.take() {
            match tokio::task::spawn_blocking(move || store.flush()).await {
                Ok(Ok(())) => info!("Storage service stopped"),
                Ok(Err(e)) => warn!(error = %e, "Final flush failed"),
                Err(e) => warn!(error = %e, "Final flush task failed"),
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    store: Arc<dyn PathStore>,
    cancel: CancellationToken,
    connections: TaskTracker,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(peer = %peer, "Accepted connection");
                connections.spawn(serve_connection(
                    stream,
                    peer,
                    Arc::clone(&store),
                    cancel.clone(),
                ));
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
            }
        }
    }
    debug!("Listener closed");
}

/// Answer requests on one connection until the peer hangs up or the
/// service stops. A request already read is always answered.
async fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    store: Arc<dyn PathStore>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = read_frame::<_, Request>(&mut stream) => frame,
        };
        let request = match frame {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(e) => {
                debug!(peer = %peer, error = %e, "Dropping connection");
                break;
            }
        };

        let name = request.name();
        let store = Arc::clone(&store);
        let response = match tokio::task::spawn_blocking(move || dispatch(store.as_ref(), request))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(peer = %peer, request = name, error = %e, "Request handler failed");
                Response::Error(RemoteError::Storage(e.to_string()))
            }
        };

        let written = match write_frame(&mut stream, &response).await {
            // Nothing reached the wire; the caller still gets an answer.
            Err(RpcError::FrameTooLarge(size)) => {
                error!(
                    peer = %peer,
                    request = name,
                    frame_len = size,
                    "Response exceeds the frame limit"
                );
                let refusal = Response::Error(RemoteError::ResponseTooLarge(size));
                write_frame(&mut stream, &refusal).await
            }
            other => other,
        };
        if let Err(e) = written {
            debug!(peer = %peer, error = %e, "Failed to send response");
            break;
        }
    }
    debug!(peer = %peer, "Connection closed");
}

/// Run one request against the store.
pub(crate) fn dispatch(store: &dyn PathStore, request: Request) -> Response {
    match request {
        Request::Update(transaction) => match store.update(&transaction) {
            Ok(operations) => {
                debug!(node_id = %transaction.node_id, batch_len = operations.len(), "Update applied");
                Response::Updated(Transaction {
                    node_id: transaction.node_id,
                    operations,
                })
            }
            Err(e) => {
                warn!(node_id = %transaction.node_id, error = %e, "Update failed");
                Response::Error(e.into())
            }
        },
        Request::DeleteList(node_id) => match store.delete_list(&node_id) {
            Ok(()) => Response::ListDeleted,
            Err(e) => Response::Error(e.into()),
        },
        Request::ListFiles => match store.list_files() {
            Ok(nodes) => Response::Files(nodes),
            Err(e) => {
                warn!(error = %e, "ListFiles failed");
                Response::Error(e.into())
            }
        },
    }
}
