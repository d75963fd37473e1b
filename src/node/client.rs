//! Node client: ships batches to the storage service, reconnecting forever.
//!
//! `Disconnected -> Dialing -> Resyncing -> Streaming`, back to `Disconnected`
//! on any failure, `Stopped` once a stop is requested. The namespace is wiped
//! once per process, on the first successful connection, so storage never
//! holds state from a previous run of this node. A batch larger than one frame
//! goes out as several consecutive updates; the batcher hears about it only
//! once the last of them is acknowledged.

use crate::error::RpcError;
use crate::rpc::{split_update, StorageClient, MAX_FRAME};
use crate::types::{NodeId, Operation, Transaction};
use crate::watch::BatchSource;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Dialing,
    Resyncing,
    Streaming,
    Stopped,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Dialing => "dialing",
            ClientState::Resyncing => "resyncing",
            ClientState::Streaming => "streaming",
            ClientState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Progress carried across sessions
#[derive(Debug, Default)]
struct Session {
    /// DeleteList has succeeded once in this process
    resynced: bool,
    /// Frame-sized runs of the current batch not yet acknowledged by storage
    undelivered: VecDeque<Vec<Operation>>,
}

impl Session {
    fn undelivered_len(&self) -> usize {
        self.undelivered.iter().map(Vec::len).sum()
    }
}

pub struct NodeClient {
    node_id: NodeId,
    address: String,
    backoff: Duration,
    frame_limit: usize,
    state: RwLock<ClientState>,
    cancel: CancellationToken,
}

impl NodeClient {
    pub fn new(node_id: impl Into<NodeId>, address: impl Into<String>, backoff: Duration) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            backoff,
            frame_limit: MAX_FRAME,
            state: RwLock::new(ClientState::Disconnected),
            cancel: CancellationToken::new(),
        }
    }

    #[cfg(test)]
    fn with_frame_limit(mut self, frame_limit: usize) -> Self {
        self.frame_limit = frame_limit;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn state(&self) -> ClientState {
        *self.state.read()
    }

    /// Request a stop. Pending dial and batch waits return promptly; an
    /// update already on the wire is allowed to finish. Idempotent.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    fn set_state(&self, next: ClientState) {
        let mut state = self.state.write();
        if *state == ClientState::Stopped || *state == next {
            return;
        }
        let from = *state;
        debug!(node_id = %self.node_id, from = %from, to = %next, "Client state change");
        *state = next;
    }

    /// Deliver every batch from `source` until stopped.
    pub async fn run(&self, mut source: BatchSource) {
        let mut session = Session::default();
        info!(node_id = %self.node_id, address = %self.address, "Node client started");

        while let Some(mut connection) = self.dial().await {
            match self.stream(&mut connection, &mut session, &mut source).await {
                Ok(()) => break,
                Err(e) => {
                    warn!(
                        node_id = %self.node_id,
                        address = %self.address,
                        error = %e,
                        undelivered = session.undelivered_len(),
                        "Session failed, reconnecting"
                    );
                    self.set_state(ClientState::Disconnected);
                    drop(connection);
                    if !self.pause().await {
                        break;
                    }
                }
            }
        }

        self.set_state(ClientState::Stopped);
        info!(node_id = %self.node_id, "Node client stopped");
    }

    /// Connect, waiting one backoff between failed attempts. `None` once stopped.
    async fn dial(&self) -> Option<StorageClient> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            self.set_state(ClientState::Dialing);
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                attempt = StorageClient::connect(&self.address) => attempt,
            };
            match attempt {
                Ok(connection) => {
                    info!(node_id = %self.node_id, address = %self.address, "Connected to storage");
                    return Some(connection);
                }
                Err(e) => {
                    debug!(address = %self.address, error = %e, "Dial failed");
                    self.set_state(ClientState::Disconnected);
                    if !self.pause().await {
                        return None;
                    }
                }
            }
        }
    }

    /// Sleep one backoff; false if a stop arrived first.
    async fn pause(&self) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.backoff) => true,
        }
    }

    /// Resync if needed, then send batches until stopped or an RPC fails.
    async fn stream(
        &self,
        connection: &mut StorageClient,
        session: &mut Session,
        source: &mut BatchSource,
    ) -> Result<(), RpcError> {
        if !session.resynced {
            self.set_state(ClientState::Resyncing);
            match connection.delete_list(&self.node_id).await {
                Ok(()) => info!(node_id = %self.node_id, "Discarded previous namespace"),
                Err(e) if e.is_namespace_not_found() => {
                    debug!(node_id = %self.node_id, "No previous namespace")
                }
                Err(e) => return Err(e),
            }
            session.resynced = true;
        }

        self.set_state(ClientState::Streaming);
        loop {
            if session.undelivered.is_empty() {
                let next = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => None,
                    batch = source.next_batch() => batch,
                };
                let Some(operations) = next else {
                    return Ok(());
                };
                session.undelivered = split_update(&self.node_id, operations, self.frame_limit);
                if session.undelivered.len() > 1 {
                    debug!(
                        node_id = %self.node_id,
                        batch_len = session.undelivered_len(),
                        chunks = session.undelivered.len(),
                        "Batch split across frames"
                    );
                }
            }

            while let Some(operations) = session.undelivered.pop_front() {
                if self.cancel.is_cancelled() {
                    session.undelivered.push_front(operations);
                    return Ok(());
                }

                let transaction = Transaction {
                    node_id: self.node_id.clone(),
                    operations,
                };
                match connection.update(&transaction).await {
                    Ok(applied) => {
                        debug!(
                            node_id = %self.node_id,
                            batch_len = transaction.operations.len(),
                            applied = applied.operations.len(),
                            "Update acknowledged"
                        );
                    }
                    // Refused before any byte was written.
                    Err(RpcError::FrameTooLarge(size)) if transaction.operations.len() == 1 => {
                        error!(
                            node_id = %self.node_id,
                            path_len = transaction.operations[0].path.len(),
                            frame_len = size,
                            "Operation exceeds the frame limit, dropped"
                        );
                    }
                    Err(e) => {
                        session.undelivered.push_front(transaction.operations);
                        return Err(e);
                    }
                }
            }
            source.delivered().await;
        }
    }
}
