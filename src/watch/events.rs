//! Watch events, batching, and the batch handoff to the sender.

use crate::types::{OpKind, Operation};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Filesystem change event, before re-rooting
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Created(PathBuf),
    Removed(PathBuf),
}

impl ChangeEvent {
    pub fn path(&self) -> &Path {
        match self {
            ChangeEvent::Created(p) | ChangeEvent::Removed(p) => p,
        }
    }

    pub fn kind(&self) -> OpKind {
        match self {
            ChangeEvent::Created(_) => OpKind::Create,
            ChangeEvent::Removed(_) => OpKind::Remove,
        }
    }
}

/// Translate a native notification into existence changes.
///
/// Content and metadata changes carry no existence information and are dropped.
pub(crate) fn convert_event(event: &Event) -> Vec<ChangeEvent> {
    match &event.kind {
        EventKind::Create(_) => event
            .paths
            .iter()
            .cloned()
            .map(ChangeEvent::Created)
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .iter()
            .cloned()
            .map(ChangeEvent::Removed)
            .collect(),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => event
                .paths
                .first()
                .map(|p| vec![ChangeEvent::Removed(p.clone())])
                .unwrap_or_default(),
            RenameMode::To => event
                .paths
                .first()
                .map(|p| vec![ChangeEvent::Created(p.clone())])
                .unwrap_or_default(),
            RenameMode::Both => {
                if event.paths.len() >= 2 {
                    vec![
                        ChangeEvent::Removed(event.paths[0].clone()),
                        ChangeEvent::Created(event.paths[1].clone()),
                    ]
                } else {
                    Vec::new()
                }
            }
            // Direction unknown: whatever is on disk now wins.
            _ => event
                .paths
                .iter()
                .map(|p| {
                    if p.symlink_metadata().is_ok() {
                        ChangeEvent::Created(p.clone())
                    } else {
                        ChangeEvent::Removed(p.clone())
                    }
                })
                .collect(),
        },
        _ => Vec::new(),
    }
}

/// Inputs driving the batcher state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatcherInput {
    /// A new operation from the watcher
    Event(Operation),
    /// The consumer finished with the batch in flight
    Delivered,
    /// Terminate; no further batches are produced
    Stop,
}

/// Greedy batcher with at most one batch in flight.
///
/// Operations arriving while a batch is in flight accumulate into the next
/// batch. Batches keep arrival order and are emitted in formation order.
#[derive(Debug, Default)]
pub struct EventBatcher {
    pending: Vec<Operation>,
    in_flight: bool,
    stopped: bool,
}

impl EventBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one input; returns the next batch when one should be handed off.
    pub fn handle(&mut self, input: BatcherInput) -> Option<Vec<Operation>> {
        if self.stopped {
            return None;
        }
        match input {
            BatcherInput::Event(op) => self.pending.push(op),
            BatcherInput::Delivered => self.in_flight = false,
            BatcherInput::Stop => {
                self.stopped = true;
                return None;
            }
        }

        if self.in_flight || self.pending.is_empty() {
            return None;
        }
        self.in_flight = true;
        Some(std::mem::take(&mut self.pending))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Run the batcher on its own task.
    ///
    /// Returns the producer handle, the consumer handle and the task handle. The
    /// task ends when `cancel` fires or every input handle is dropped.
    pub fn spawn(
        buffer: usize,
        cancel: CancellationToken,
    ) -> (EventSink, BatchSource, JoinHandle<()>) {
        let (input_tx, input_rx) = mpsc::channel(buffer.max(1));
        // One slot is enough: a second batch is never formed before the first
        // has been taken and acknowledged.
        let (batch_tx, batch_rx) = mpsc::channel(1);

        let handle = tokio::spawn(Self::new().run(input_rx, batch_tx, cancel));
        let sink = EventSink {
            tx: input_tx.clone(),
        };
        let source = BatchSource {
            batches: batch_rx,
            acks: input_tx,
        };
        (sink, source, handle)
    }

    async fn run(
        mut self,
        mut inputs: mpsc::Receiver<BatcherInput>,
        batches: mpsc::Sender<Vec<Operation>>,
        cancel: CancellationToken,
    ) {
        debug!("Event batcher started");
        loop {
            let input = tokio::select! {
                biased;
                _ = cancel.cancelled() => BatcherInput::Stop,
                input = inputs.recv() => input.unwrap_or(BatcherInput::Stop),
            };
            trace!(?input, "Batcher input");

            if let Some(batch) = self.handle(input) {
                debug!(batch_len = batch.len(), "Handing off batch");
                if batches.send(batch).await.is_err() {
                    break;
                }
            }
            if self.stopped {
                break;
            }
        }
        debug!(pending = self.pending.len(), "Event batcher stopped");
    }
}

/// Producer side of the batcher
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<BatcherInput>,
}

impl EventSink {
    /// Enqueue an operation. Returns false once the batcher has stopped.
    pub async fn send(&self, op: Operation) -> bool {
        self.tx.send(BatcherInput::Event(op)).await.is_ok()
    }
}

/// Consumer side of the batcher
#[derive(Debug)]
pub struct BatchSource {
    batches: mpsc::Receiver<Vec<Operation>>,
    acks: mpsc::Sender<BatcherInput>,
}

impl BatchSource {
    /// Wait for the next batch; `None` once the batcher has stopped.
    pub async fn next_batch(&mut self) -> Option<Vec<Operation>> {
        self.batches.recv().await
    }

    /// Acknowledge the batch in flight so the next one can be formed.
    pub async fn delivered(&self) {
        let _ = self.acks.send(BatcherInput::Delivered).await;
    }
}
