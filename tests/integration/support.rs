use filewatch::aggregator::AggregatorService;
use filewatch::config::{AggregatorConfig, NodeConfig, StorageConfig};
use filewatch::error::StorageError;
use filewatch::rpc::StorageService;
use filewatch::service::Runnable;
use filewatch::store::{PathStore, SledPathStore};
use filewatch::types::{NodeSnapshot, Operation, Transaction};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Update(Vec<Operation>),
    DeleteList(String),
}

/// Path store that timestamps every mutating call
pub struct RecordingStore {
    inner: SledPathStore,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SledPathStore::temporary().unwrap(),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn first_call_at(&self) -> Option<Instant> {
        self.calls.lock().first().map(|(at, _)| *at)
    }

    pub fn files_of(&self, node_id: &str) -> Vec<String> {
        self.inner
            .list_files()
            .unwrap()
            .into_iter()
            .find(|n| n.id == node_id)
            .map(|n| n.sorted().files)
            .unwrap_or_default()
    }
}

impl PathStore for RecordingStore {
    fn update(&self, transaction: &Transaction) -> Result<Vec<Operation>, StorageError> {
        self.calls.lock().push((
            Instant::now(),
            Call::Update(transaction.operations.clone()),
        ));
        self.inner.update(transaction)
    }

    fn delete_list(&self, node_id: &str) -> Result<(), StorageError> {
        self.calls
            .lock()
            .push((Instant::now(), Call::DeleteList(node_id.to_string())));
        self.inner.delete_list(node_id)
    }

    fn list_files(&self) -> Result<Vec<NodeSnapshot>, StorageError> {
        self.inner.list_files()
    }

    fn flush(&self) -> Result<(), StorageError> {
        self.inner.flush()
    }
}

/// An address nothing is listening on (yet)
pub async fn free_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().to_string()
}

pub async fn start_storage(address: &str, store: Arc<dyn PathStore>) -> StorageService {
    let config = StorageConfig {
        listen_address: address.to_string(),
        ..StorageConfig::default()
    };
    let mut service = StorageService::with_store(config, store);
    service.run().await.unwrap();
    service
}

pub async fn start_aggregator(storage_address: &str) -> (AggregatorService, String) {
    let config = AggregatorConfig {
        listen_address: "127.0.0.1:0".to_string(),
        storage_address: storage_address.to_string(),
        request_timeout_ms: 1_000,
    };
    let mut service = AggregatorService::initialize(config);
    service.run().await.unwrap();
    let url = format!("http://{}/list", service.local_addr().unwrap());
    (service, url)
}

pub fn node_config(node_id: &str, root: &Path, storage_address: &str, backoff_ms: u64) -> NodeConfig {
    NodeConfig {
        storage_address: storage_address.to_string(),
        node_id: Some(node_id.to_string()),
        watch_root: Some(root.to_path_buf()),
        reconnect_backoff_ms: backoff_ms,
        event_buffer: 64,
    }
}

/// Poll `check` until it holds, failing the test after ten seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
