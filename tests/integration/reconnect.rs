use crate::integration::support::{
    eventually, free_address, node_config, start_storage, Call, RecordingStore,
};
use filewatch::node::{ClientState, NodeAgent};
use filewatch::service::Runnable;
use std::fs;
use std::time::{Duration, Instant};

const BACKOFF: Duration = Duration::from_millis(400);

#[tokio::test]
async fn node_waits_for_storage_then_resyncs_once() {
    let temp = tempfile::tempdir().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let base = root.file_name().unwrap().to_string_lossy().into_owned();
    fs::write(root.join("a.txt"), b"x").unwrap();

    let storage_address = free_address().await;
    let mut agent = NodeAgent::initialize(node_config(
        "n1",
        &root,
        &storage_address,
        BACKOFF.as_millis() as u64,
    ));
    let started = Instant::now();
    agent.run().await.unwrap();

    // Let the first dial fail before storage appears.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(agent.client_state(), Some(ClientState::Disconnected));

    let store = RecordingStore::new();
    let mut storage = start_storage(&storage_address, store.clone()).await;

    let expected = format!("{base}/a.txt");
    eventually("initial listing", || store.files_of("n1").contains(&expected)).await;
    let connected_at = store.first_call_at().unwrap();
    assert!(connected_at.duration_since(started) >= BACKOFF);

    fs::write(root.join("b.txt"), b"x").unwrap();
    let later = format!("{base}/b.txt");
    eventually("live change", || store.files_of("n1").contains(&later)).await;

    let calls = store.calls();
    assert_eq!(calls[0], Call::DeleteList("n1".to_string()));
    let wipes = calls
        .iter()
        .filter(|c| matches!(c, Call::DeleteList(_)))
        .count();
    assert_eq!(wipes, 1);
    assert!(calls[1..].iter().all(|c| matches!(c, Call::Update(_))));

    agent.stop().await;
    assert_eq!(agent.client_state(), Some(ClientState::Stopped));
    storage.stop().await;
}

#[tokio::test]
async fn stop_is_prompt_while_storage_is_down() {
    let temp = tempfile::tempdir().unwrap();
    let storage_address = free_address().await;
    let mut agent = NodeAgent::initialize(node_config("n1", temp.path(), &storage_address, 60_000));
    agent.run().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    tokio::time::timeout(Duration::from_secs(2), agent.stop())
        .await
        .expect("stop should not wait out the backoff");
    assert_eq!(agent.client_state(), Some(ClientState::Stopped));
}
