use crate::integration::support::{
    eventually, node_config, start_aggregator, start_storage, RecordingStore,
};
use filewatch::node::NodeAgent;
use filewatch::rpc::StorageClient;
use filewatch::service::Runnable;
use filewatch::types::{NodeSnapshot, Operation, Transaction};
use std::fs;

#[tokio::test]
async fn update_batches_are_listed_per_node() {
    let store = RecordingStore::new();
    let mut storage = start_storage("127.0.0.1:0", store.clone()).await;
    let address = storage.local_addr().unwrap().to_string();
    let mut client = StorageClient::connect(&address).await.unwrap();

    client
        .update(&Transaction {
            node_id: "n1".to_string(),
            operations: vec![Operation::create("/my/a"), Operation::create("/my/b")],
        })
        .await
        .unwrap();
    assert_eq!(store.files_of("n1"), vec!["/my/a", "/my/b"]);

    client
        .update(&Transaction {
            node_id: "n1".to_string(),
            operations: vec![Operation::remove("/my/a"), Operation::create("/your/b")],
        })
        .await
        .unwrap();
    let mut nodes = client.list_files().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes.remove(0).sorted().files, vec!["/my/b", "/your/b"]);

    drop(client);
    storage.stop().await;
}

#[tokio::test]
async fn watched_changes_reach_the_http_listing() {
    let temp = tempfile::tempdir().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let base = root.file_name().unwrap().to_string_lossy().into_owned();
    fs::create_dir(root.join("docs")).unwrap();
    fs::write(root.join("docs/keep.txt"), b"x").unwrap();
    fs::write(root.join("gone.txt"), b"x").unwrap();

    let store = RecordingStore::new();
    let mut storage = start_storage("127.0.0.1:0", store.clone()).await;
    let storage_address = storage.local_addr().unwrap().to_string();
    let (mut aggregator, url) = start_aggregator(&storage_address).await;

    let mut agent = NodeAgent::initialize(node_config("n1", &root, &storage_address, 50));
    agent.run().await.unwrap();

    let keep = format!("{base}/docs/keep.txt");
    let gone = format!("{base}/gone.txt");
    eventually("initial listing", || store.files_of("n1").contains(&gone)).await;

    fs::remove_file(root.join("gone.txt")).unwrap();
    fs::rename(root.join("docs/keep.txt"), root.join("docs/moved.txt")).unwrap();
    fs::create_dir(root.join("new")).unwrap();
    fs::write(root.join("new/inner.txt"), b"x").unwrap();

    let moved = format!("{base}/docs/moved.txt");
    let inner = format!("{base}/new/inner.txt");
    eventually("live changes", || {
        let files = store.files_of("n1");
        files.contains(&moved) && files.contains(&inner) && !files.contains(&gone)
            && !files.contains(&keep)
    })
    .await;

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get("x-filewatch-stale").is_none());
    let nodes: Vec<NodeSnapshot> = response.json().await.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].id, "n1");
    let mut sorted = nodes[0].files.clone();
    sorted.sort();
    assert_eq!(nodes[0].files, sorted);
    assert!(nodes[0].files.contains(&moved));

    agent.stop().await;
    aggregator.stop().await;
    storage.stop().await;
}

#[tokio::test]
async fn restarted_node_replaces_its_previous_listing() {
    let temp = tempfile::tempdir().unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap();
    let base = root.file_name().unwrap().to_string_lossy().into_owned();
    fs::write(root.join("current.txt"), b"x").unwrap();

    let store = RecordingStore::new();
    let mut storage = start_storage("127.0.0.1:0", store.clone()).await;
    let address = storage.local_addr().unwrap().to_string();

    // Left over from an earlier run of the same node.
    let mut client = StorageClient::connect(&address).await.unwrap();
    client
        .update(&Transaction {
            node_id: "n1".to_string(),
            operations: vec![Operation::create("stale/file")],
        })
        .await
        .unwrap();
    drop(client);

    let mut agent = NodeAgent::initialize(node_config("n1", &root, &address, 50));
    agent.run().await.unwrap();

    let current = format!("{base}/current.txt");
    eventually("fresh listing", || {
        let files = store.files_of("n1");
        files.contains(&current) && !files.iter().any(|f| f == "stale/file")
    })
    .await;

    agent.stop().await;
    storage.stop().await;
}

#[tokio::test]
async fn directory_moved_out_takes_its_files_along() {
    let temp = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir_in(temp.path()).unwrap();
    let root = dunce::canonicalize(temp.path()).unwrap().join("watched");
    fs::create_dir_all(root.join("project/src")).unwrap();
    fs::write(root.join("project/src/main.rs"), b"x").unwrap();
    fs::write(root.join("project/README"), b"x").unwrap();
    fs::write(root.join("stays.txt"), b"x").unwrap();

    let store = RecordingStore::new();
    let mut storage = start_storage("127.0.0.1:0", store.clone()).await;
    let address = storage.local_addr().unwrap().to_string();
    let mut agent = NodeAgent::initialize(node_config("n1", &root, &address, 50));
    agent.run().await.unwrap();

    let main = "watched/project/src/main.rs".to_string();
    eventually("initial listing", || store.files_of("n1").contains(&main)).await;

    fs::rename(root.join("project"), outside.path().join("project")).unwrap();
    eventually("subtree removed", || {
        store.files_of("n1") == vec!["watched".to_string(), "watched/stays.txt".to_string()]
    })
    .await;

    agent.stop().await;
    storage.stop().await;
}
