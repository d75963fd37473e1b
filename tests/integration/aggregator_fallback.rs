use crate::integration::support::{free_address, start_aggregator, start_storage};
use filewatch::aggregator::STALE_HEADER;
use filewatch::rpc::StorageClient;
use filewatch::service::Runnable;
use filewatch::store::SledPathStore;
use filewatch::types::{NodeSnapshot, Operation, Transaction};
use std::sync::Arc;

#[tokio::test]
async fn listing_survives_storage_outage() {
    let storage_address = free_address().await;
    let (mut aggregator, url) = start_aggregator(&storage_address).await;

    // Never reached storage: nothing to fall back on.
    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(response.text().await.unwrap(), "Server unreachable");

    let store = Arc::new(SledPathStore::temporary().unwrap());
    let mut storage = start_storage(&storage_address, store.clone()).await;
    let mut client = StorageClient::connect(&storage_address).await.unwrap();
    for (node_id, path) in [("n2", "/z"), ("n1", "/b"), ("n1", "/a")] {
        client
            .update(&Transaction {
                node_id: node_id.to_string(),
                operations: vec![Operation::create(path)],
            })
            .await
            .unwrap();
    }
    drop(client);

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().get(STALE_HEADER).is_none());
    let fresh: Vec<NodeSnapshot> = response.json().await.unwrap();
    assert_eq!(
        fresh,
        vec![
            NodeSnapshot {
                id: "n1".to_string(),
                files: vec!["/a".to_string(), "/b".to_string()],
            },
            NodeSnapshot {
                id: "n2".to_string(),
                files: vec!["/z".to_string()],
            },
        ]
    );

    storage.stop().await;

    let response = reqwest::get(&url).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get(STALE_HEADER)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
    let cached: Vec<NodeSnapshot> = response.json().await.unwrap();
    assert_eq!(cached, fresh);

    aggregator.stop().await;
}
