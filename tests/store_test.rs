//! Integration tests for the OpenSearch store using wiremock
//!
//! The mock server stands in for a single OpenSearch node.

mod common;

use std::time::Duration;

use jurisharvest::models::Record;
use jurisharvest::storage::{
    ensure_index_with_retry, DocumentStore, IndexStatus, OpenSearchStore, StoreError,
};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::store_config_for;

#[tokio::test]
async fn test_existing_index_is_not_recreated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/jurisprudence"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/jurisprudence"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&mock_server)
        .await;

    let store = OpenSearchStore::new(&store_config_for(&mock_server.uri(), "jurisprudence")).unwrap();
    let status = store.ensure_index().await.unwrap();
    assert_eq!(status, IndexStatus::Existing);
}

#[tokio::test]
async fn test_missing_index_is_created_with_mapping() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/decisions"))
        .and(body_partial_json(json!({
            "mappings": { "properties": { "checksum": { "type": "keyword" } } }
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "acknowledged": true, "index": "decisions" })),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = OpenSearchStore::new(&store_config_for(&mock_server.uri(), "decisions")).unwrap();
    let status = store.ensure_index().await.unwrap();
    assert_eq!(status, IndexStatus::Created);
}

#[tokio::test]
async fn test_unacknowledged_creation_is_an_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "acknowledged": false })))
        .mount(&mock_server)
        .await;

    let store = OpenSearchStore::new(&store_config_for(&mock_server.uri(), "decisions")).unwrap();
    let result = store.ensure_index().await;
    assert!(matches!(result, Err(StoreError::NotAcknowledged(index)) if index == "decisions"));
}

/// Index creation fails with a server error once, then succeeds
#[tokio::test]
async fn test_index_creation_is_retried_after_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("cluster not ready"))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/decisions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "acknowledged": true, "index": "decisions" })),
        )
        .mount(&mock_server)
        .await;

    let store = OpenSearchStore::new(&store_config_for(&mock_server.uri(), "decisions")).unwrap();
    let status = tokio::time::timeout(
        Duration::from_secs(5),
        ensure_index_with_retry(&store, Duration::ZERO),
    )
    .await
    .expect("index creation should be retried")
    .unwrap();

    assert_eq!(status, IndexStatus::Created);
    let puts = mock_server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.method.as_str() == "PUT")
        .count();
    assert_eq!(puts, 2);
}

#[tokio::test]
async fn test_rejected_mapping_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/decisions"))
        .respond_with(ResponseTemplate::new(400).set_body_string("mapper_parsing_exception"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = OpenSearchStore::new(&store_config_for(&mock_server.uri(), "decisions")).unwrap();
    let err = ensure_index_with_retry(&store, Duration::ZERO)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Status { status: 400, .. }));
}

#[tokio::test]
async fn test_upsert_uses_document_key() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/jurisprudence/_doc/tjrs-civil-42"))
        .and(body_partial_json(json!({
            "source": "tjrs",
            "document_id": "42",
            "is_enabled": true
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "result": "created" })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store =
        OpenSearchStore::new(&store_config_for(&mock_server.uri(), "jurisprudence")).unwrap();
    let record = Record::new("tjrs", "ruling", "42", "ementa");
    store
        .upsert(&record.document_key("civil"), &record)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_upsert_rejected_by_server() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/jurisprudence/_doc/tjrs-civil-1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&mock_server)
        .await;

    let store =
        OpenSearchStore::new(&store_config_for(&mock_server.uri(), "jurisprudence")).unwrap();
    let record = Record::new("tjrs", "ruling", "1", "ementa");
    let err = store
        .upsert(&record.document_key("civil"), &record)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Status { status: 503, .. }));
    assert!(err.is_recoverable());
}

/// Ping fails once, then the retry loop connects
#[tokio::test]
async fn test_connect_with_retry_survives_failed_ping() {
    let mock_server = MockServer::start().await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("HEAD"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = store_config_for(&mock_server.uri(), "jurisprudence");
    let store = tokio::time::timeout(
        Duration::from_secs(5),
        OpenSearchStore::connect_with_retry(&config),
    )
    .await
    .expect("store should connect after one failed ping");

    assert_eq!(store.index(), "jurisprudence");
    let pings = mock_server.received_requests().await.unwrap();
    assert_eq!(pings.len(), 2);
}
