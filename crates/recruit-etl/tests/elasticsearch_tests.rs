//! Bulk indexing against a mocked search cluster

use std::time::Duration;

use recruit_etl::error::EtlError;
use recruit_etl::stores::{ElasticsearchIndex, IndexDocument, SearchIndex};
use serde_json::json;
use wiremock::{
    matchers::{body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn documents(n: usize) -> Vec<IndexDocument> {
    (0..n)
        .map(|i| IndexDocument {
            id: format!("doc-{}", i),
            body: json!({ "record_type": "skill_metric", "skill_name": format!("skill-{}", i) }),
        })
        .collect()
}

fn index_for(server: &MockServer) -> ElasticsearchIndex {
    ElasticsearchIndex::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_bulk_index_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .and(header("content-type", "application/x-ndjson"))
        .and(body_string_contains(r#""_index":"recruitment_analytics""#))
        .and(body_string_contains(r#""_id":"doc-2""#))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 3,
            "errors": false,
            "items": []
        })))
        .expect(1)
        .mount(&server)
        .await;

    let indexed = index_for(&server)
        .bulk_index("recruitment_analytics", documents(3))
        .await
        .unwrap();
    assert_eq!(indexed, 3);
}

#[tokio::test]
async fn test_empty_batch_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let indexed = index_for(&server).bulk_index("recruitment_analytics", Vec::new()).await.unwrap();
    assert_eq!(indexed, 0);
}

#[tokio::test]
async fn test_item_errors_fail_the_batch() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "took": 3,
            "errors": true,
            "items": [
                { "index": { "_id": "doc-0", "status": 201 } },
                { "index": { "_id": "doc-1", "status": 429, "error": { "type": "es_rejected_execution_exception", "reason": "queue full" } } }
            ]
        })))
        .mount(&server)
        .await;

    let err = index_for(&server)
        .bulk_index("recruitment_analytics", documents(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::Load(_)));
    assert!(err.message().contains("doc-1"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_server_error_is_a_load_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/_bulk"))
        .respond_with(ResponseTemplate::new(503).set_body_string("cluster_block_exception"))
        .mount(&server)
        .await;

    let err = index_for(&server)
        .bulk_index("recruitment_analytics", documents(1))
        .await
        .unwrap_err();
    assert!(matches!(err, EtlError::Load(_)));
    assert!(err.message().contains("503"));
}

#[tokio::test]
async fn test_unreachable_cluster_is_a_load_error() {
    // Nothing listens on the discard port
    let index = ElasticsearchIndex::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
    let err = index.bulk_index("recruitment_analytics", documents(1)).await.unwrap_err();
    assert!(matches!(err, EtlError::Load(_)));
}
