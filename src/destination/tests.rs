use super::*;
use crate::config::DestinationConfig;
use crate::error::{Error, ErrorClass};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn profile(id: &str, plan: &str) -> TransformedRecord {
    let attributes = json!({ "plan": plan }).as_object().cloned().unwrap_or_default();
    TransformedRecord {
        id: id.to_string(),
        attributes,
    }
}

fn destination_config(server: &MockServer, chunk: usize) -> DestinationConfig {
    DestinationConfig {
        api_url: format!("{}/2.4/profiles/update", server.uri()),
        project_key: "proj-1".to_string(),
        api_key: None,
        credentials_table: None,
        max_records_per_request: chunk,
        requests_per_second: 1000,
        timeout_ms: 2_000,
    }
}

// ============================================================================
// Batch.com writer
// ============================================================================

#[tokio::test]
async fn test_batch_writer_sends_profiles() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/2.4/profiles/update"))
        .and(header("Authorization", "Bearer rest-key"))
        .and(header("X-Batch-Project", "proj-1"))
        .and(body_json(json!([
            { "identifiers": { "custom_id": "c-1" }, "attributes": { "plan": "pro" } },
            { "identifiers": { "custom_id": "c-2" }, "attributes": { "plan": "free" } }
        ])))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({ "token": "abc" })))
        .expect(1)
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 1000), "rest-key").unwrap();
    let result = writer
        .apply(&[profile("c-1", "pro"), profile("c-2", "free")])
        .await
        .unwrap();

    assert_eq!(result.written, ["c-1", "c-2"]);
    assert!(result.is_complete());
}

#[tokio::test]
async fn test_batch_writer_chunks_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(3)
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 2), "rest-key").unwrap();
    let records: Vec<_> = (1..=5).map(|i| profile(&format!("c-{i}"), "pro")).collect();
    let result = writer.apply(&records).await.unwrap();

    assert_eq!(result.written.len(), 5);
}

#[tokio::test]
async fn test_batch_writer_empty_batch_sends_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 10), "rest-key").unwrap();
    assert_eq!(writer.apply(&[]).await.unwrap(), WriteResult::default());
}

#[tokio::test]
async fn test_batch_writer_server_error_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 10), "rest-key").unwrap();
    let err = writer.apply(&[profile("c-1", "pro")]).await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Transient);
}

#[tokio::test]
async fn test_batch_writer_bad_request_is_permanent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid attribute"))
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 10), "rest-key").unwrap();
    let err = writer.apply(&[profile("c-1", "pro")]).await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 400, .. }));
    assert_eq!(err.class(), ErrorClass::Permanent);
}

#[tokio::test]
async fn test_batch_writer_unexpected_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 10), "rest-key").unwrap();
    let err = writer.apply(&[profile("c-1", "pro")]).await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 200, .. }));
}

#[tokio::test]
async fn test_batch_writer_permanent_failure_after_accepted_chunk() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string("too long"))
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 2), "rest-key").unwrap();
    let records: Vec<_> = (1..=5).map(|i| profile(&format!("c-{i}"), "pro")).collect();
    let result = writer.apply(&records).await.unwrap();

    assert_eq!(result.written, ["c-1", "c-2"]);
    let rejected: Vec<_> = result.rejected.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(rejected, ["c-3", "c-4", "c-5"]);
    assert!(result.rejected[0].reason.contains("too long"));
}

#[tokio::test]
async fn test_batch_writer_transient_failure_after_accepted_chunk_fails_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let writer = BatchProfilesWriter::new(&destination_config(&server, 1), "rest-key").unwrap();
    let err = writer
        .apply(&[profile("c-1", "pro"), profile("c-2", "pro")])
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[test]
fn test_batch_writer_requires_api_key() {
    let config = DestinationConfig {
        api_url: "https://api.batch.com/2.4/profiles/update".to_string(),
        project_key: "proj-1".to_string(),
        api_key: None,
        credentials_table: None,
        max_records_per_request: 1000,
        requests_per_second: 1,
        timeout_ms: 30_000,
    };
    let err = BatchProfilesWriter::new(&config, " ").unwrap_err();
    assert!(matches!(err, Error::MissingConfigField { .. }));

    let writer = BatchProfilesWriter::new(&config, "key").unwrap();
    assert_eq!(writer.url(), "https://api.batch.com/2.4/profiles/update");
}

// ============================================================================
// Memory destination
// ============================================================================

#[tokio::test]
async fn test_memory_destination_upserts() {
    let destination = MemoryDestination::new();
    let batch = [profile("c-1", "free"), profile("c-2", "pro")];

    destination.apply(&batch).await.unwrap();
    destination.apply(&batch).await.unwrap();
    destination.apply(&[profile("c-1", "pro")]).await.unwrap();

    let store = destination.snapshot().await;
    assert_eq!(store.len(), 2);
    assert_eq!(store["c-1"].get("plan"), Some(&json!("pro")));
    assert_eq!(destination.apply_count(), 3);
}

#[tokio::test]
async fn test_memory_destination_rejections_and_failures() {
    let destination = MemoryDestination::new();
    destination.reject_id("c-2", "blocked").await;
    destination
        .fail_next(Error::http_status(503, "unavailable"))
        .await;

    let batch = [profile("c-1", "pro"), profile("c-2", "pro")];
    assert!(destination.apply(&batch).await.is_err());

    let result = destination.apply(&batch).await.unwrap();
    assert_eq!(result.written, ["c-1"]);
    assert_eq!(result.rejected[0].reason, "blocked");
    assert!(destination.get("c-2").await.is_none());

    destination.accept_id("c-2").await;
    assert!(destination.apply(&batch).await.unwrap().is_complete());
}
