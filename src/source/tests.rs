use super::*;
use crate::config::{ConnectionConfig, DatabaseEngine, SourceConfig};
use crate::error::ErrorClass;
use crate::types::ChangeAction;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::path::Path;
use std::time::Duration;

fn record(id: &str, position: i64) -> Record {
    let mut fields = serde_json::Map::new();
    fields.insert("id".to_string(), json!(id));
    Record::new(id, position, fields)
}

fn ids(batch: &Batch) -> Vec<&str> {
    batch.records.iter().map(|r| r.id.as_str()).collect()
}

// ============================================================================
// Page sealing
// ============================================================================

#[test]
fn test_seal_page_short_page_is_kept() {
    let rows = vec![record("a", 1), record("b", 2)];
    let page = seal_page(rows.clone(), 5).unwrap();
    assert_eq!(page, rows);
}

#[test]
fn test_seal_page_drops_lookahead() {
    let rows = vec![record("a", 1), record("b", 2), record("c", 3)];
    let page = seal_page(rows, 2).unwrap();
    assert_eq!(page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a", "b"]);
}

#[test]
fn test_seal_page_pushes_tied_group_to_next_page() {
    let rows = vec![record("a", 1), record("b", 2), record("c", 2)];
    let page = seal_page(rows, 2).unwrap();
    assert_eq!(page.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), ["a"]);
}

#[test]
fn test_seal_page_rejects_group_larger_than_limit() {
    let rows = vec![record("a", 7), record("b", 7), record("c", 7)];
    let err = seal_page(rows, 2).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Permanent);
    assert!(err.to_string().contains("share cursor value 7"));
}

// ============================================================================
// Memory source
// ============================================================================

#[tokio::test]
async fn test_memory_source_pages_in_order() {
    let source = MemorySource::new(vec![record("c", 3), record("a", 1), record("b", 2)]);

    let first = source.fetch(None, 2).await.unwrap();
    assert_eq!(ids(&first), ["a", "b"]);
    assert_eq!(first.next_cursor, Some(Cursor::Integer(2)));

    let second = source.fetch(first.next_cursor.as_ref(), 2).await.unwrap();
    assert_eq!(ids(&second), ["c"]);
    assert_eq!(second.next_cursor, Some(Cursor::Integer(3)));

    let third = source.fetch(second.next_cursor.as_ref(), 2).await.unwrap();
    assert!(third.is_empty());
    assert_eq!(third.next_cursor, Some(Cursor::Integer(3)));
}

#[tokio::test]
async fn test_memory_source_reads_are_repeatable() {
    let source = MemorySource::new((1..=5).map(|i| record(&format!("r{i}"), i)).collect());
    let after = Cursor::Integer(2);

    let once = source.fetch(Some(&after), 2).await.unwrap();
    let twice = source.fetch(Some(&after), 2).await.unwrap();
    assert_eq!(once, twice);
    assert_eq!(source.fetch_count(), 2);
}

#[tokio::test]
async fn test_memory_source_queued_failure_is_returned_once() {
    let source = MemorySource::new(vec![record("a", 1)]);
    source
        .fail_next(Error::source_unavailable("connection reset"))
        .await;

    let err = source.fetch(None, 10).await.unwrap_err();
    assert!(err.is_retryable());

    let batch = source.fetch(None, 10).await.unwrap();
    assert_eq!(ids(&batch), ["a"]);
}

#[tokio::test(start_paused = true)]
async fn test_memory_source_delay() {
    let source = MemorySource::new(vec![record("a", 1)]).with_delay(Duration::from_secs(5));
    let started = tokio::time::Instant::now();
    source.fetch(None, 10).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(5));
}

// ============================================================================
// DuckDB source
// ============================================================================

fn seed_duckdb(path: &Path) {
    let conn = duckdb::Connection::open(path).unwrap();
    conn.execute_batch(
        r#"
        CREATE TABLE customer_changes (
            change_seq BIGINT,
            Customer_ID VARCHAR,
            email VARCHAR,
            signup DATE,
            "METADATA$ACTION" VARCHAR,
            "METADATA$ISUPDATE" BOOLEAN
        );
        INSERT INTO customer_changes VALUES
            (1, 'c-1', 'one@example.com', DATE '2024-01-01', 'INSERT', false),
            (2, 'c-2', 'two@example.com', NULL, 'INSERT', false),
            (2, 'c-3', 'three@example.com', NULL, 'INSERT', true),
            (3, 'c-1', NULL, NULL, 'DELETE', false);
        CREATE TABLE batch_api_credentials (project_key VARCHAR, REST_API_KEY VARCHAR);
        INSERT INTO batch_api_credentials VALUES ('proj-1', 'secret-1');
        "#,
    )
    .unwrap();
}

fn duckdb_config(path: &Path) -> SourceConfig {
    SourceConfig {
        engine: DatabaseEngine::Duckdb,
        connection: ConnectionConfig {
            database: Some(path.to_string_lossy().into_owned()),
            ..ConnectionConfig::default()
        },
        table: Some("customer_changes".to_string()),
        query: None,
        cursor_column: "change_seq".to_string(),
        key_column: Some("customer_id".to_string()),
        action_column: Some("METADATA$ACTION".to_string()),
        metadata_prefix: "METADATA$".to_string(),
    }
}

#[tokio::test]
async fn test_duckdb_source_reads_change_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crm.duckdb");
    seed_duckdb(&path);

    let source = DuckDbSource::open(&duckdb_config(&path)).unwrap();
    source.check_connection().unwrap();
    assert_eq!(
        source.columns(),
        ["change_seq", "Customer_ID", "email", "signup"]
    );

    let batch = source.fetch(None, 10).await.unwrap();
    assert_eq!(ids(&batch), ["c-1", "c-2", "c-3", "c-1"]);
    assert_eq!(batch.next_cursor, Some(Cursor::Integer(3)));

    let first = &batch.records[0];
    assert_eq!(first.position, Cursor::Integer(1));
    assert_eq!(first.action, ChangeAction::Insert);
    assert_eq!(first.fields.get("signup"), Some(&json!("2024-01-01")));
    assert!(first.fields.keys().all(|k| !k.starts_with("METADATA$")));

    assert_eq!(batch.records[3].action, ChangeAction::Delete);
}

#[tokio::test]
async fn test_duckdb_source_keeps_tied_cursor_values_together() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crm.duckdb");
    seed_duckdb(&path);

    let source = DuckDbSource::open(&duckdb_config(&path)).unwrap();

    // Positions are 1, 2, 2, 3; a page of two would split the pair at 2
    let first = source.fetch(None, 2).await.unwrap();
    assert_eq!(ids(&first), ["c-1"]);
    assert_eq!(first.next_cursor, Some(Cursor::Integer(1)));

    let second = source.fetch(first.next_cursor.as_ref(), 2).await.unwrap();
    assert_eq!(ids(&second), ["c-2", "c-3"]);

    let third = source.fetch(second.next_cursor.as_ref(), 2).await.unwrap();
    assert_eq!(ids(&third), ["c-1"]);

    let done = source.fetch(third.next_cursor.as_ref(), 2).await.unwrap();
    assert!(done.is_empty());
    assert_eq!(done.next_cursor, Some(Cursor::Integer(3)));
}

#[tokio::test]
async fn test_duckdb_source_custom_query() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crm.duckdb");
    seed_duckdb(&path);

    let mut config = duckdb_config(&path);
    config.table = None;
    config.query = Some(
        "SELECT change_seq, Customer_ID, email FROM source_db.main.customer_changes \
         WHERE email IS NOT NULL;"
            .to_string(),
    );
    config.action_column = None;

    let source = DuckDbSource::open(&config).unwrap();
    let batch = source.fetch(Some(&Cursor::Integer(1)), 10).await.unwrap();
    assert_eq!(ids(&batch), ["c-2", "c-3"]);
    assert!(batch.records.iter().all(|r| r.action == ChangeAction::Insert));
}

#[test]
fn test_duckdb_source_missing_cursor_column() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crm.duckdb");
    seed_duckdb(&path);

    let mut config = duckdb_config(&path);
    config.cursor_column = "updated_at".to_string();

    let err = DuckDbSource::open(&config).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
    assert!(err.to_string().contains("updated_at"));
}

#[test]
fn test_duckdb_source_lookup_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crm.duckdb");
    seed_duckdb(&path);

    let source = DuckDbSource::open(&duckdb_config(&path)).unwrap();
    assert_eq!(
        source
            .lookup_api_key("batch_api_credentials", "proj-1")
            .unwrap(),
        Some("secret-1".to_string())
    );
    assert_eq!(
        source
            .lookup_api_key("batch_api_credentials", "other")
            .unwrap(),
        None
    );
}

// ============================================================================
// Non-integer cursor columns
// ============================================================================

fn seed_positions(path: &Path, sql_type: &str, positions: &[&str]) {
    let conn = duckdb::Connection::open(path).unwrap();
    conn.execute_batch(&format!("CREATE TABLE events (id VARCHAR, pos {sql_type});"))
        .unwrap();
    for (i, position) in positions.iter().enumerate() {
        conn.execute(
            &format!("INSERT INTO events VALUES (?, CAST(? AS {sql_type}))"),
            duckdb::params![format!("e{i}"), *position],
        )
        .unwrap();
    }
}

fn events_config(path: &Path) -> SourceConfig {
    SourceConfig {
        engine: DatabaseEngine::Duckdb,
        connection: ConnectionConfig {
            database: Some(path.to_string_lossy().into_owned()),
            ..ConnectionConfig::default()
        },
        table: Some("events".to_string()),
        query: None,
        cursor_column: "pos".to_string(),
        key_column: Some("id".to_string()),
        action_column: None,
        metadata_prefix: "METADATA$".to_string(),
    }
}

/// Page one record at a time, committing every cursor like the engine does
async fn page_through(source: &DuckDbSource) -> Vec<Cursor> {
    let checkpoint = crate::checkpoint::MemoryCheckpointStore::new();
    let mut after = None;
    let mut seen = Vec::new();
    loop {
        let batch = source.fetch(after.as_ref(), 1).await.unwrap();
        if batch.is_empty() {
            break;
        }
        seen.extend(batch.records.iter().map(|r| r.position.clone()));
        let next = batch.next_cursor.unwrap();
        crate::checkpoint::CheckpointStore::commit(&checkpoint, &next)
            .await
            .unwrap();
        after = Some(next);
    }
    seen
}

fn decimal(text: &str) -> Cursor {
    Cursor::from_decimal_str(text).unwrap()
}

#[tokio::test]
async fn test_duckdb_source_double_cursor_pages_numerically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.duckdb");
    seed_positions(&path, "DOUBLE", &["9.5", "10.5", "11.5", "100"]);

    let source = DuckDbSource::open(&events_config(&path)).unwrap();
    let seen = page_through(&source).await;

    assert_eq!(
        seen,
        vec![decimal("9.5"), decimal("10.5"), decimal("11.5"), Cursor::Integer(100)]
    );
}

#[tokio::test]
async fn test_duckdb_source_decimal_cursor_pages_numerically() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.duckdb");
    seed_positions(&path, "DECIMAL(10,2)", &["9.00", "10.00", "10.50", "10.75"]);

    let source = DuckDbSource::open(&events_config(&path)).unwrap();
    let seen = page_through(&source).await;

    assert_eq!(
        seen,
        vec![
            Cursor::Integer(9),
            Cursor::Integer(10),
            decimal("10.5"),
            decimal("10.75")
        ]
    );

    // Resuming after a decimal cursor binds it back exactly
    let rest = source.fetch(Some(&decimal("10.5")), 10).await.unwrap();
    assert_eq!(ids(&rest), ["e3"]);
}

#[tokio::test]
async fn test_duckdb_source_timestamp_cursor() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("events.duckdb");
    seed_positions(
        &path,
        "TIMESTAMP",
        &["2024-01-09 00:00:00", "2024-01-10 08:30:00", "2024-02-01 00:00:00"],
    );

    let source = DuckDbSource::open(&events_config(&path)).unwrap();
    let seen = page_through(&source).await;

    assert_eq!(
        seen,
        vec![
            Cursor::from("2024-01-09T00:00:00.000000Z"),
            Cursor::from("2024-01-10T08:30:00.000000Z"),
            Cursor::from("2024-02-01T00:00:00.000000Z"),
        ]
    );
}
