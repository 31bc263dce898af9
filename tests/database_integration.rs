//! Source integration tests with real PostgreSQL
//!
//! These tests require a live PostgreSQL database.
//! Set POSTGRES_TEST_URL environment variable to run.
//! Set POSTGRES_TEST_TABLE (and POSTGRES_TEST_CURSOR) to also page through
//! a real change table.

use batch_sync::config::{ConnectionConfig, DatabaseEngine, SourceConfig};
use batch_sync::source::{DuckDbSource, SourceReader};
use batch_sync::Cursor;

/// Get test connection string from environment or skip
fn get_test_connection() -> Option<String> {
    std::env::var("POSTGRES_TEST_URL").ok()
}

fn postgres_source(conn_str: String, table: Option<String>, query: Option<String>, cursor: &str) -> SourceConfig {
    SourceConfig {
        engine: DatabaseEngine::Postgres,
        connection: ConnectionConfig {
            connection_string: Some(conn_str),
            ..ConnectionConfig::default()
        },
        table,
        query,
        cursor_column: cursor.to_string(),
        key_column: None,
        action_column: None,
        metadata_prefix: "METADATA$".to_string(),
    }
}

#[test]
fn test_postgres_connection() {
    let Some(conn_str) = get_test_connection() else {
        println!("Skipping: POSTGRES_TEST_URL not set");
        return;
    };

    let config = postgres_source(
        conn_str,
        None,
        Some("SELECT 1 AS seq".to_string()),
        "seq",
    );
    let source = DuckDbSource::open(&config);
    assert!(source.is_ok(), "Failed to open source: {:?}", source.err());

    let source = source.unwrap();
    let check = source.check_connection();
    assert!(check.is_ok(), "Connection check failed: {:?}", check.err());
    assert!(!source.connection_info().contains("password="));

    println!("Connection check passed: {}", source.connection_info());
}

#[tokio::test]
async fn test_postgres_generated_rows_page_in_order() {
    let Some(conn_str) = get_test_connection() else {
        println!("Skipping: POSTGRES_TEST_URL not set");
        return;
    };

    let query = "SELECT generate_series AS seq, 'c-' || CAST(generate_series AS VARCHAR) AS customer_id \
                 FROM generate_series(1, 25)";
    let config = postgres_source(conn_str, None, Some(query.to_string()), "seq");
    let source = DuckDbSource::open(&config).unwrap();

    let mut after: Option<Cursor> = None;
    let mut seen = Vec::new();
    loop {
        let batch = source.fetch(after.as_ref(), 10).await.unwrap();
        if batch.is_empty() {
            break;
        }
        assert!(batch.len() <= 10);
        seen.extend(batch.records.iter().map(|r| r.position.clone()));
        after = batch.next_cursor.clone();
    }

    assert_eq!(seen.len(), 25);
    assert_eq!(seen.first(), Some(&Cursor::Integer(1)));
    assert_eq!(after, Some(Cursor::Integer(25)));
}

#[tokio::test]
async fn test_postgres_change_table() {
    let Some(conn_str) = get_test_connection() else {
        println!("Skipping: POSTGRES_TEST_URL not set");
        return;
    };
    let Ok(table) = std::env::var("POSTGRES_TEST_TABLE") else {
        println!("Skipping: POSTGRES_TEST_TABLE not set");
        return;
    };
    let cursor = std::env::var("POSTGRES_TEST_CURSOR").unwrap_or_else(|_| "id".to_string());

    let config = postgres_source(conn_str, Some(table), None, &cursor);
    let source = DuckDbSource::open(&config).unwrap();
    println!("Columns: {:?}", source.columns());

    let batch = source.fetch(None, 5).await.unwrap();
    println!("First page: {} records", batch.len());

    let positions: Vec<_> = batch.records.iter().map(|r| r.position.clone()).collect();
    let mut sorted = positions.clone();
    sorted.sort();
    assert_eq!(positions, sorted);

    let again = source.fetch(None, 5).await.unwrap();
    assert_eq!(again.len(), batch.len());
}
