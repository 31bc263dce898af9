//! DuckDB-backed change table reader
//!
//! Attaches PostgreSQL, MySQL, SQLite or DuckDB databases read-only through
//! DuckDB extensions and pages through a change table with keyset
//! pagination on the cursor column.

use super::{seal_page, SourceReader};
use crate::config::{ConnectionConfig, DatabaseEngine, SourceConfig};
use crate::error::{Error, Result};
use crate::model::{Batch, Cursor, Record};
use crate::types::{ChangeAction, JsonObject};
use async_trait::async_trait;
use duckdb::types::{TimeUnit, Value as DuckValue};
use duckdb::Connection;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Source reading a change table through DuckDB
#[derive(Clone)]
pub struct DuckDbSource {
    inner: Arc<Inner>,
}

struct Inner {
    /// DuckDB connection
    conn: Mutex<Connection>,
    /// Engine the source database is attached with
    engine: DatabaseEngine,
    /// Connection string used (for logging)
    connection_string: String,
    /// Query every page is cut from
    base_query: String,
    /// Output columns of the base query, in order
    columns: Vec<String>,
    cursor_column: String,
    /// SQL type of the cursor column, used to bind decimal cursors
    cursor_type: String,
    key_column: String,
    action_column: Option<String>,
    metadata_prefix: String,
}

impl DuckDbSource {
    /// Attach the source database and resolve the configured columns
    pub fn open(config: &SourceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::config(format!("Failed to create DuckDB connection: {e}")))?;

        let connection_string = build_connection_string(config.engine, &config.connection);
        attach_database(&conn, config.engine, &connection_string)?;

        let base_query = build_base_query(config)?;
        let described = describe_columns(&conn, &base_query)?;
        let columns: Vec<String> = described.iter().map(|(name, _)| name.clone()).collect();

        let cursor_column = resolve_column(&columns, &config.cursor_column).ok_or_else(|| {
            Error::schema(format!(
                "cursor column '{}' not found in source columns: {}",
                config.cursor_column,
                columns.join(", ")
            ))
        })?;
        let cursor_type = described
            .iter()
            .find(|(name, _)| *name == cursor_column)
            .map(|(_, sql_type)| sql_type.clone())
            .unwrap_or_default();
        let key_column = match &config.key_column {
            Some(key) => resolve_column(&columns, key).ok_or_else(|| {
                Error::schema(format!("key column '{key}' not found in source columns"))
            })?,
            None => cursor_column.clone(),
        };
        let action_column = config
            .action_column
            .as_deref()
            .and_then(|name| resolve_column(&columns, name));

        let source = Self {
            inner: Arc::new(Inner {
                conn: Mutex::new(conn),
                engine: config.engine,
                connection_string,
                base_query,
                columns,
                cursor_column,
                cursor_type,
                key_column,
                action_column,
                metadata_prefix: config.metadata_prefix.clone(),
            }),
        };
        info!(
            source = %source.connection_info(),
            columns = source.inner.columns.len(),
            "Attached source database"
        );
        Ok(source)
    }

    /// Columns forwarded to the transformer (metadata columns excluded)
    pub fn columns(&self) -> Vec<String> {
        self.inner
            .columns
            .iter()
            .filter(|c| !self.inner.is_hidden(c))
            .cloned()
            .collect()
    }

    /// Test the attached database
    pub fn check_connection(&self) -> Result<()> {
        let query = match self.inner.engine {
            DatabaseEngine::Postgres => "SELECT 1 FROM source_db.pg_catalog.pg_tables LIMIT 1",
            DatabaseEngine::Mysql => "SELECT 1 FROM source_db.information_schema.tables LIMIT 1",
            DatabaseEngine::Sqlite => "SELECT 1 FROM source_db.sqlite_master LIMIT 1",
            DatabaseEngine::Duckdb => "SELECT 1",
        };

        let conn = self.inner.lock()?;
        conn.execute(query, [])
            .map_err(|e| Error::source_unavailable(format!("Connection check failed: {e}")))?;
        Ok(())
    }

    /// Look up the REST API key for a project in a credentials table
    ///
    /// The table needs `project_key` and `rest_api_key` columns.
    pub fn lookup_api_key(&self, table: &str, project_key: &str) -> Result<Option<String>> {
        let table = qualify_table(self.inner.engine, &self.inner.connection_string, table);
        let sql = format!("SELECT rest_api_key FROM {table} WHERE project_key = ? LIMIT 1");

        let conn = self.inner.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(|e| {
            Error::config(format!("Failed to query credentials table {table}: {e}"))
        })?;
        let mut rows = stmt
            .query(duckdb::params![project_key])
            .map_err(|e| Error::source_unavailable(format!("Credentials lookup failed: {e}")))?;

        match rows
            .next()
            .map_err(|e| Error::source_unavailable(format!("Credentials lookup failed: {e}")))?
        {
            Some(row) => {
                let value: DuckValue = row
                    .get(0)
                    .map_err(|e| Error::config(format!("Unreadable API key: {e}")))?;
                Ok(duckdb_value_to_string(value))
            }
            None => Ok(None),
        }
    }

    /// Get connection string (for logging - password masked)
    pub fn connection_info(&self) -> String {
        mask_password(&self.inner.connection_string)
    }
}

impl std::fmt::Debug for DuckDbSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbSource")
            .field("engine", &self.inner.engine)
            .field("connection", &self.connection_info())
            .field("cursor_column", &self.inner.cursor_column)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SourceReader for DuckDbSource {
    async fn fetch(&self, after: Option<&Cursor>, limit: usize) -> Result<Batch> {
        let inner = Arc::clone(&self.inner);
        let after = after.cloned();
        tokio::task::spawn_blocking(move || inner.fetch_page(after, limit))
            .await
            .map_err(|e| Error::Other(format!("Source read task failed: {e}")))?
    }
}

impl Inner {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("DuckDB connection lock poisoned".to_string()))
    }

    fn is_hidden(&self, column: &str) -> bool {
        let prefix = &self.metadata_prefix;
        (!prefix.is_empty()
            && column.len() >= prefix.len()
            && column[..prefix.len()].eq_ignore_ascii_case(prefix))
            || self.action_column.as_deref() == Some(column)
    }

    fn page_query(&self, after: Option<&Cursor>, limit: usize) -> String {
        let select = self
            .columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let cursor = quote_ident(&self.cursor_column);
        let key = quote_ident(&self.key_column);
        let filter = match after {
            None => String::new(),
            // Decimal text is cast back so the comparison stays numeric and exact
            Some(Cursor::Decimal(_)) if !self.cursor_type.is_empty() => {
                format!(" WHERE {cursor} > CAST(? AS {})", self.cursor_type)
            }
            Some(_) => format!(" WHERE {cursor} > ?"),
        };
        // One extra row tells whether the page ends inside a group of equal cursors
        format!(
            "SELECT {select} FROM ({}) AS src{filter} ORDER BY {cursor} ASC, {key} ASC LIMIT {}",
            self.base_query,
            limit.saturating_add(1)
        )
    }

    fn fetch_page(&self, after: Option<Cursor>, limit: usize) -> Result<Batch> {
        let query = self.page_query(after.as_ref(), limit);
        debug!("Executing page query: {}", query);

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&query)
            .map_err(|e| Error::source_query(format!("Failed to prepare page query: {e}")))?;

        let mut rows = match &after {
            Some(cursor) => stmt.query(duckdb::params![cursor_param(cursor)]),
            None => stmt.query([]),
        }
        .map_err(|e| Error::source_unavailable(format!("Page query failed: {e}")))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|e| Error::source_unavailable(format!("Failed to read row: {e}")))?
        {
            let mut values = JsonObject::new();
            let mut position = None;
            for (i, name) in self.columns.iter().enumerate() {
                let value: DuckValue = row
                    .get(i)
                    .map_err(|e| Error::source_query(format!("Failed to read {name}: {e}")))?;
                if *name == self.cursor_column {
                    position = duckdb_value_to_cursor(&value);
                }
                values.insert(name.clone(), duckdb_value_to_json(value));
            }
            records.push(self.to_record(position, values)?);
        }

        let page = seal_page(records, limit)?;
        Ok(Batch::from_records(page, after))
    }

    fn to_record(&self, position: Option<Cursor>, mut values: JsonObject) -> Result<Record> {
        let position = position.ok_or_else(|| {
            Error::schema(format!(
                "cursor column '{}' must not be null",
                self.cursor_column
            ))
        })?;
        let id = values
            .get(&self.key_column)
            .map(json_to_id)
            .unwrap_or_default();
        let action = self
            .action_column
            .as_ref()
            .and_then(|c| values.get(c))
            .and_then(Value::as_str)
            .map_or(ChangeAction::Insert, ChangeAction::parse);

        values.retain(|column, _| !self.is_hidden(column));

        Ok(Record {
            id,
            position,
            action,
            fields: values,
        })
    }
}

/// Build connection string from config
fn build_connection_string(engine: DatabaseEngine, connection: &ConnectionConfig) -> String {
    if let Some(ref conn_str) = connection.connection_string {
        return conn_str.clone();
    }

    let host = connection.host.as_deref().unwrap_or("localhost");
    let user = connection.user.as_deref().unwrap_or("postgres");
    let password = connection.password.as_deref().unwrap_or_default();
    let database = connection.database.as_deref().unwrap_or("postgres");

    let port = connection.port.unwrap_or(match engine {
        DatabaseEngine::Postgres => 5432,
        DatabaseEngine::Mysql => 3306,
        DatabaseEngine::Sqlite | DatabaseEngine::Duckdb => 0,
    });

    match engine {
        DatabaseEngine::Postgres => {
            format!("postgresql://{user}:{password}@{host}:{port}/{database}")
        }
        DatabaseEngine::Mysql => format!("mysql://{user}:{password}@{host}:{port}/{database}"),
        // File-based engines use the database as a path
        DatabaseEngine::Sqlite | DatabaseEngine::Duckdb => connection
            .database
            .clone()
            .unwrap_or_else(|| ":memory:".to_string()),
    }
}

/// Attach external database to DuckDB
fn attach_database(conn: &Connection, engine: DatabaseEngine, connection_string: &str) -> Result<()> {
    let escaped = connection_string.replace('\'', "''");
    let (extension, attach_sql) = match engine {
        DatabaseEngine::Postgres => (
            Some("postgres"),
            format!("ATTACH '{escaped}' AS source_db (TYPE POSTGRES, READ_ONLY);"),
        ),
        DatabaseEngine::Mysql => (
            Some("mysql"),
            format!("ATTACH '{escaped}' AS source_db (TYPE MYSQL, READ_ONLY);"),
        ),
        DatabaseEngine::Sqlite => (
            Some("sqlite"),
            format!("ATTACH '{escaped}' AS source_db (TYPE SQLITE, READ_ONLY);"),
        ),
        DatabaseEngine::Duckdb if connection_string == ":memory:" => return Ok(()),
        DatabaseEngine::Duckdb => (
            None,
            format!("ATTACH '{escaped}' AS source_db (READ_ONLY);"),
        ),
    };

    if let Some(extension) = extension {
        conn.execute_batch(&format!("INSTALL {extension}; LOAD {extension};"))
            .map_err(|e| Error::config(format!("Failed to load {extension} extension: {e}")))?;
    }
    conn.execute_batch(&attach_sql)
        .map_err(|e| Error::source_unavailable(format!("Failed to attach source database: {e}")))?;

    Ok(())
}

/// Qualify a table name with the attached catalog
fn qualify_table(engine: DatabaseEngine, connection_string: &str, table: &str) -> String {
    if engine == DatabaseEngine::Duckdb && connection_string == ":memory:" {
        return table.to_string();
    }
    if table.contains('.') {
        return format!("source_db.{table}");
    }
    match engine {
        DatabaseEngine::Postgres => format!("source_db.public.{table}"),
        DatabaseEngine::Duckdb => format!("source_db.main.{table}"),
        DatabaseEngine::Mysql | DatabaseEngine::Sqlite => format!("source_db.{table}"),
    }
}

/// Build the base SQL query for the change table
fn build_base_query(config: &SourceConfig) -> Result<String> {
    if let Some(ref query) = config.query {
        Ok(query.trim().trim_end_matches(';').to_string())
    } else if let Some(ref table) = config.table {
        let connection_string = build_connection_string(config.engine, &config.connection);
        Ok(format!(
            "SELECT * FROM {}",
            qualify_table(config.engine, &connection_string, table)
        ))
    } else {
        Err(Error::config(
            "source must have either 'table' or 'query' defined",
        ))
    }
}

/// Output column names and SQL types of a query
fn describe_columns(conn: &Connection, query: &str) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare(&format!("DESCRIBE {query}"))
        .map_err(|e| Error::source_query(format!("Failed to describe source query: {e}")))?;

    let columns: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| Error::source_unavailable(format!("Failed to describe source: {e}")))?
        .filter_map(std::result::Result::ok)
        .collect();

    if columns.is_empty() {
        return Err(Error::schema("source query returns no columns"));
    }
    Ok(columns)
}

/// Find a column by case-insensitive name, returning its exact spelling
pub(crate) fn resolve_column(columns: &[String], name: &str) -> Option<String> {
    columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .cloned()
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn cursor_param(cursor: &Cursor) -> DuckValue {
    match cursor {
        Cursor::Integer(i) => DuckValue::BigInt(*i),
        Cursor::Decimal(d) => DuckValue::Text(d.as_str().to_string()),
        Cursor::Text(s) => DuckValue::Text(s.clone()),
    }
}

/// Cursor for a cursor-column value, ordered the way DuckDB sorts it
fn duckdb_value_to_cursor(value: &DuckValue) -> Option<Cursor> {
    match value {
        DuckValue::Decimal(d) => Cursor::from_decimal_str(&d.to_string()),
        DuckValue::HugeInt(i) => Cursor::from_decimal_str(&i.to_string()),
        DuckValue::UBigInt(u) => Cursor::from_decimal_str(&u.to_string()),
        DuckValue::Float(f) => Cursor::from_f64(f64::from(*f)),
        DuckValue::Double(f) => Cursor::from_f64(*f),
        other => Cursor::from_json(&duckdb_value_to_json(other.clone())),
    }
}

fn json_to_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn mask_password(connection_string: &str) -> String {
    if let Some(at_pos) = connection_string.find('@') {
        if let Some(colon_pos) = connection_string[..at_pos].rfind(':') {
            let before_pass = &connection_string[..=colon_pos];
            let after_at = &connection_string[at_pos..];
            if !before_pass.ends_with("//:") && !before_pass.ends_with("://") {
                return format!("{before_pass}****{after_at}");
            }
        }
    }
    connection_string.to_string()
}

fn timestamp_micros(unit: TimeUnit, value: i64) -> i64 {
    match unit {
        TimeUnit::Second => value.saturating_mul(1_000_000),
        TimeUnit::Millisecond => value.saturating_mul(1_000),
        TimeUnit::Microsecond => value,
        TimeUnit::Nanosecond => value / 1_000,
    }
}

fn format_timestamp(micros: i64) -> Option<String> {
    let secs = micros.div_euclid(1_000_000);
    let nsecs = (micros.rem_euclid(1_000_000) * 1000) as u32;
    chrono::DateTime::from_timestamp(secs, nsecs)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string())
}

fn format_date(days: i32) -> Option<String> {
    // 719163 is the number of days from 1 CE to 1970-01-01
    chrono::NaiveDate::from_num_days_from_ce_opt(days + 719_163)
        .map(|date| date.format("%Y-%m-%d").to_string())
}

/// Convert DuckDB Value to JSON Value
fn duckdb_value_to_json(value: DuckValue) -> Value {
    match value {
        DuckValue::Null => Value::Null,
        DuckValue::Boolean(b) => Value::Bool(b),
        DuckValue::TinyInt(i) => Value::Number(i.into()),
        DuckValue::SmallInt(i) => Value::Number(i.into()),
        DuckValue::Int(i) => Value::Number(i.into()),
        DuckValue::BigInt(i) => Value::Number(i.into()),
        DuckValue::HugeInt(i) => Value::String(i.to_string()),
        DuckValue::UTinyInt(i) => Value::Number(i.into()),
        DuckValue::USmallInt(i) => Value::Number(i.into()),
        DuckValue::UInt(i) => Value::Number(i.into()),
        DuckValue::UBigInt(i) => Value::Number(i.into()),
        DuckValue::Float(f) => {
            serde_json::Number::from_f64(f64::from(f)).map_or(Value::Null, Value::Number)
        }
        DuckValue::Double(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        DuckValue::Decimal(d) => Value::String(d.to_string()),
        DuckValue::Text(s) | DuckValue::Enum(s) => Value::String(s),
        DuckValue::Blob(b) => Value::String(base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            b,
        )),
        DuckValue::Timestamp(unit, i) => {
            format_timestamp(timestamp_micros(unit, i)).map_or(Value::Number(i.into()), Value::String)
        }
        DuckValue::Date32(d) => format_date(d).map_or(Value::Number(d.into()), Value::String),
        DuckValue::Time64(unit, t) => {
            // Microseconds since midnight
            let micros = timestamp_micros(unit, t);
            let secs = micros / 1_000_000;
            Value::String(format!(
                "{:02}:{:02}:{:02}.{:06}",
                secs / 3600,
                (secs % 3600) / 60,
                secs % 60,
                micros % 1_000_000
            ))
        }
        DuckValue::List(items) => Value::Array(items.into_iter().map(duckdb_value_to_json).collect()),
        other => Value::String(format!("{other:?}")),
    }
}

/// Convert DuckDB Value to String (credentials lookups)
fn duckdb_value_to_string(value: DuckValue) -> Option<String> {
    match duckdb_value_to_json(value) {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}
