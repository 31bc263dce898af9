//! Job configuration
//!
//! A job file (YAML) describes one stream: where to read it, how to map it,
//! where to write it and how the loop behaves. String values may reference
//! environment variables as `{{ env.NAME }}`, which keeps secrets out of the
//! file itself.
//!
//! ```yaml
//! stream: customers
//! source:
//!   engine: postgres
//!   connection:
//!     connection_string: "{{ env.SOURCE_DATABASE_URL }}"
//!   table: crm.customer_changes
//!   cursor_column: change_seq
//!   key_column: customer_id
//! transform:
//!   id_column: customer_id
//!   date_columns: [signup_date]
//!   url_columns: [avatar]
//! destination:
//!   project_key: "{{ env.BATCH_PROJECT_KEY }}"
//!   credentials_table: batch_api_credentials
//! sync:
//!   batch_size: 1000
//!   on_record_error: skip
//! checkpoint:
//!   path: /var/lib/batch-sync/state.json
//! ```

use crate::engine::SyncConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::template::{self, TemplateContext};
use crate::types::{BackoffType, RecordErrorPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default Batch.com profile update endpoint
pub const DEFAULT_PROFILES_URL: &str = "https://api.batch.com/2.4/profiles/update";

/// Default prefix of change-tracking columns that are never forwarded
pub const DEFAULT_METADATA_PREFIX: &str = "METADATA$";

// ============================================================================
// Top-Level Job Config
// ============================================================================

/// Complete job configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    /// Stream name, used as the checkpoint key
    pub stream: String,

    /// Where records come from
    pub source: SourceConfig,

    /// How records are mapped
    #[serde(default)]
    pub transform: TransformConfig,

    /// Where records go
    pub destination: DestinationConfig,

    /// Loop behavior
    #[serde(default)]
    pub sync: SyncSettings,

    /// Checkpoint persistence
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
}

impl JobConfig {
    /// Load a job file, interpolating `{{ env.* }}` from the process environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read job file {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&contents, &TemplateContext::from_env())
    }

    /// Parse a job definition with an explicit template context
    pub fn from_yaml_str(yaml: &str, context: &TemplateContext) -> Result<Self> {
        let raw: serde_json::Value = serde_yaml::from_str(yaml)?;
        let rendered = template::render_value(&raw, context)?;
        let config: Self = serde_json::from_value(rendered)
            .map_err(|e| Error::config(format!("Invalid job definition: {e}")))?;
        Ok(config)
    }

    /// Check the settings that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.stream.trim().is_empty() {
            return Err(Error::missing_field("stream"));
        }
        self.source.validate()?;
        if self.transform.id_column.trim().is_empty() {
            return Err(Error::missing_field("transform.id_column"));
        }
        self.destination.validate()?;
        if self.sync.batch_size == 0 {
            return Err(Error::invalid_value("sync.batch_size", "must be at least 1"));
        }
        if self.sync.retry.max_attempts == 0 {
            return Err(Error::invalid_value(
                "sync.retry.max_attempts",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Source
// ============================================================================

/// Database engine the source is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    /// PostgreSQL via the DuckDB postgres extension
    #[serde(alias = "postgresql")]
    Postgres,
    /// MySQL / MariaDB via the DuckDB mysql extension
    #[serde(alias = "mariadb")]
    Mysql,
    /// SQLite file via the DuckDB sqlite extension
    Sqlite,
    /// Native DuckDB file
    Duckdb,
}

/// Connection settings; `connection_string` wins over the components
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Full connection string (or file path for SQLite / DuckDB)
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Host name
    #[serde(default)]
    pub host: Option<String>,
    /// Port
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name (or file path for SQLite / DuckDB)
    #[serde(default)]
    pub database: Option<String>,
    /// User name
    #[serde(default)]
    pub user: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
}

/// Change table to read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Engine used to attach the database
    pub engine: DatabaseEngine,

    /// Connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Table to read (schema-qualified or bare)
    #[serde(default)]
    pub table: Option<String>,

    /// Custom query, instead of a table
    #[serde(default)]
    pub query: Option<String>,

    /// Strictly ordered column that drives the cursor
    pub cursor_column: String,

    /// Stable row identifier; defaults to the cursor column
    #[serde(default)]
    pub key_column: Option<String>,

    /// Column holding INSERT/UPDATE/DELETE; ignored when absent from the table
    #[serde(default = "default_action_column")]
    pub action_column: Option<String>,

    /// Columns starting with this prefix are never forwarded
    #[serde(default = "default_metadata_prefix")]
    pub metadata_prefix: String,
}

fn default_action_column() -> Option<String> {
    Some(format!("{DEFAULT_METADATA_PREFIX}ACTION"))
}

fn default_metadata_prefix() -> String {
    DEFAULT_METADATA_PREFIX.to_string()
}

impl SourceConfig {
    fn validate(&self) -> Result<()> {
        match (&self.table, &self.query) {
            (None, None) => Err(Error::config(
                "source must have either 'table' or 'query' defined",
            )),
            (Some(_), Some(_)) => Err(Error::config(
                "source must not define both 'table' and 'query'",
            )),
            _ if self.cursor_column.trim().is_empty() => {
                Err(Error::missing_field("source.cursor_column"))
            }
            _ => Ok(()),
        }
    }
}

// ============================================================================
// Transform
// ============================================================================

/// Profile mapping settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Column holding the destination identifier (matched case-insensitively)
    #[serde(default)]
    pub id_column: String,

    /// Columns sent as `date(<name>)` attributes
    #[serde(default)]
    pub date_columns: Vec<String>,

    /// Columns sent as `url(<name>)` attributes
    #[serde(default)]
    pub url_columns: Vec<String>,
}

// ============================================================================
// Destination
// ============================================================================

/// Batch.com profile API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Profile update endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Batch project key (sent as `X-Batch-Project`)
    pub project_key: String,

    /// REST API key; looked up in `credentials_table` when absent
    #[serde(default)]
    pub api_key: Option<String>,

    /// Source table holding `project_key` / `rest_api_key` rows
    #[serde(default)]
    pub credentials_table: Option<String>,

    /// Records per HTTP request
    #[serde(default = "default_max_records_per_request")]
    pub max_records_per_request: usize,

    /// Request rate ceiling
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_api_url() -> String {
    DEFAULT_PROFILES_URL.to_string()
}

fn default_max_records_per_request() -> usize {
    1000
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl DestinationConfig {
    fn validate(&self) -> Result<()> {
        url::Url::parse(&self.api_url)?;
        if self.project_key.trim().is_empty() {
            return Err(Error::missing_field("destination.project_key"));
        }
        if self.api_key.is_none() && self.credentials_table.is_none() {
            return Err(Error::config(
                "destination needs either 'api_key' or 'credentials_table'",
            ));
        }
        if self.max_records_per_request == 0 {
            return Err(Error::invalid_value(
                "destination.max_records_per_request",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// Sync loop
// ============================================================================

/// Loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Records per batch (one checkpoint per batch)
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Stop after this many batches
    #[serde(default)]
    pub max_batches: Option<usize>,

    /// What to do with a record that cannot be mapped
    #[serde(default)]
    pub on_record_error: RecordErrorPolicy,

    /// Timeout for each source fetch and destination apply, in milliseconds
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,

    /// Retry behavior for transient failures
    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_batch_size() -> usize {
    1000
}

fn default_call_timeout_ms() -> u64 {
    120_000
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batches: None,
            on_record_error: RecordErrorPolicy::default(),
            call_timeout_ms: default_call_timeout_ms(),
            retry: RetrySettings::default(),
        }
    }
}

impl SyncSettings {
    /// Build the orchestrator configuration
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig::new()
            .with_batch_size(self.batch_size)
            .with_max_batches(self.max_batches)
            .with_record_error_policy(self.on_record_error)
            .with_call_timeout(Duration::from_millis(self.call_timeout_ms))
            .with_retry(self.retry.to_policy())
    }
}

/// Retry settings as written in the job file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Backoff shape
    #[serde(default)]
    pub backoff: BackoffType,
    /// First delay in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Delay cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Randomize delays
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffType::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

impl RetrySettings {
    /// Convert to a retry policy
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::default()
            .with_max_attempts(self.max_attempts)
            .with_backoff(
                self.backoff,
                Duration::from_millis(self.initial_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_jitter(self.jitter)
    }
}

// ============================================================================
// Checkpoint
// ============================================================================

/// Where the checkpoint file lives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// State file path
    #[serde(default = "default_checkpoint_path")]
    pub path: PathBuf,
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("batch_sync_state.json")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            path: default_checkpoint_path(),
        }
    }
}
