//! Error types for batch-sync
//!
//! This module defines the error hierarchy for the whole crate.
//! All public APIs return `Result<T, Error>` where Error is defined here.
//!
//! Every error belongs to one [`ErrorClass`], which decides whether the
//! orchestrator retries it and which exit code the process reports.

use thiserror::Error;

/// The main error type for batch-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Source unavailable: {message}")]
    SourceUnavailable { message: String },

    #[error("Source query failed: {message}")]
    SourceQuery { message: String },

    #[error("Schema mismatch: {message}")]
    Schema { message: String },

    // ============================================================================
    // HTTP / Destination Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    // ============================================================================
    // Data Quality Errors
    // ============================================================================
    #[error("Record '{record_id}' rejected: {message}")]
    DataQuality { record_id: String, message: String },

    #[error("Destination rejected {rejected} record(s), first '{first_id}': {reason}")]
    PartialWrite {
        rejected: usize,
        first_id: String,
        reason: String,
    },

    // ============================================================================
    // Checkpoint Errors
    // ============================================================================
    #[error("Checkpoint error: {message}")]
    Checkpoint { message: String },

    #[error("Checkpoint regression: committed cursor {committed} is ahead of {attempted}")]
    CursorRegression { committed: String, attempted: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Template Errors
    // ============================================================================
    #[error("Undefined variable in template: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

/// Broad classification used for retry decisions and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network hiccups, timeouts, throttling: retried with backoff
    Transient,
    /// Bad configuration, credentials, schema: fail immediately
    Permanent,
    /// A single record could not be transformed or was rejected
    DataQuality,
    /// The durable cursor could not be read or written
    Checkpoint,
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    /// Create an invalid value error
    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a transient source error
    pub fn source_unavailable(message: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            message: message.into(),
        }
    }

    /// Create a permanent source error
    pub fn source_query(message: impl Into<String>) -> Self {
        Self::SourceQuery {
            message: message.into(),
        }
    }

    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a data quality error for one record
    pub fn data_quality(record_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DataQuality {
            record_id: record_id.into(),
            message: message.into(),
        }
    }

    /// Create a checkpoint error
    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Create an undefined variable error
    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    /// Classify this error
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::SourceUnavailable { .. }
            | Error::RateLimited { .. }
            | Error::Timeout { .. }
            | Error::RetriesExhausted { .. } => ErrorClass::Transient,
            Error::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Error::HttpStatus { status, .. } => {
                if is_retryable_status(*status) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            Error::DataQuality { .. } | Error::PartialWrite { .. } => ErrorClass::DataQuality,
            Error::Checkpoint { .. } | Error::CursorRegression { .. } => ErrorClass::Checkpoint,
            _ => ErrorClass::Permanent,
        }
    }

    /// Check if this error is retryable
    ///
    /// `RetriesExhausted` is transient in class but is never retried again.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::RetriesExhausted { .. }) && self.class() == ErrorClass::Transient
    }

    /// Process exit code reported when a run fails with this error
    pub fn exit_code(&self) -> i32 {
        match self.class() {
            ErrorClass::Permanent => exit_code::PERMANENT,
            ErrorClass::Transient => exit_code::TRANSIENT,
            ErrorClass::DataQuality => exit_code::DATA_QUALITY,
            ErrorClass::Checkpoint => exit_code::CHECKPOINT,
        }
    }
}

/// Process exit codes
pub mod exit_code {
    /// Run completed
    pub const SUCCESS: i32 = 0;
    /// Configuration or other permanent failure
    pub const PERMANENT: i32 = 2;
    /// Transient failures outlasted every retry attempt
    pub const TRANSIENT: i32 = 3;
    /// Record-level data problem under the abort policy, or rejected writes
    pub const DATA_QUALITY: i32 = 4;
    /// Checkpoint could not be read or written
    pub const CHECKPOINT: i32 = 5;
    /// Run stopped by an external signal between batches
    pub const CANCELLED: i32 = 130;
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Result type alias for batch-sync
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", message.into(), inner))
        })
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| {
            let inner = e.into();
            Error::Other(format!("{}: {}", f(), inner))
        })
    }
}
