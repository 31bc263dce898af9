//! Types for the sync engine

use crate::error::{exit_code, Error};
use crate::model::Cursor;
use crate::retry::RetryPolicy;
use crate::types::RecordErrorPolicy;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;

/// Configuration for sync operation
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Records requested per fetch
    pub batch_size: usize,
    /// Stop after this many batches (None = until the source is drained)
    pub max_batches: Option<usize>,
    /// What to do with a record that cannot be transformed
    pub on_record_error: RecordErrorPolicy,
    /// Upper bound for a single source or destination call
    pub call_timeout: Duration,
    /// Retry policy for transient source and destination failures
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_batches: None,
            on_record_error: RecordErrorPolicy::Abort,
            call_timeout: Duration::from_secs(120),
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Create a new sync config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set batch size
    #[must_use]
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    /// Set max batches
    #[must_use]
    pub fn with_max_batches(mut self, max: Option<usize>) -> Self {
        self.max_batches = max;
        self
    }

    /// Set record error policy
    #[must_use]
    pub fn with_record_error_policy(mut self, policy: RecordErrorPolicy) -> Self {
        self.on_record_error = policy;
        self
    }

    /// Set per-call timeout
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Where a run is (or stopped) in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    LoadingCheckpoint,
    Fetching,
    Transforming,
    Writing,
    Committing,
    Done,
    Cancelled,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::LoadingCheckpoint => "loading_checkpoint",
            Self::Fetching => "fetching",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
            Self::Committing => "committing",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    /// Records returned by the source
    pub records_read: usize,
    /// Records confirmed by the destination
    pub records_written: usize,
    /// Records dropped by the transformer on purpose
    pub records_filtered: usize,
    /// Malformed records skipped under the skip policy
    pub records_skipped: usize,
    /// Records the destination refused
    pub records_failed: usize,
    /// Batches whose cursor was committed
    pub batches: usize,
    /// Backoff delays taken before retrying a call
    pub retries: u32,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Set duration
    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_ms = duration.as_millis() as u64;
    }
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// The source was drained or the batch limit was reached
    Completed,
    /// Stopped between batches on request
    Cancelled,
    /// Stopped by an error
    Failed(Error),
}

impl RunOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed => exit_code::SUCCESS,
            Self::Cancelled => exit_code::CANCELLED,
            Self::Failed(e) => e.exit_code(),
        }
    }

    /// Whether the run completed
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Error that stopped the run, if any
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Summary of one run
#[derive(Debug)]
pub struct RunReport {
    /// Stream the run synchronized
    pub stream: String,
    /// Cursor loaded from the checkpoint store
    pub start_cursor: Option<Cursor>,
    /// Last cursor durably committed (equal to `start_cursor` if nothing was)
    pub committed_cursor: Option<Cursor>,
    /// Phase the run ended in; for failures, the phase that failed
    pub phase: RunPhase,
    /// How the run ended
    pub outcome: RunOutcome,
    /// Counters
    pub stats: SyncStats,
}

impl RunReport {
    /// Process exit code for this run
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    /// JSON summary printed at the end of a run
    pub fn to_json(&self) -> Value {
        let status = match &self.outcome {
            RunOutcome::Completed => "completed",
            RunOutcome::Cancelled => "cancelled",
            RunOutcome::Failed(_) => "failed",
        };
        json!({
            "stream": self.stream,
            "status": status,
            "phase": self.phase,
            "start_cursor": self.start_cursor.as_ref().map(Cursor::to_json),
            "committed_cursor": self.committed_cursor.as_ref().map(Cursor::to_json),
            "error": self.outcome.error().map(ToString::to_string),
            "exit_code": self.exit_code(),
            "stats": self.stats,
        })
    }
}
