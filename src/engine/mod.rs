//! Sync engine module
//!
//! The read / transform / write / commit loop.
//!
//! # Overview
//!
//! A run walks an explicit state machine:
//!
//! ```text
//! LoadingCheckpoint -> Fetching -> Transforming -> Writing -> Committing -+
//!                         ^                                               |
//!                         +-----------------------------------------------+
//! ```
//!
//! The cursor travels through the loop as a value and only advances after
//! the destination confirmed the records it covers. Source and destination
//! calls are bounded by a timeout and retried on transient errors;
//! cancellation is honored between batches.

mod types;

pub use types::{RunOutcome, RunPhase, RunReport, SyncConfig, SyncStats};

use crate::checkpoint::CheckpointStore;
use crate::destination::DestinationWriter;
use crate::error::{Error, ErrorClass, Result};
use crate::model::{Batch, Cursor, TransformedRecord, WriteResult};
use crate::retry::RetryDecision;
use crate::source::SourceReader;
use crate::transform::Transformer;
use crate::types::RecordErrorPolicy;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Next transition of a run
enum Step {
    LoadCheckpoint,
    Fetch,
    Transform(Batch),
    Write(PreparedBatch),
    Commit {
        cursor: Option<Cursor>,
        /// Error to end the run with once the cursor is stored
        then: Option<Error>,
    },
    Fail(RunPhase, Error),
    Done,
}

impl Step {
    fn phase(&self) -> RunPhase {
        match self {
            Self::LoadCheckpoint => RunPhase::LoadingCheckpoint,
            Self::Fetch => RunPhase::Fetching,
            Self::Transform(_) => RunPhase::Transforming,
            Self::Write(_) => RunPhase::Writing,
            Self::Commit { .. } => RunPhase::Committing,
            Self::Fail(phase, _) => *phase,
            Self::Done => RunPhase::Done,
        }
    }
}

/// Fate of one source record within its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Sent to the destination at this index
    Pending(usize),
    /// Dropped by the transformer on purpose
    Filtered,
    /// Malformed and skipped under the skip policy
    Skipped,
}

/// A batch after transformation, waiting to be written
struct PreparedBatch {
    batch: Batch,
    dispositions: Vec<Disposition>,
    records: Vec<TransformedRecord>,
}

/// Mutable state of one run
struct RunState {
    start_cursor: Option<Cursor>,
    cursor: Option<Cursor>,
    stats: SyncStats,
}

/// Sync engine for one stream
pub struct SyncEngine {
    stream: String,
    source: Arc<dyn SourceReader>,
    transformer: Arc<dyn Transformer>,
    destination: Arc<dyn DestinationWriter>,
    checkpoint: Arc<dyn CheckpointStore>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        stream: impl Into<String>,
        source: Arc<dyn SourceReader>,
        transformer: Arc<dyn Transformer>,
        destination: Arc<dyn DestinationWriter>,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            stream: stream.into(),
            source,
            transformer,
            destination,
            checkpoint,
            config: SyncConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Set sync configuration
    #[must_use]
    pub fn with_config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Token that stops the run before its next batch
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Get the sync configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run until the source is drained, the batch limit is hit, the run is
    /// cancelled or an error stops it
    pub async fn run(&self) -> RunReport {
        let started = Instant::now();
        let mut run = RunState {
            start_cursor: None,
            cursor: None,
            stats: SyncStats::new(),
        };

        info!(stream = %self.stream, batch_size = self.config.batch_size, "Starting sync");

        let mut step = Step::LoadCheckpoint;
        let (phase, outcome) = loop {
            let phase = step.phase();
            let next = match step {
                Step::Done => break (RunPhase::Done, RunOutcome::Completed),
                Step::Fail(phase, e) => {
                    error!(stream = %self.stream, phase = %phase, error = %e, "Sync failed");
                    break (phase, RunOutcome::Failed(e));
                }
                Step::Fetch if self.cancel.is_cancelled() => {
                    info!(stream = %self.stream, "Cancellation requested, stopping between batches");
                    break (RunPhase::Cancelled, RunOutcome::Cancelled);
                }
                Step::LoadCheckpoint => self.load_checkpoint(&mut run).await,
                Step::Fetch => self.fetch(&mut run).await,
                Step::Transform(batch) => self.transform(batch, &mut run),
                Step::Write(prepared) => self.write(prepared, &mut run).await,
                Step::Commit { cursor, then } => self.commit(cursor, then, &mut run).await,
            };

            match next {
                Ok(next) => step = next,
                Err(e) => {
                    error!(stream = %self.stream, phase = %phase, error = %e, "Sync failed");
                    break (phase, RunOutcome::Failed(e));
                }
            }
        };

        run.stats.set_duration(started.elapsed());
        let report = RunReport {
            stream: self.stream.clone(),
            start_cursor: run.start_cursor,
            committed_cursor: run.cursor,
            phase,
            outcome,
            stats: run.stats,
        };

        info!(
            stream = %report.stream,
            phase = %report.phase,
            batches = report.stats.batches,
            records_read = report.stats.records_read,
            records_written = report.stats.records_written,
            records_skipped = report.stats.records_skipped,
            records_filtered = report.stats.records_filtered,
            retries = report.stats.retries,
            duration_ms = report.stats.duration_ms,
            "Sync finished"
        );
        report
    }

    async fn load_checkpoint(&self, run: &mut RunState) -> Result<Step> {
        let cursor = self.checkpoint.load().await?;
        match &cursor {
            Some(c) => info!(stream = %self.stream, cursor = %c, "Resuming from checkpoint"),
            None => info!(stream = %self.stream, "No checkpoint, starting from the beginning"),
        }
        run.start_cursor.clone_from(&cursor);
        run.cursor = cursor;
        Ok(Step::Fetch)
    }

    async fn fetch(&self, run: &mut RunState) -> Result<Step> {
        if let Some(max) = self.config.max_batches {
            if run.stats.batches >= max {
                info!(stream = %self.stream, max_batches = max, "Batch limit reached");
                return Ok(Step::Done);
            }
        }

        let after = run.cursor.clone();
        let after_ref = after.as_ref();
        let limit = self.config.batch_size;
        let batch = self
            .call_with_retry("fetch", &mut run.stats, || self.source.fetch(after_ref, limit))
            .await?;

        if batch.is_empty() {
            info!(stream = %self.stream, "Source drained");
            return Ok(Step::Done);
        }

        run.stats.records_read += batch.len();
        debug!(
            stream = %self.stream,
            records = batch.len(),
            next_cursor = ?batch.next_cursor,
            "Fetched batch"
        );
        Ok(Step::Transform(batch))
    }

    fn transform(&self, batch: Batch, run: &mut RunState) -> Result<Step> {
        let mut dispositions = Vec::with_capacity(batch.len());
        let mut records = Vec::with_capacity(batch.len());

        for record in &batch.records {
            match self.transformer.map(record) {
                Ok(Some(mapped)) => {
                    dispositions.push(Disposition::Pending(records.len()));
                    records.push(mapped);
                }
                Ok(None) => {
                    run.stats.records_filtered += 1;
                    dispositions.push(Disposition::Filtered);
                }
                Err(e)
                    if e.class() == ErrorClass::DataQuality
                        && self.config.on_record_error == RecordErrorPolicy::Skip =>
                {
                    warn!(stream = %self.stream, record = %record.id, error = %e, "Skipping malformed record");
                    run.stats.records_skipped += 1;
                    dispositions.push(Disposition::Skipped);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(Step::Write(PreparedBatch {
            batch,
            dispositions,
            records,
        }))
    }

    async fn write(&self, prepared: PreparedBatch, run: &mut RunState) -> Result<Step> {
        let result = if prepared.records.is_empty() {
            WriteResult::default()
        } else {
            let records = prepared.records.as_slice();
            self.call_with_retry("write", &mut run.stats, || self.destination.apply(records))
                .await?
        };

        let (cursor, failure) = settle(&prepared, &result, &mut run.stats);
        if let Some(ref e) = failure {
            warn!(
                stream = %self.stream,
                committed_prefix = ?cursor,
                error = %e,
                "Destination did not accept the whole batch"
            );
        }
        Ok(Step::Commit {
            cursor,
            then: failure,
        })
    }

    async fn commit(
        &self,
        cursor: Option<Cursor>,
        then: Option<Error>,
        run: &mut RunState,
    ) -> Result<Step> {
        if let Some(cursor) = cursor {
            if run.cursor.as_ref() != Some(&cursor) {
                self.checkpoint.commit(&cursor).await?;
                debug!(stream = %self.stream, cursor = %cursor, "Committed checkpoint");
                run.cursor = Some(cursor);
            }
        }

        match then {
            // The write left records unsettled; the settled prefix is stored
            Some(e) => Ok(Step::Fail(RunPhase::Writing, e)),
            None => {
                run.stats.batches += 1;
                Ok(Step::Fetch)
            }
        }
    }

    /// Call a collaborator under the call timeout, retrying transient errors
    async fn call_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        stats: &mut SyncStats,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempts = self.config.retry.start();
        loop {
            let outcome = match tokio::time::timeout(self.config.call_timeout, call()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::Timeout {
                    timeout_ms: self.config.call_timeout.as_millis() as u64,
                }),
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match attempts.on_failure(error) {
                RetryDecision::Retry {
                    retry,
                    delay,
                    error,
                } => {
                    let delay = match error {
                        Error::RateLimited {
                            retry_after_seconds,
                        } => delay.max(Duration::from_secs(retry_after_seconds)),
                        _ => delay,
                    };
                    warn!(
                        stream = %self.stream,
                        operation,
                        retry,
                        max_attempts = self.config.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transient failure, backing off"
                    );
                    stats.retries += 1;
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::Stop(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("stream", &self.stream)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Work out how far the cursor may move after a write
///
/// Walks the batch in order. Written, filtered and skipped records are
/// settled. The cursor may advance to the last settled position strictly
/// below the first unsettled record; records sharing that record's position
/// stay behind so they are read again. Returns the cursor to commit (if it
/// moves) and the error to fail the run with when something was not settled.
fn settle(
    prepared: &PreparedBatch,
    result: &WriteResult,
    stats: &mut SyncStats,
) -> (Option<Cursor>, Option<Error>) {
    let mut first_unsettled = None;
    let mut unsettled = 0;

    for (index, (record, disposition)) in prepared
        .batch
        .records
        .iter()
        .zip(&prepared.dispositions)
        .enumerate()
    {
        let Disposition::Pending(i) = *disposition else {
            continue;
        };
        if result.is_written(&prepared.records[i].id) {
            stats.records_written += 1;
        } else {
            unsettled += 1;
            first_unsettled.get_or_insert((index, record, i));
        }
    }

    let Some((index, blocker, mapped)) = first_unsettled else {
        return (prepared.batch.next_cursor.clone(), None);
    };
    stats.records_failed += unsettled;

    let cursor = prepared.batch.records[..index]
        .iter()
        .rev()
        .find(|r| r.position < blocker.position)
        .map(|r| r.position.clone());

    let id = &prepared.records[mapped].id;
    let reason = result
        .rejected
        .iter()
        .find(|r| &r.id == id)
        .map_or_else(|| "not acknowledged by the destination".to_string(), |r| r.reason.clone());

    let error = Error::PartialWrite {
        rejected: unsettled,
        first_id: id.clone(),
        reason,
    };
    (cursor, Some(error))
}
