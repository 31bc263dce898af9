//! In-memory source

use super::{seal_page, SourceReader};
use crate::error::{Error, Result};
use crate::model::{Batch, Cursor, Record};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Source backed by an ordered list of records
///
/// Failures can be queued ahead of time; each queued error is returned by
/// one `fetch` call before normal reads resume.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: Vec<Record>,
    failures: Mutex<VecDeque<Error>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemorySource {
    /// Create a source; records are sorted by position
    pub fn new(mut records: Vec<Record>) -> Self {
        records.sort_by(|a, b| a.position.cmp(&b.position));
        Self {
            records,
            ..Self::default()
        }
    }

    /// Delay every fetch (for timeout handling)
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an error for the next fetch
    pub async fn fail_next(&self, error: Error) {
        self.failures.lock().await.push_back(error);
    }

    /// Number of fetch calls made so far (including failed ones)
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn fetch(&self, after: Option<&Cursor>, limit: usize) -> Result<Batch> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let rows: Vec<Record> = self
            .records
            .iter()
            .filter(|r| after.map_or(true, |a| r.position > *a))
            .take(limit.saturating_add(1))
            .cloned()
            .collect();

        let page = seal_page(rows, limit)?;
        Ok(Batch::from_records(page, after.cloned()))
    }
}
