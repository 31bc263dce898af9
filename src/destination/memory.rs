//! In-memory destination

use super::DestinationWriter;
use crate::error::{Error, Result};
use crate::model::{TransformedRecord, WriteResult};
use crate::types::JsonObject;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Destination that upserts attributes into a map keyed by identifier
///
/// Queued errors fail whole `apply` calls; rejected identifiers are refused
/// individually while the rest of the batch is written.
#[derive(Debug, Default)]
pub struct MemoryDestination {
    profiles: Mutex<HashMap<String, JsonObject>>,
    failures: Mutex<VecDeque<Error>>,
    rejections: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
    applies: AtomicUsize,
}

impl MemoryDestination {
    /// Create an empty destination
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every apply (for timeout handling)
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queue an error for the next apply
    pub async fn fail_next(&self, error: Error) {
        self.failures.lock().await.push_back(error);
    }

    /// Refuse every write for an identifier
    pub async fn reject_id(&self, id: impl Into<String>, reason: impl Into<String>) {
        self.rejections.lock().await.insert(id.into(), reason.into());
    }

    /// Stop refusing an identifier
    pub async fn accept_id(&self, id: &str) {
        self.rejections.lock().await.remove(id);
    }

    /// Number of apply calls made so far (including failed ones)
    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    /// Current attributes for an identifier
    pub async fn get(&self, id: &str) -> Option<JsonObject> {
        self.profiles.lock().await.get(id).cloned()
    }

    /// Copy of the whole store
    pub async fn snapshot(&self) -> HashMap<String, JsonObject> {
        self.profiles.lock().await.clone()
    }
}

#[async_trait]
impl DestinationWriter for MemoryDestination {
    async fn apply(&self, records: &[TransformedRecord]) -> Result<WriteResult> {
        self.applies.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let rejections = self.rejections.lock().await;
        let mut profiles = self.profiles.lock().await;
        let mut result = WriteResult::default();

        for record in records {
            if let Some(reason) = rejections.get(&record.id) {
                result.reject(record.id.clone(), reason.clone());
                continue;
            }
            let profile = profiles.entry(record.id.clone()).or_default();
            for (name, value) in &record.attributes {
                profile.insert(name.clone(), value.clone());
            }
            result.written.push(record.id.clone());
        }

        Ok(result)
    }
}
