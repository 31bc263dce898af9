//! Checkpoint file types
//!
//! These types are serialized to JSON and persisted between runs.

use crate::model::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete checkpoint state for every stream sharing one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Per-stream state
    #[serde(default)]
    pub streams: BTreeMap<String, StreamState>,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state for a stream
    pub fn get_stream(&self, stream: &str) -> Option<&StreamState> {
        self.streams.get(stream)
    }

    /// Get mutable state for a stream, creating if needed
    pub fn get_stream_mut(&mut self, stream: &str) -> &mut StreamState {
        self.streams.entry(stream.to_string()).or_default()
    }

    /// Get cursor for a stream
    pub fn get_cursor(&self, stream: &str) -> Option<&Cursor> {
        self.streams.get(stream)?.cursor.as_ref()
    }

    /// Record a committed cursor for a stream
    pub fn record_commit(&mut self, stream: &str, cursor: Cursor, at: DateTime<Utc>) {
        let entry = self.get_stream_mut(stream);
        entry.cursor = Some(cursor);
        entry.committed_at = Some(at);
        entry.commits += 1;
    }
}

/// State for a single stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamState {
    /// Last committed cursor
    #[serde(default)]
    pub cursor: Option<Cursor>,

    /// When the cursor was last committed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<DateTime<Utc>>,

    /// Number of batches committed over the stream's lifetime
    #[serde(default)]
    pub commits: u64,
}
