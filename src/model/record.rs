//! Record, batch and write-result types

use super::cursor::Cursor;
use crate::types::{ChangeAction, JsonObject};
use serde::{Deserialize, Serialize};

/// A source-shaped unit of data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Stable source identifier
    pub id: String,
    /// Position of this record in the source ordering
    pub position: Cursor,
    /// Change that produced this record
    #[serde(default)]
    pub action: ChangeAction,
    /// Column values (metadata columns already stripped)
    #[serde(default)]
    pub fields: JsonObject,
}

impl Record {
    /// Create an insert record
    pub fn new(id: impl Into<String>, position: impl Into<Cursor>, fields: JsonObject) -> Self {
        Self {
            id: id.into(),
            position: position.into(),
            action: ChangeAction::Insert,
            fields,
        }
    }

    /// Set the change action
    #[must_use]
    pub fn with_action(mut self, action: ChangeAction) -> Self {
        self.action = action;
        self
    }
}

/// An ordered group of records fetched as one unit of progress
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    /// Records in source order
    pub records: Vec<Record>,
    /// Cursor after fully consuming this batch
    pub next_cursor: Option<Cursor>,
}

impl Batch {
    /// Empty batch that leaves the cursor where it was
    pub fn empty(after: Option<Cursor>) -> Self {
        Self {
            records: Vec::new(),
            next_cursor: after,
        }
    }

    /// Batch whose next cursor is the position of its last record
    pub fn from_records(records: Vec<Record>, after: Option<Cursor>) -> Self {
        let next_cursor = records.last().map(|r| r.position.clone()).or(after);
        Self {
            records,
            next_cursor,
        }
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the source had nothing more to give
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A destination-shaped record ready to be applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedRecord {
    /// Destination identifier the write is keyed by
    pub id: String,
    /// Attributes to upsert
    pub attributes: JsonObject,
}

/// A record the destination refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Destination identifier
    pub id: String,
    /// Reason reported by the destination
    pub reason: String,
}

/// Outcome of applying a batch to the destination
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteResult {
    /// Identifiers confirmed as written
    pub written: Vec<String>,
    /// Identifiers the destination refused
    pub rejected: Vec<Rejection>,
}

impl WriteResult {
    /// Every record of the batch was written
    pub fn all_written(records: &[TransformedRecord]) -> Self {
        Self {
            written: records.iter().map(|r| r.id.clone()).collect(),
            rejected: Vec::new(),
        }
    }

    /// Mark a record as rejected
    pub fn reject(&mut self, id: impl Into<String>, reason: impl Into<String>) {
        self.rejected.push(Rejection {
            id: id.into(),
            reason: reason.into(),
        });
    }

    /// Whether nothing was rejected
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }

    /// Whether a given identifier was confirmed written
    pub fn is_written(&self, id: &str) -> bool {
        self.written.iter().any(|w| w == id) && !self.rejected.iter().any(|r| r.id == id)
    }
}
