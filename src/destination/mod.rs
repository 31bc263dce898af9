//! Destination writers
//!
//! A destination applies transformed records with upsert-by-identifier
//! semantics: applying the same batch twice leaves the same end state as
//! applying it once, which is what makes replaying a batch after a retry or
//! a crash safe.
//!
//! - `BatchProfilesWriter` - Batch.com Profiles API
//! - `MemoryDestination` - in-memory upsert map

mod batch_api;
mod memory;

pub use batch_api::BatchProfilesWriter;
pub use memory::MemoryDestination;

use crate::error::Result;
use crate::model::{TransformedRecord, WriteResult};
use async_trait::async_trait;

/// Applies batches of records to the target system
#[async_trait]
pub trait DestinationWriter: Send + Sync {
    /// Apply records, reporting which were written and which were refused
    ///
    /// An `Err` means nothing in the batch can be assumed written.
    async fn apply(&self, records: &[TransformedRecord]) -> Result<WriteResult>;
}

#[cfg(test)]
mod tests;
