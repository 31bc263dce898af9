//! Checkpoint module
//!
//! Durable cursor tracking so that a restarted run resumes instead of
//! starting over.
//!
//! # Overview
//!
//! The checkpoint module provides:
//! - `CheckpointStore` - the load/commit contract the orchestrator relies on
//! - `FileCheckpointStore` - JSON file persistence with atomic replace
//! - `MemoryCheckpointStore` - in-memory store for ephemeral runs and tests
//! - `State` - on-disk layout, one entry per stream

mod store;
mod types;

pub use store::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use types::{State, StreamState};
