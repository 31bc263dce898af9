// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::match_wildcard_for_single_variants)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # batch-sync
//!
//! Checkpointed batch synchronization: read a change table in bounded
//! batches, map each row to a customer profile, upsert the profiles into the
//! Batch.com Profiles API and durably record how far the run got, so the
//! next run resumes instead of starting over.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use batch_sync::checkpoint::FileCheckpointStore;
//! use batch_sync::destination::BatchProfilesWriter;
//! use batch_sync::engine::SyncEngine;
//! use batch_sync::source::DuckDbSource;
//! use batch_sync::transform::ProfileTransformer;
//! use batch_sync::{config::JobConfig, Result};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let job = JobConfig::load("jobs/customers.yaml")?;
//!     let key = job.destination.api_key.clone().unwrap_or_default();
//!
//!     let engine = SyncEngine::new(
//!         job.stream.clone(),
//!         Arc::new(DuckDbSource::open(&job.source)?),
//!         Arc::new(ProfileTransformer::new(&job.transform)?),
//!         Arc::new(BatchProfilesWriter::new(&job.destination, &key)?),
//!         Arc::new(FileCheckpointStore::new(&job.checkpoint.path, &job.stream)),
//!     )
//!     .with_config(job.sync.to_sync_config());
//!
//!     let report = engine.run().await;
//!     std::process::exit(report.exit_code());
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                         SyncEngine                               │
//! │  load checkpoint → fetch → transform → write → commit → fetch …  │
//! └──────────────────────────────────────────────────────────────────┘
//!                                 │
//! ┌─────────────┬─────────────────┼───────────────┬──────────────────┐
//! │   Source    │   Transform     │  Destination  │   Checkpoint     │
//! ├─────────────┼─────────────────┼───────────────┼──────────────────┤
//! │ DuckDB      │ Profile mapping │ Batch.com API │ JSON file        │
//! │ (PG/MySQL/  │ date()/url()    │ Rate limit    │ Atomic replace   │
//! │  SQLite)    │ DELETE filter   │ 202 = written │ Monotonic cursor │
//! └─────────────┴─────────────────┴───────────────┴──────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types and exit codes
pub mod error;

/// Common types and type aliases
pub mod types;

/// Cursor, record and batch types
pub mod model;

/// Durable cursor persistence
pub mod checkpoint;

/// Source readers
pub mod source;

/// Record transformation
pub mod transform;

/// Destination writers
pub mod destination;

/// HTTP client with rate limiting
pub mod http;

/// Retry policy with bounded backoff
pub mod retry;

/// Sync orchestration
pub mod engine;

/// Job configuration
pub mod config;

/// Template interpolation
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use engine::{RunOutcome, RunReport, SyncConfig, SyncEngine};
pub use model::{Batch, Cursor, Record, TransformedRecord, WriteResult};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
