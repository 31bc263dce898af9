//! CLI module
//!
//! Command-line interface for running sync jobs.
//!
//! # Commands
//!
//! - `run` - Sync the stream, checkpointing after every batch
//! - `check` - Test source connection, schema and destination settings
//! - `state` - Print the checkpoint file
//! - `reset` - Clear a stream's checkpoint

mod commands;
mod runner;

pub use commands::{Cli, Commands, OutputFormat, RunArgs};
pub use runner::Runner;
