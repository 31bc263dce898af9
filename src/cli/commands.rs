//! CLI commands and argument parsing

use crate::types::RecordErrorPolicy;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Checkpointed batch sync from a change table into Batch.com profiles
#[derive(Parser, Debug)]
#[command(name = "batch-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Job definition file (YAML)
    #[arg(short, long, global = true)]
    pub job: Option<PathBuf>,

    /// Checkpoint state file (JSON), overrides the job's checkpoint path
    #[arg(short, long, global = true)]
    pub state: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, default_value = "json")]
    pub format: OutputFormat,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync the stream until the source is drained
    Run(RunArgs),

    /// Test the source connection, schema and destination settings
    Check,

    /// Print the checkpoint state
    State,

    /// Clear a stream's checkpoint so the next run starts over
    Reset {
        /// Stream to clear (defaults to the job's stream)
        #[arg(long)]
        stream: Option<String>,
    },
}

/// Overrides accepted by `run`
#[derive(clap::Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Records per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Stop after this many batches
    #[arg(long)]
    pub max_batches: Option<usize>,

    /// What to do with a record that cannot be mapped
    #[arg(long, value_enum)]
    pub on_record_error: Option<RecordErrorPolicy>,

    /// Batch project key
    #[arg(long)]
    pub project_key: Option<String>,

    /// Source change table (format: SCHEMA.TABLE)
    #[arg(long)]
    pub source_stream: Option<String>,

    /// Column to use as the custom ID
    #[arg(long)]
    pub id_column: Option<String>,

    /// Comma-separated list of date columns
    #[arg(long)]
    pub date_columns: Option<String>,

    /// Comma-separated list of URL columns
    #[arg(long)]
    pub url_columns: Option<String>,

    /// Table containing API credentials
    #[arg(long)]
    pub api_credentials_table: Option<String>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output (one message per line)
    Json,
    /// Human-readable output
    Pretty,
}
