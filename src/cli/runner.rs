//! CLI runner - executes commands

use crate::checkpoint::FileCheckpointStore;
use crate::cli::commands::{Cli, Commands, OutputFormat, RunArgs};
use crate::config::JobConfig;
use crate::destination::BatchProfilesWriter;
use crate::engine::SyncEngine;
use crate::error::{exit_code, Error, Result};
use crate::source::DuckDbSource;
use crate::transform::{ProfileTransformer, Transformer};
use crate::types::{split_columns, OptionStringExt};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
    cancel: CancellationToken,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self {
            cli,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop a `run` between batches when this token is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run the CLI command, returning the process exit code
    pub async fn run(&self) -> Result<i32> {
        match &self.cli.command {
            Commands::Run(args) => self.sync(args).await,
            Commands::Check => self.check().await,
            Commands::State => self.state().await,
            Commands::Reset { stream } => self.reset(stream.as_deref()).await,
        }
    }

    /// Load the job definition
    fn load_job(&self) -> Result<JobConfig> {
        let path = self
            .cli
            .job
            .as_ref()
            .ok_or_else(|| Error::config("Job file not specified (use -j flag)"))?;
        JobConfig::load(path)
    }

    /// State file: `--state` wins over the job's checkpoint path
    fn state_path(&self, job: Option<&JobConfig>) -> Result<PathBuf> {
        if let Some(path) = &self.cli.state {
            return Ok(path.clone());
        }
        job.map(|j| j.checkpoint.path.clone())
            .ok_or_else(|| Error::config("State file not specified (use -s or -j flag)"))
    }

    /// Sync the stream
    async fn sync(&self, args: &RunArgs) -> Result<i32> {
        let mut job = self.load_job()?;
        apply_overrides(&mut job, args);
        job.validate()?;

        let source = open_source(&job).await?;
        let transformer = ProfileTransformer::new(&job.transform)?;
        transformer.check_columns(&source.columns())?;

        let api_key = resolve_api_key(&job, &source).await?;
        let destination = BatchProfilesWriter::new(&job.destination, &api_key)?;
        let checkpoint = FileCheckpointStore::new(self.state_path(Some(&job))?, &job.stream);

        info!(
            stream = %job.stream,
            source = %source.connection_info(),
            destination = %destination.url(),
            state = %checkpoint.path().display(),
            "Starting run"
        );

        let engine = SyncEngine::new(
            job.stream.clone(),
            Arc::new(source),
            Arc::new(transformer),
            Arc::new(destination),
            Arc::new(checkpoint),
        )
        .with_config(job.sync.to_sync_config())
        .with_cancellation(self.cancel.clone());

        let report = engine.run().await;
        let mut message = report.to_json();
        if let Some(obj) = message.as_object_mut() {
            obj.insert("type".to_string(), json!("RUN_REPORT"));
        }
        self.output_message(&message);
        Ok(report.exit_code())
    }

    /// Check connection, schema and destination settings
    async fn check(&self) -> Result<i32> {
        let job = self.load_job()?;
        job.validate()?;

        let source = open_source(&job).await?;
        let checked = source.clone();
        tokio::task::spawn_blocking(move || checked.check_connection())
            .await
            .map_err(|e| Error::Other(format!("Connection check task failed: {e}")))??;

        let columns = source.columns();
        let transformer = ProfileTransformer::new(&job.transform)?;
        transformer.check_columns(&columns)?;
        resolve_api_key(&job, &source).await?;

        self.output_message(&json!({
            "type": "CONNECTION_STATUS",
            "connectionStatus": {
                "status": "SUCCEEDED",
                "message": format!(
                    "Source {} reachable, {} columns, destination {}",
                    source.connection_info(),
                    columns.len(),
                    job.destination.api_url
                ),
                "columns": columns,
            }
        }));
        Ok(exit_code::SUCCESS)
    }

    /// Print the checkpoint state file
    async fn state(&self) -> Result<i32> {
        let job = self.cli.job.as_ref().map(|_| self.load_job()).transpose()?;
        let stream = job.as_ref().map(|j| j.stream.clone()).unwrap_or_default();
        let store = FileCheckpointStore::new(self.state_path(job.as_ref())?, stream);

        let state = store.snapshot().await?;
        self.output_message(&json!({
            "type": "STATE",
            "path": store.path().display().to_string(),
            "state": state,
        }));
        Ok(exit_code::SUCCESS)
    }

    /// Clear a stream's checkpoint
    async fn reset(&self, stream: Option<&str>) -> Result<i32> {
        let job = self.cli.job.as_ref().map(|_| self.load_job()).transpose()?;
        let stream = stream
            .map(ToString::to_string)
            .or_else(|| job.as_ref().map(|j| j.stream.clone()))
            .ok_or_else(|| Error::config("Stream not specified (use --stream or -j)"))?;

        let store = FileCheckpointStore::new(self.state_path(job.as_ref())?, &stream);
        let removed = store.clear_stream().await?;
        info!(stream = %stream, removed, "Checkpoint reset");

        self.output_message(&json!({
            "type": "RESET",
            "stream": stream,
            "removed": removed,
        }));
        Ok(exit_code::SUCCESS)
    }

    /// Output a message in the configured format
    fn output_message(&self, msg: &Value) {
        match self.cli.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string(msg).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", serde_json::to_string_pretty(msg).unwrap_or_default());
            }
        }
    }
}

/// Apply `run` flags on top of the job file
pub(crate) fn apply_overrides(job: &mut JobConfig, args: &RunArgs) {
    if let Some(size) = args.batch_size {
        job.sync.batch_size = size;
    }
    if args.max_batches.is_some() {
        job.sync.max_batches = args.max_batches;
    }
    if let Some(policy) = args.on_record_error {
        job.sync.on_record_error = policy;
    }
    if let Some(key) = args.project_key.clone().none_if_empty() {
        job.destination.project_key = key;
    }
    // A different change table is a different stream with its own checkpoint
    if let Some(table) = args.source_stream.clone().none_if_empty() {
        job.stream.clone_from(&table);
        job.source.table = Some(table);
        job.source.query = None;
    }
    if let Some(column) = args.id_column.clone().none_if_empty() {
        job.transform.id_column = column;
    }
    if let Some(columns) = &args.date_columns {
        job.transform.date_columns = split_columns(columns);
    }
    if let Some(columns) = &args.url_columns {
        job.transform.url_columns = split_columns(columns);
    }
    if let Some(table) = args.api_credentials_table.clone().none_if_empty() {
        job.destination.credentials_table = Some(table);
    }
}

/// Attach the source database off the async runtime
async fn open_source(job: &JobConfig) -> Result<DuckDbSource> {
    let config = job.source.clone();
    tokio::task::spawn_blocking(move || DuckDbSource::open(&config))
        .await
        .map_err(|e| Error::Other(format!("Source open task failed: {e}")))?
}

/// API key from the job, or from the credentials table in the source
async fn resolve_api_key(job: &JobConfig, source: &DuckDbSource) -> Result<String> {
    if let Some(key) = job.destination.api_key.clone().none_if_empty() {
        return Ok(key);
    }

    let table = job
        .destination
        .credentials_table
        .clone()
        .ok_or_else(|| Error::missing_field("destination.api_key"))?;
    let project_key = job.destination.project_key.clone();
    info!(project_key = %project_key, table = %table, "Looking up API credentials");

    let source = source.clone();
    let lookup_key = project_key.clone();
    let key = tokio::task::spawn_blocking(move || source.lookup_api_key(&table, &lookup_key))
        .await
        .map_err(|e| Error::Other(format!("Credentials lookup task failed: {e}")))??;

    key.none_if_empty().ok_or_else(|| {
        Error::config(format!(
            "No API credentials found for project key: {project_key}"
        ))
    })
}
