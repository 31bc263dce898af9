//! Checkpoint store implementations
//!
//! `FileCheckpointStore` persists to a JSON file with write-to-temp, fsync
//! and rename, so a crash never leaves a half-written checkpoint behind.

use super::types::State;
use crate::error::{Error, Result};
use crate::model::Cursor;
use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Durable home of the sync cursor
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the last committed cursor; `None` on a first-ever run
    async fn load(&self) -> Result<Option<Cursor>>;

    /// Durably persist a new cursor before returning
    ///
    /// A cursor lower than the one already committed is rejected and the
    /// stored value is left untouched.
    async fn commit(&self, cursor: &Cursor) -> Result<()>;
}

fn check_monotonic(current: Option<&Cursor>, next: &Cursor) -> Result<()> {
    match current {
        Some(committed) if next < committed => Err(Error::CursorRegression {
            committed: committed.to_string(),
            attempted: next.to_string(),
        }),
        _ => Ok(()),
    }
}

// ============================================================================
// File store
// ============================================================================

/// JSON-file checkpoint store keyed by stream name
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    /// Path to the state file
    path: PathBuf,
    /// Stream this store commits for
    stream: String,
    /// Last state known to be on disk
    state: Arc<RwLock<State>>,
}

impl FileCheckpointStore {
    /// Create a store for `stream` backed by `path`
    ///
    /// Nothing is read until [`CheckpointStore::load`] is called.
    pub fn new(path: impl AsRef<Path>, stream: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stream: stream.into(),
            state: Arc::new(RwLock::new(State::new())),
        }
    }

    /// Get the state file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Read the whole state file (all streams)
    pub async fn snapshot(&self) -> Result<State> {
        read_state(&self.path).await
    }

    /// Remove this store's stream from the state file
    pub async fn clear_stream(&self) -> Result<bool> {
        let mut cached = self.state.write().await;
        let mut state = read_state(&self.path).await?;
        let removed = state.streams.remove(&self.stream).is_some();
        if removed {
            write_state(&self.path, &state).await?;
        }
        *cached = state;
        Ok(removed)
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self) -> Result<Option<Cursor>> {
        let loaded = read_state(&self.path).await?;
        let cursor = loaded.get_cursor(&self.stream).cloned();
        *self.state.write().await = loaded;
        Ok(cursor)
    }

    async fn commit(&self, cursor: &Cursor) -> Result<()> {
        let mut cached = self.state.write().await;
        check_monotonic(cached.get_cursor(&self.stream), cursor)?;

        // Other streams may share the file, so merge onto what is on disk.
        let mut next = read_state(&self.path).await?;
        if let Some(on_disk) = next.get_cursor(&self.stream) {
            check_monotonic(Some(on_disk), cursor)?;
        }
        next.record_commit(&self.stream, cursor.clone(), Utc::now());
        write_state(&self.path, &next).await?;

        debug!(stream = %self.stream, cursor = %cursor, "Checkpoint committed");
        *cached = next;
        Ok(())
    }
}

async fn read_state(path: &Path) -> Result<State> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) if contents.trim().is_empty() => Ok(State::new()),
        Ok(contents) => serde_json::from_str(&contents)
            .map_err(|e| Error::checkpoint(format!("Failed to parse state file: {e}"))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(State::new()),
        Err(e) => Err(Error::checkpoint(format!("Failed to read state file: {e}"))),
    }
}

async fn write_state(path: &Path, state: &State) -> Result<()> {
    let contents = serde_json::to_string_pretty(state)
        .map_err(|e| Error::checkpoint(format!("Failed to serialize state: {e}")))?;

    // Write to temp file first, fsync, then rename for atomicity
    let temp_path = path.with_extension("tmp");
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to create state file: {e}")))?;
    file.write_all(contents.as_bytes())
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to write state file: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to sync state file: {e}")))?;
    drop(file);

    tokio::fs::rename(&temp_path, path)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to rename state file: {e}")))?;

    sync_parent_dir(path).await
}

/// Make the rename itself durable
#[cfg(unix)]
pub(super) async fn sync_parent_dir(path: &Path) -> Result<()> {
    let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(());
    };
    let dir = tokio::fs::File::open(parent)
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to open state directory: {e}")))?;
    dir.sync_all()
        .await
        .map_err(|e| Error::checkpoint(format!("Failed to sync state directory: {e}")))
}

#[cfg(not(unix))]
pub(super) async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory checkpoint store
///
/// Useful for one-off runs that should not persist progress, and for tests:
/// loads and commits can be made to fail on demand.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    cursor: Mutex<Option<Cursor>>,
    history: Mutex<Vec<Cursor>>,
    fail_load: AtomicBool,
    fail_commit: AtomicBool,
}

impl MemoryCheckpointStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that already holds a cursor
    pub fn with_cursor(cursor: impl Into<Cursor>) -> Self {
        Self {
            cursor: Mutex::new(Some(cursor.into())),
            ..Self::default()
        }
    }

    /// Make every subsequent load fail
    pub fn fail_loads(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent commit fail
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Currently committed cursor
    pub async fn current(&self) -> Option<Cursor> {
        self.cursor.lock().await.clone()
    }

    /// Every cursor committed so far, in order
    pub async fn history(&self) -> Vec<Cursor> {
        self.history.lock().await.clone()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self) -> Result<Option<Cursor>> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(Error::checkpoint("checkpoint store unavailable"));
        }
        Ok(self.cursor.lock().await.clone())
    }

    async fn commit(&self, cursor: &Cursor) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::checkpoint("checkpoint write failed"));
        }
        let mut current = self.cursor.lock().await;
        check_monotonic(current.as_ref(), cursor)?;
        *current = Some(cursor.clone());
        self.history.lock().await.push(cursor.clone());
        Ok(())
    }
}
