//! Storage layer for the mirror map
//!
//! Persists the correspondence between source channel posts and their
//! mirrored copies in the destination group as a JSON document on disk.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use teloxide::types::MessageId;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// On-disk layout of the persistence file
#[derive(Debug, Serialize, Deserialize, Default)]
struct PersistedState {
    /// Source post id -> mirrored message id
    #[serde(default)]
    messages: HashMap<i32, i32>,
}

/// Persisted mapping from source post ids to mirrored message ids.
///
/// Every [`record`](Self::record) is written through to disk before it
/// returns, so a crash never loses an acknowledged mapping. Without a path
/// the map lives in memory only.
pub struct MirrorMap {
    path: Option<PathBuf>,
    entries: Mutex<HashMap<i32, i32>>,
}

impl MirrorMap {
    /// Creates an empty map that is never written to disk
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Loads the map from `path`, starting empty if the file does not exist yet
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<PersistedState>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No mirror map at {}, starting empty", path.display());
                PersistedState::default()
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            "Loaded {} mirrored posts from {}",
            state.messages.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(state.messages),
        })
    }

    /// Returns the mirrored message id for a source post, if any
    pub async fn lookup(&self, source: MessageId) -> Option<MessageId> {
        self.entries.lock().await.get(&source.0).copied().map(MessageId)
    }

    /// Records that `source` was mirrored as `mirrored`. Last write wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be persisted. The in-memory entry
    /// is kept either way.
    pub async fn record(&self, source: MessageId, mirrored: MessageId) -> Result<(), StorageError> {
        self.record_all(&[(source, mirrored)]).await
    }

    /// Records every `(source, mirrored)` pair and persists once.
    ///
    /// All pairs reach the in-memory map before the file is written, so a
    /// failed write never leaves part of a batch unknown to lookups.
    ///
    /// # Errors
    ///
    /// Returns an error if the map cannot be persisted.
    pub async fn record_all(&self, pairs: &[(MessageId, MessageId)]) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        for (source, mirrored) in pairs {
            if let Some(previous) = entries.insert(source.0, mirrored.0) {
                debug!(
                    "Source post {} re-mirrored ({} -> {})",
                    source.0, previous, mirrored.0
                );
            }
        }
        self.persist(&entries).await
    }

    /// Writes the current state to disk
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the file write fails.
    pub async fn save(&self) -> Result<(), StorageError> {
        let entries = self.entries.lock().await;
        self.persist(&entries).await
    }

    /// Number of mirrored posts
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Whether nothing has been mirrored yet
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    async fn persist(&self, entries: &HashMap<i32, i32>) -> Result<(), StorageError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let state = PersistedState {
            messages: entries.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;

        // Write to a sibling file and rename so a crash never leaves a torn file
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
