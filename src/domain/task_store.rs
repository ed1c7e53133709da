//! TaskStore: persistence adapter for the scheduled task list.
//!
//! The list is always written whole; there are no partial updates. The file
//! backend wraps it in a SHA-256 checksummed envelope and writes it
//! atomically (temp file + rename) under a write lock.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::warn;

use super::error::PersistenceError;
use super::task::ScheduledTask;

/// Durable storage for the scheduler's task list.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Load every persisted task. An absent store yields an empty list.
    async fn load_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError>;

    /// Replace the persisted list with `tasks`.
    async fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), PersistenceError>;
}

/// On-disk envelope: the list plus integrity metadata.
#[derive(Debug, Serialize, Deserialize)]
struct Stored<T> {
    /// SHA-256 of the serialized `items` array: "sha256:<hex>"
    checksum: String,
    saved_at: DateTime<Utc>,
    items: Vec<T>,
}

impl<T: Serialize + Clone> Stored<T> {
    fn new(items: &[T]) -> Result<Self, PersistenceError> {
        Ok(Self {
            checksum: checksum(items)?,
            saved_at: Utc::now(),
            items: items.to_vec(),
        })
    }

    fn verify(&self) -> bool {
        checksum(&self.items)
            .map(|expected| expected == self.checksum)
            .unwrap_or(false)
    }
}

fn checksum<T: Serialize>(items: &[T]) -> Result<String, PersistenceError> {
    let serialized = serde_json::to_string(items)?;
    Ok(format!("sha256:{:x}", Sha256::digest(serialized.as_bytes())))
}

/// A list persisted as one checksummed JSON file. Shared by the task and
/// comparison-schedule file backends.
pub(crate) struct ChecksummedFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ChecksummedFile {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    /// A missing file is an empty list.
    pub(crate) async fn load<T>(&self) -> Result<Vec<T>, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };

        let stored: Stored<T> =
            serde_json::from_str(&content).map_err(|e| PersistenceError::Corrupt {
                path: self.path.display().to_string(),
                reason: e.to_string(),
            })?;

        if !stored.verify() {
            warn!(path = %self.path.display(), "store checksum mismatch");
            return Err(PersistenceError::Corrupt {
                path: self.path.display().to_string(),
                reason: "checksum mismatch".to_string(),
            });
        }

        Ok(stored.items)
    }

    pub(crate) async fn save<T>(&self, items: &[T]) -> Result<(), PersistenceError>
    where
        T: Serialize + Clone,
    {
        let _guard = self.write_lock.lock().await;

        let content = serde_json::to_string_pretty(&Stored::new(items)?)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(parent, e))?;
        }

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|e| self.io_error(&tmp_path, e))?;

        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_error(&self.path, e))?;

        Ok(())
    }
}

/// JSON file backend.
pub struct FileTaskStore {
    file: ChecksummedFile,
}

impl FileTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: ChecksummedFile::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[async_trait]
impl TaskStore for FileTaskStore {
    async fn load_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError> {
        self.file.load().await
    }

    async fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), PersistenceError> {
        self.file.save(tasks).await
    }
}

/// In-process backend; nothing survives the process.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<ScheduledTask>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn load_tasks(&self) -> Result<Vec<ScheduledTask>, PersistenceError> {
        Ok(self.tasks.lock().await.clone())
    }

    async fn save_tasks(&self, tasks: &[ScheduledTask]) -> Result<(), PersistenceError> {
        *self.tasks.lock().await = tasks.to_vec();
        Ok(())
    }
}
