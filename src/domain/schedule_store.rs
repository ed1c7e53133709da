//! ScheduleStore: persistence for operator-managed comparison schedules,
//! written whole like the task list.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::comparison_schedule::ComparisonSchedule;
use super::error::PersistenceError;
use super::task_store::ChecksummedFile;

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load_schedules(&self) -> Result<Vec<ComparisonSchedule>, PersistenceError>;

    async fn save_schedules(&self, schedules: &[ComparisonSchedule])
        -> Result<(), PersistenceError>;
}

/// Checksummed JSON file, same envelope as the task file.
pub struct FileScheduleStore {
    file: ChecksummedFile,
}

impl FileScheduleStore {
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
impl ScheduleStore for FileScheduleStore {
    async fn load_schedules(&self) -> Result<Vec<ComparisonSchedule>, PersistenceError> {
        self.file.load().await
    }

    async fn save_schedules(
        &self,
        schedules: &[ComparisonSchedule],
    ) -> Result<(), PersistenceError> {
        self.file.save(schedules).await
    }
}

#[derive(Default)]
pub struct MemoryScheduleStore {
    schedules: Mutex<Vec<ComparisonSchedule>>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load_schedules(&self) -> Result<Vec<ComparisonSchedule>, PersistenceError> {
        Ok(self.schedules.lock().await.clone())
    }

    async fn save_schedules(
        &self,
        schedules: &[ComparisonSchedule],
    ) -> Result<(), PersistenceError> {
        *self.schedules.lock().await = schedules.to_vec();
        Ok(())
    }
}
