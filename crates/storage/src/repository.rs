use async_trait::async_trait;
use onboard_core::Clock;
use onboard_core::model::{ProgressError, ProgressRecord, ProgressUpdate, TaskId, UserId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// The store answered, and there is no matching row.
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Invalid(#[from] ProgressError),

    #[error("remote error {code}: {message}")]
    Remote { code: String, message: String },
}

impl StorageError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }
}

/// Repository contract for per-user, per-task video progress.
///
/// Implementations own derivation of `watch_percentage` and `completed`;
/// callers only forward raw playback values.
#[async_trait]
pub trait VideoProgressRepository: Send + Sync {
    /// Upsert progress keyed by `(user_id, task_id)` and return the stored record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the update is rejected or cannot be stored.
    async fn update_video_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError>;

    /// Fetch the unique record for a user and task.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if no record exists, or other storage errors.
    async fn get_video_progress(
        &self,
        user_id: UserId,
        task_id: &TaskId,
    ) -> Result<ProgressRecord, StorageError>;

    /// List every record for a user, ordered by task id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_video_progress(&self, user_id: UserId)
    -> Result<Vec<ProgressRecord>, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    clock: Clock,
    records: Arc<Mutex<HashMap<(UserId, TaskId), ProgressRecord>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Insert a record as-is, bypassing derivation. Useful for seeding fixtures.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn seed(&self, record: ProgressRecord) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert((record.user_id(), record.task_id().clone()), record);
        Ok(())
    }
}

#[async_trait]
impl VideoProgressRepository for InMemoryRepository {
    async fn update_video_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (update.user_id, update.task_id.clone());
        let record = ProgressRecord::derive(update, guard.get(&key), self.clock.now())?;
        guard.insert(key, record.clone());
        Ok(record)
    }

    async fn get_video_progress(
        &self,
        user_id: UserId,
        task_id: &TaskId,
    ) -> Result<ProgressRecord, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard
            .get(&(user_id, task_id.clone()))
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_video_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let guard = self
            .records
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<ProgressRecord> = guard
            .values()
            .filter(|record| record.user_id() == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.task_id().cmp(b.task_id()));
        Ok(found)
    }
}

/// Bundles the progress repository behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn VideoProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let progress: Arc<dyn VideoProgressRepository> = Arc::new(InMemoryRepository::new());
        Self { progress }
    }
}
