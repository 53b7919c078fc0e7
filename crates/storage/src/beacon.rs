use std::sync::{Arc, Mutex};

use onboard_core::model::{ProgressUpdate, TaskId, UserId};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::repository::{StorageError, VideoProgressRepository};

/// Body of an unload-time progress write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconPayload {
    pub user_id: UserId,
    pub task_id: TaskId,
    pub current_position: f64,
    pub duration: f64,
}

impl BeaconPayload {
    /// Serialize to the JSON text sent over the wire.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the payload cannot be encoded.
    pub fn to_text(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Fire-and-forget transport used while the page is being torn down.
///
/// `send` must not block and must not wait for a response. It reports only
/// whether the request was handed off; delivery is never confirmed.
pub trait UnloadBeacon: Send + Sync {
    fn send(&self, payload: &BeaconPayload) -> bool;
}

/// Beacon that keeps every payload in memory, for tests and dry runs.
#[derive(Clone, Default)]
pub struct RecordingBeacon {
    sent: Arc<Mutex<Vec<String>>>,
}

impl RecordingBeacon {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON bodies handed to this beacon, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl UnloadBeacon for RecordingBeacon {
    fn send(&self, payload: &BeaconPayload) -> bool {
        let Ok(body) = payload.to_text() else {
            return false;
        };
        match self.sent.lock() {
            Ok(mut guard) => {
                guard.push(body);
                true
            }
            Err(_) => false,
        }
    }
}

/// Beacon that writes straight into a local repository on a detached task.
///
/// Used when the store lives in-process (SQLite), where there is no HTTP
/// endpoint to post to.
#[derive(Clone)]
pub struct RepositoryBeacon {
    repo: Arc<dyn VideoProgressRepository>,
}

impl RepositoryBeacon {
    #[must_use]
    pub fn new(repo: Arc<dyn VideoProgressRepository>) -> Self {
        Self { repo }
    }
}

impl UnloadBeacon for RepositoryBeacon {
    fn send(&self, payload: &BeaconPayload) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime available for unload beacon");
            return false;
        };
        let update = ProgressUpdate::new(
            payload.user_id,
            payload.task_id.clone(),
            payload.current_position,
            payload.duration,
        );
        let repo = Arc::clone(&self.repo);
        runtime.spawn(async move {
            if let Err(err) = repo.update_video_progress(&update).await {
                debug!("unload write for task {} failed: {err}", update.task_id);
            }
        });
        true
    }
}
