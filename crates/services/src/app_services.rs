use std::sync::Arc;

use storage::beacon::{RecordingBeacon, RepositoryBeacon, UnloadBeacon};
use storage::remote::{RemoteConfig, RemoteStore};
use storage::repository::{Storage, VideoProgressRepository};

use crate::config::TrackerConfig;
use crate::error::AppServicesError;
use crate::video_progress::VideoProgressTracker;

/// Assembles the progress store, its unload beacon and the tracker.
#[derive(Clone)]
pub struct AppServices {
    progress: Arc<dyn VideoProgressRepository>,
    tracker: VideoProgressTracker,
}

impl AppServices {
    /// Pick the backend from the environment: a remote store when
    /// `ONBOARD_REMOTE_URL`/`ONBOARD_REMOTE_KEY` are set, `SQLite` otherwise.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if configuration is invalid or storage
    /// initialization fails.
    pub async fn from_env(db_url: &str) -> Result<Self, AppServicesError> {
        let config = TrackerConfig::from_env()?;
        match RemoteConfig::from_env() {
            Some(remote) => Ok(Self::new_remote(remote, config)),
            None => Self::new_sqlite(db_url, config).await,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// Unload beacons write straight into the same database.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(db_url: &str, config: TrackerConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        let beacon: Arc<dyn UnloadBeacon> =
            Arc::new(RepositoryBeacon::new(Arc::clone(&storage.progress)));
        Ok(Self::assemble(storage.progress, beacon, config))
    }

    /// Build services backed by a remote PostgREST store.
    #[must_use]
    pub fn new_remote(remote: RemoteConfig, config: TrackerConfig) -> Self {
        let store = RemoteStore::new(remote);
        let beacon: Arc<dyn UnloadBeacon> = Arc::new(store.beacon());
        Self::assemble(Arc::new(store), beacon, config)
    }

    /// Build throwaway services; beacons are only recorded.
    #[must_use]
    pub fn in_memory(config: TrackerConfig) -> Self {
        let storage = Storage::in_memory();
        Self::assemble(storage.progress, Arc::new(RecordingBeacon::new()), config)
    }

    fn assemble(
        progress: Arc<dyn VideoProgressRepository>,
        beacon: Arc<dyn UnloadBeacon>,
        config: TrackerConfig,
    ) -> Self {
        let tracker = VideoProgressTracker::new(Arc::clone(&progress), beacon).with_config(config);
        Self { progress, tracker }
    }

    #[must_use]
    pub fn progress(&self) -> Arc<dyn VideoProgressRepository> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn tracker(&self) -> VideoProgressTracker {
        self.tracker.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_core::model::{TaskId, UserId};

    #[tokio::test]
    async fn tracker_writes_through_shared_store() {
        let services = AppServices::in_memory(TrackerConfig::default());
        let user = UserId::random();
        let tracker = services.tracker();
        tracker.set_user(Some(user));

        let task = TaskId::new("welcome_video");
        tracker.save_progress(&task, 15.0, 60.0, None).await;

        let stored = services
            .progress()
            .get_video_progress(user, &task)
            .await
            .unwrap();
        assert_eq!(stored.watch_percentage(), 25.0);
    }

    #[test]
    fn remote_services_build_without_network() {
        let remote = RemoteConfig::new("https://db.example.test", "anon");
        let services = AppServices::new_remote(remote, TrackerConfig::default());
        assert!(services.tracker().user().is_none());
    }
}
