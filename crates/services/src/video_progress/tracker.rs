use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use onboard_core::model::{
    ProgressRecord, ProgressUpdate, READY_TITLE, TaskId, UserId, is_usable_duration, ready_label,
};
use storage::beacon::{BeaconPayload, UnloadBeacon};
use storage::repository::{StorageError, VideoProgressRepository};
use tracing::{debug, error, info, warn};

use super::completion::{CompletionControls, LogNotifier, NoCompletionControls, Notification, Notifier};
use super::debounce::DelayedTask;
use super::prompt::{ResumeChoice, ResumePrompt};
use super::session::{ActivePrompt, SessionState, TrackerSession};
use super::surface::{PlaybackSurface, Positioning, SurfaceEvent};
use crate::config::TrackerConfig;

/// Which position a surface-driven save records.
#[derive(Debug, Clone, Copy)]
enum SavePoint {
    Current,
    End,
}

#[derive(Default)]
struct TrackerState {
    user: Mutex<Option<UserId>>,
    requirements: Mutex<HashMap<TaskId, bool>>,
    sessions: Mutex<HashMap<TaskId, TrackerSession>>,
    next_token: AtomicU64,
}

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks playback of task videos and persists where each user left off.
///
/// One session exists per task while its surface is mounted. Time-advance
/// events are debounced into a single save; pause, end and seek-end save
/// immediately and supersede any armed timer. Persistence failures are
/// logged and never reach the caller.
///
/// Timers run on the tokio runtime, so every method that arms one
/// (`handle_event`, `initialize_video`, `show_resume_prompt`) must be called
/// from within a runtime.
#[derive(Clone)]
pub struct VideoProgressTracker {
    config: TrackerConfig,
    repo: Arc<dyn VideoProgressRepository>,
    beacon: Arc<dyn UnloadBeacon>,
    controls: Arc<dyn CompletionControls>,
    notifier: Arc<dyn Notifier>,
    state: Arc<TrackerState>,
}

impl VideoProgressTracker {
    #[must_use]
    pub fn new(repo: Arc<dyn VideoProgressRepository>, beacon: Arc<dyn UnloadBeacon>) -> Self {
        Self {
            config: TrackerConfig::default(),
            repo,
            beacon,
            controls: Arc::new(NoCompletionControls),
            notifier: Arc::new(LogNotifier),
            state: Arc::new(TrackerState::default()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_completion_controls(mut self, controls: Arc<dyn CompletionControls>) -> Self {
        self.controls = controls;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ─── Identity and requirements ────────────────────────────────────────────

    /// Rebind the identity used for saves and reads. `None` disables persistence.
    pub fn set_user(&self, user: Option<UserId>) {
        *locked(&self.state.user) = user;
    }

    #[must_use]
    pub fn user(&self) -> Option<UserId> {
        *locked(&self.state.user)
    }

    /// Record whether finishing this task's video gates its "mark complete" control.
    pub fn set_video_requirement(&self, task_id: &TaskId, required: bool) {
        locked(&self.state.requirements).insert(task_id.clone(), required);
    }

    #[must_use]
    pub fn is_video_completion_required(&self, task_id: &TaskId) -> bool {
        locked(&self.state.requirements)
            .get(task_id)
            .copied()
            .unwrap_or(false)
    }

    // ─── Persistence ──────────────────────────────────────────────────────────

    /// Forward a playback position to the store.
    ///
    /// Returns the stored record, or `None` when no user is bound or the
    /// store failed. Failures are logged, never propagated.
    pub async fn save_progress(
        &self,
        task_id: &TaskId,
        current_time: f64,
        duration: f64,
        source_url: Option<String>,
    ) -> Option<ProgressRecord> {
        let user_id = self.user()?;
        let update =
            ProgressUpdate::new(user_id, task_id.clone(), current_time, duration).with_source_url(source_url);

        match self.repo.update_video_progress(&update).await {
            Ok(record) => {
                info!(
                    "video progress saved for task {task_id}: {}% complete",
                    record.watch_percentage().round()
                );
                Some(record)
            }
            Err(err) => {
                error!("error saving video progress for task {task_id}: {err}");
                None
            }
        }
    }

    /// Read the bound user's record for a task.
    ///
    /// "Not found" and every other failure both yield `None`, so playback
    /// proceeds without a resume prompt.
    pub async fn get_progress(&self, task_id: &TaskId) -> Option<ProgressRecord> {
        let user_id = self.user()?;
        match self.repo.get_video_progress(user_id, task_id).await {
            Ok(record) => Some(record),
            Err(StorageError::NotFound) => None,
            Err(err) => {
                error!("error fetching video progress for task {task_id}: {err}");
                None
            }
        }
    }

    pub async fn is_video_completed(&self, task_id: &TaskId) -> bool {
        self.get_progress(task_id)
            .await
            .is_some_and(|record| record.completed())
    }

    // ─── Sessions ─────────────────────────────────────────────────────────────

    /// Bind a surface to a task, then offer to resume if earlier progress exists.
    ///
    /// Tracking is established whether or not the read succeeds. The prompt is
    /// raised right away when metadata is loaded, otherwise on the next
    /// `SurfaceEvent::MetadataLoaded`.
    pub async fn initialize_video(&self, task_id: &TaskId, surface: Arc<dyn PlaybackSurface>) {
        let saved = self.get_progress(task_id).await;

        self.setup_tracking(task_id, Arc::clone(&surface));

        let Some(record) =
            saved.filter(|r| r.offers_resume_below(self.config.resume_ceiling_percent))
        else {
            return;
        };

        if surface.has_metadata() {
            self.show_resume_prompt(task_id, &surface, &record);
        } else if let Some(session) = locked(&self.state.sessions).get_mut(task_id) {
            debug!("deferring resume prompt for task {task_id} until metadata loads");
            session.deferred_prompt = Some(record);
        }
    }

    /// Start a fresh session for a task.
    ///
    /// An existing session for the same task is torn down first: its armed
    /// save is cancelled and any visible prompt is dismissed, so two debounce
    /// chains never overlap.
    pub fn setup_tracking(&self, task_id: &TaskId, surface: Arc<dyn PlaybackSurface>) {
        let previous =
            locked(&self.state.sessions).insert(task_id.clone(), TrackerSession::new(surface));
        if let Some(prompt) = previous.and_then(TrackerSession::shutdown) {
            debug!("replacing resume prompt for task {task_id}");
            prompt.dismiss();
        }
    }

    #[must_use]
    pub fn session_state(&self, task_id: &TaskId) -> SessionState {
        locked(&self.state.sessions)
            .get(task_id)
            .map_or(SessionState::Idle, TrackerSession::state)
    }

    /// Feed a surface event for a task. Events for unknown tasks are ignored.
    pub async fn handle_event(&self, task_id: &TaskId, event: SurfaceEvent) {
        match event {
            SurfaceEvent::TimeUpdate => self.on_time_update(task_id),
            SurfaceEvent::Pause | SurfaceEvent::Seeked => {
                self.save_now(task_id, SavePoint::Current).await;
            }
            SurfaceEvent::Ended => {
                if self.save_now(task_id, SavePoint::End).await
                    && self.is_video_completion_required(task_id)
                {
                    self.on_video_completed(task_id);
                }
            }
            SurfaceEvent::Seeking => {
                if let Some(session) = locked(&self.state.sessions).get_mut(task_id) {
                    session.was_playing = !session.surface.is_paused();
                }
            }
            SurfaceEvent::MetadataLoaded => self.on_metadata_loaded(task_id),
        }
    }

    /// Whether playback was running when the last seek on this task began.
    #[must_use]
    pub fn was_playing_before_seek(&self, task_id: &TaskId) -> bool {
        locked(&self.state.sessions)
            .get(task_id)
            .is_some_and(|s| s.was_playing)
    }

    fn on_time_update(&self, task_id: &TaskId) {
        let mut sessions = locked(&self.state.sessions);
        let Some(session) = sessions.get_mut(task_id) else {
            return;
        };
        if !is_usable_duration(session.surface.duration()) {
            return;
        }

        session.cancel_pending_save();
        let token = self.next_token();
        let tracker = self.clone();
        let task_id = task_id.clone();
        session.pending_save = Some(DelayedTask::spawn(
            token,
            self.config.save_debounce,
            async move { tracker.fire_debounced_save(&task_id, token).await },
        ));
    }

    async fn fire_debounced_save(&self, task_id: &TaskId, token: u64) {
        let surface = {
            let mut sessions = locked(&self.state.sessions);
            let Some(session) = sessions.get_mut(task_id) else {
                return;
            };
            if session.pending_save.as_ref().map(DelayedTask::token) != Some(token) {
                return;
            }
            // Dropping our own handle detaches it; later cancels cannot abort this save.
            session.pending_save = None;
            Arc::clone(&session.surface)
        };
        self.save_from_surface(task_id, surface.as_ref(), SavePoint::Current)
            .await;
    }

    /// Cancel any armed save and write immediately. Returns false when the
    /// task has no session or the surface has no usable duration.
    async fn save_now(&self, task_id: &TaskId, at: SavePoint) -> bool {
        let surface = {
            let mut sessions = locked(&self.state.sessions);
            let Some(session) = sessions.get_mut(task_id) else {
                return false;
            };
            if !is_usable_duration(session.surface.duration()) {
                return false;
            }
            session.cancel_pending_save();
            Arc::clone(&session.surface)
        };
        self.save_from_surface(task_id, surface.as_ref(), at).await;
        true
    }

    async fn save_from_surface(
        &self,
        task_id: &TaskId,
        surface: &dyn PlaybackSurface,
        at: SavePoint,
    ) -> Option<ProgressRecord> {
        let duration = surface.duration();
        if !is_usable_duration(duration) {
            return None;
        }
        let position = match at {
            SavePoint::Current => surface.current_time(),
            SavePoint::End => duration,
        };
        self.save_progress(task_id, position, duration, surface.source())
            .await
    }

    /// Flush every mounted surface through the unload beacon.
    ///
    /// Armed saves are cancelled; nothing is awaited. Returns how many beacons
    /// were handed off. The beacon and the surfaces are only called once the
    /// session lock is released, so either may call back into the tracker.
    pub fn handle_page_unload(&self) -> usize {
        let user_id = self.user();
        let mounted: Vec<(TaskId, Arc<dyn PlaybackSurface>)> = {
            let mut sessions = locked(&self.state.sessions);
            sessions
                .iter_mut()
                .map(|(task_id, session)| {
                    session.cancel_pending_save();
                    (task_id.clone(), Arc::clone(&session.surface))
                })
                .collect()
        };

        let Some(user_id) = user_id else {
            return 0;
        };

        let mut queued = 0;
        for (task_id, surface) in mounted {
            let duration = surface.duration();
            if !is_usable_duration(duration) {
                continue;
            }
            let payload = BeaconPayload {
                user_id,
                task_id,
                current_position: surface.current_time(),
                duration,
            };
            if self.beacon.send(&payload) {
                queued += 1;
            } else {
                warn!("unload beacon for task {} was not queued", payload.task_id);
            }
        }

        queued
    }

    // ─── Resume prompt ────────────────────────────────────────────────────────

    /// Mount a resume prompt for `record` on the surface's container.
    ///
    /// A prompt already visible for the task is dismissed first. The prompt
    /// dismisses itself after the configured timeout without seeking. Returns
    /// false when the task has no session or the surface has no container.
    pub fn show_resume_prompt(
        &self,
        task_id: &TaskId,
        surface: &Arc<dyn PlaybackSurface>,
        record: &ProgressRecord,
    ) -> bool {
        let Some(host) = surface.container() else {
            return false;
        };

        let previous = {
            let mut sessions = locked(&self.state.sessions);
            let Some(session) = sessions.get_mut(task_id) else {
                return false;
            };
            session.deferred_prompt = None;
            session.prompt.take()
        };
        if let Some(previous) = previous {
            previous.dismiss();
        }

        let prompt = ResumePrompt::from_record(record);
        let original_positioning = host.positioning();
        host.set_positioning(Positioning::Relative);
        host.mount(&prompt);

        let token = self.next_token();
        let tracker = self.clone();
        let expiring = task_id.clone();
        let timeout = DelayedTask::spawn(token, self.config.prompt_timeout, async move {
            tracker.expire_prompt(&expiring, token);
        });

        let active = ActivePrompt {
            prompt,
            surface: Arc::clone(surface),
            host,
            original_positioning,
            timeout,
        };

        // The session may have been cleaned up while the host was busy mounting.
        let orphaned = match locked(&self.state.sessions).get_mut(task_id) {
            Some(session) => {
                session.prompt = Some(active);
                None
            }
            None => Some(active),
        };
        match orphaned {
            Some(active) => {
                active.dismiss();
                false
            }
            None => true,
        }
    }

    /// The prompt currently visible for a task, if any.
    #[must_use]
    pub fn visible_prompt(&self, task_id: &TaskId) -> Option<ResumePrompt> {
        locked(&self.state.sessions)
            .get(task_id)
            .and_then(|s| s.prompt.as_ref())
            .map(|active| active.prompt.clone())
    }

    /// Apply the user's answer: seek, play, dismiss. Returns false when no
    /// prompt was visible.
    pub fn resolve_prompt(&self, task_id: &TaskId, choice: ResumeChoice) -> bool {
        let active = locked(&self.state.sessions)
            .get_mut(task_id)
            .and_then(|s| s.prompt.take());
        let Some(active) = active else {
            return false;
        };

        active.surface.seek(active.prompt.target(choice));
        active.surface.play();
        active.dismiss();
        true
    }

    fn expire_prompt(&self, task_id: &TaskId, token: u64) {
        let expired = {
            let mut sessions = locked(&self.state.sessions);
            let Some(session) = sessions.get_mut(task_id) else {
                return;
            };
            if session.prompt.as_ref().map(|p| p.timeout.token()) != Some(token) {
                return;
            }
            session.prompt.take()
        };
        if let Some(active) = expired {
            debug!("resume prompt for task {task_id} timed out");
            active.host.unmount(task_id);
            active.host.set_positioning(active.original_positioning);
        }
    }

    fn on_metadata_loaded(&self, task_id: &TaskId) {
        let pending = locked(&self.state.sessions)
            .get_mut(task_id)
            .and_then(|s| s.deferred_prompt.take().map(|r| (r, Arc::clone(&s.surface))));
        if let Some((record, surface)) = pending {
            self.show_resume_prompt(task_id, &surface, &record);
        }
    }

    // ─── Completion ───────────────────────────────────────────────────────────

    /// Unlock the task's completion controls and announce the finished video.
    ///
    /// Advisory only: the task itself is not marked complete.
    pub fn on_video_completed(&self, task_id: &TaskId) {
        info!("video completed for task {task_id}");

        for control in self.controls.controls() {
            if control.task_id().as_ref() != Some(task_id) {
                continue;
            }
            control.set_enabled(true);
            control.set_title(READY_TITLE);
            if let Some(label) = ready_label(&control.label()) {
                control.set_label(&label);
            }
        }

        self.notifier.notify(Notification::video_completed(
            task_id.clone(),
            self.config.notification_ttl,
        ));
    }

    // ─── Teardown ─────────────────────────────────────────────────────────────

    /// Drop a task's session, cancelling its timers. No-op for unknown tasks.
    pub fn cleanup(&self, task_id: &TaskId) {
        let session = locked(&self.state.sessions).remove(task_id);
        if let Some(prompt) = session.and_then(TrackerSession::shutdown) {
            prompt.dismiss();
        }
    }

    pub fn cleanup_all(&self) {
        let sessions: Vec<TrackerSession> = locked(&self.state.sessions)
            .drain()
            .map(|(_, session)| session)
            .collect();
        for prompt in sessions.into_iter().filter_map(TrackerSession::shutdown) {
            prompt.dismiss();
        }
    }

    fn next_token(&self) -> u64 {
        self.state.next_token.fetch_add(1, Ordering::Relaxed)
    }
}
