#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use onboard_core::model::{ProgressRecord, ProgressUpdate, TaskId, UserId};
use onboard_core::time::fixed_now;
use services::video_progress::{
    CompletionControl, CompletionControls, Notification, Notifier, PlaybackSurface, Positioning,
    PromptHost, ResumePrompt,
};
use services::{SessionState, TrackerConfig, VideoProgressTracker};
use storage::beacon::{BeaconPayload, RecordingBeacon, UnloadBeacon};
use storage::repository::{InMemoryRepository, StorageError, VideoProgressRepository};

/// Let spawned timer tasks run after the clock moved.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

pub async fn advance(secs: u64) {
    tokio::time::advance(Duration::from_secs(secs)).await;
    settle().await;
}

// ─── Repository ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct CountingRepository {
    inner: InMemoryRepository,
    writes: Arc<Mutex<Vec<ProgressUpdate>>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl CountingRepository {
    pub fn writes(&self) -> Vec<ProgressUpdate> {
        self.writes.lock().unwrap().clone()
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn seed(&self, user: UserId, task: &TaskId, position: f64, duration: f64, pct: f64) {
        let record = ProgressRecord::from_persisted(
            user,
            task.clone(),
            position,
            duration,
            pct,
            false,
            None,
            fixed_now(),
        )
        .unwrap();
        self.inner.seed(record).unwrap();
    }
}

#[async_trait]
impl VideoProgressRepository for CountingRepository {
    async fn update_video_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError> {
        self.writes.lock().unwrap().push(update.clone());
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store offline".into()));
        }
        self.inner.update_video_progress(update).await
    }

    async fn get_video_progress(
        &self,
        user_id: UserId,
        task_id: &TaskId,
    ) -> Result<ProgressRecord, StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("store offline".into()));
        }
        self.inner.get_video_progress(user_id, task_id).await
    }

    async fn list_video_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        self.inner.list_video_progress(user_id).await
    }
}

// ─── Surface and host ────────────────────────────────────────────────────────

#[derive(Debug)]
struct SurfaceState {
    current_time: f64,
    duration: f64,
    paused: bool,
    has_metadata: bool,
    seeks: Vec<f64>,
    plays: usize,
}

pub struct FakeSurface {
    state: Mutex<SurfaceState>,
    host: Option<Arc<FakeHost>>,
}

impl FakeSurface {
    /// A loaded surface with a container.
    pub fn loaded(duration: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SurfaceState {
                current_time: 0.0,
                duration,
                paused: true,
                has_metadata: true,
                seeks: Vec::new(),
                plays: 0,
            }),
            host: Some(Arc::new(FakeHost::default())),
        })
    }

    /// A surface whose metadata has not loaded yet.
    pub fn unloaded() -> Arc<Self> {
        let surface = Self::loaded(f64::NAN);
        surface.state.lock().unwrap().has_metadata = false;
        surface
    }

    pub fn as_surface(self: &Arc<Self>) -> Arc<dyn PlaybackSurface> {
        Arc::clone(self) as Arc<dyn PlaybackSurface>
    }

    pub fn host(&self) -> Arc<FakeHost> {
        Arc::clone(self.host.as_ref().unwrap())
    }

    pub fn set_time(&self, t: f64) {
        self.state.lock().unwrap().current_time = t;
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn load_metadata(&self, duration: f64) {
        let mut state = self.state.lock().unwrap();
        state.duration = duration;
        state.has_metadata = true;
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.state.lock().unwrap().seeks.clone()
    }

    pub fn plays(&self) -> usize {
        self.state.lock().unwrap().plays
    }
}

impl PlaybackSurface for FakeSurface {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn has_metadata(&self) -> bool {
        self.state.lock().unwrap().has_metadata
    }

    fn source(&self) -> Option<String> {
        Some("https://cdn.example.test/onboarding.mp4".into())
    }

    fn seek(&self, position: f64) {
        let mut state = self.state.lock().unwrap();
        state.current_time = position;
        state.seeks.push(position);
    }

    fn play(&self) {
        let mut state = self.state.lock().unwrap();
        state.paused = false;
        state.plays += 1;
    }

    fn container(&self) -> Option<Arc<dyn PromptHost>> {
        self.host
            .as_ref()
            .map(|h| Arc::clone(h) as Arc<dyn PromptHost>)
    }
}

#[derive(Default)]
struct HostState {
    positioning: Positioning,
    visible: Option<ResumePrompt>,
    mounts: usize,
    unmounts: usize,
}

#[derive(Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn visible(&self) -> Option<ResumePrompt> {
        self.state.lock().unwrap().visible.clone()
    }

    pub fn mounts(&self) -> usize {
        self.state.lock().unwrap().mounts
    }

    pub fn unmounts(&self) -> usize {
        self.state.lock().unwrap().unmounts
    }

    pub fn set_initial_positioning(&self, positioning: Positioning) {
        self.state.lock().unwrap().positioning = positioning;
    }
}

impl PromptHost for FakeHost {
    fn positioning(&self) -> Positioning {
        self.state.lock().unwrap().positioning.clone()
    }

    fn set_positioning(&self, positioning: Positioning) {
        self.state.lock().unwrap().positioning = positioning;
    }

    fn mount(&self, prompt: &ResumePrompt) {
        let mut state = self.state.lock().unwrap();
        state.visible = Some(prompt.clone());
        state.mounts += 1;
    }

    fn unmount(&self, _task_id: &TaskId) {
        let mut state = self.state.lock().unwrap();
        state.visible = None;
        state.unmounts += 1;
    }
}

// ─── Completion collaborators ────────────────────────────────────────────────

pub struct FakeControl {
    task_id: Option<TaskId>,
    enabled: Mutex<bool>,
    title: Mutex<String>,
    label: Mutex<String>,
}

impl FakeControl {
    pub fn new(task_id: TaskId, label: &str) -> Arc<Self> {
        Arc::new(Self {
            task_id: Some(task_id),
            enabled: Mutex::new(false),
            title: Mutex::new("Watch the video first".into()),
            label: Mutex::new(label.into()),
        })
    }

    pub fn enabled(&self) -> bool {
        *self.enabled.lock().unwrap()
    }

    pub fn title(&self) -> String {
        self.title.lock().unwrap().clone()
    }
}

impl CompletionControl for FakeControl {
    fn task_id(&self) -> Option<TaskId> {
        self.task_id.clone()
    }

    fn set_enabled(&self, enabled: bool) {
        *self.enabled.lock().unwrap() = enabled;
    }

    fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = title.into();
    }

    fn label(&self) -> String {
        self.label.lock().unwrap().clone()
    }

    fn set_label(&self, label: &str) {
        *self.label.lock().unwrap() = label.into();
    }
}

#[derive(Default)]
pub struct FakeControls {
    controls: Mutex<Vec<Arc<FakeControl>>>,
}

impl FakeControls {
    pub fn add(&self, control: Arc<FakeControl>) {
        self.controls.lock().unwrap().push(control);
    }
}

impl CompletionControls for FakeControls {
    fn controls(&self) -> Vec<Arc<dyn CompletionControl>> {
        self.controls
            .lock()
            .unwrap()
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn CompletionControl>)
            .collect()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn seen(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ─── Beacons ─────────────────────────────────────────────────────────────────

/// Beacon that reads the tracker's session state back while sending.
#[derive(Default)]
pub struct ReentrantBeacon {
    tracker: OnceLock<VideoProgressTracker>,
    observed: Mutex<Vec<(TaskId, SessionState)>>,
}

impl ReentrantBeacon {
    pub fn attach(&self, tracker: VideoProgressTracker) {
        let _ = self.tracker.set(tracker);
    }

    pub fn observed(&self) -> Vec<(TaskId, SessionState)> {
        self.observed.lock().unwrap().clone()
    }
}

impl UnloadBeacon for ReentrantBeacon {
    fn send(&self, payload: &BeaconPayload) -> bool {
        let Some(tracker) = self.tracker.get() else {
            return false;
        };
        let state = tracker.session_state(&payload.task_id);
        self.observed
            .lock()
            .unwrap()
            .push((payload.task_id.clone(), state));
        true
    }
}

// ─── Harness ─────────────────────────────────────────────────────────────────

pub struct Harness {
    pub tracker: VideoProgressTracker,
    pub repo: CountingRepository,
    pub beacon: RecordingBeacon,
    pub controls: Arc<FakeControls>,
    pub notifier: Arc<RecordingNotifier>,
    pub user: UserId,
    pub task: TaskId,
}

pub fn harness() -> Harness {
    let repo = CountingRepository::default();
    let beacon = RecordingBeacon::new();
    let controls = Arc::new(FakeControls::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let user = UserId::random();

    let tracker = VideoProgressTracker::new(Arc::new(repo.clone()), Arc::new(beacon.clone()))
        .with_config(TrackerConfig::default())
        .with_completion_controls(Arc::clone(&controls) as Arc<dyn CompletionControls>)
        .with_notifier(Arc::clone(&notifier) as Arc<dyn Notifier>);
    tracker.set_user(Some(user));

    Harness {
        tracker,
        repo,
        beacon,
        controls,
        notifier,
        user,
        task: TaskId::new("welcome_video"),
    }
}
