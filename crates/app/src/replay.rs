//! Scripted playback against a real store.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use onboard_core::model::TaskId;
use onboard_core::time::format_position;
use services::video_progress::{
    CompletionControl, CompletionControls, Notification, Notifier, PlaybackSurface, Positioning,
    PromptHost, RESTART_LABEL, RESUME_LABEL,
};
use services::{ResumeChoice, ResumePrompt, SessionState, SurfaceEvent, VideoProgressTracker};
use tracing::{debug, info, warn};

/// Grace period for detached unload writes before the process reads back.
const BEACON_GRACE: Duration = Duration::from_millis(200);

const REPLAY_SOURCE: &str = "replay://onboarding";
const REPLAY_LABEL: &str = "Watch video to Complete Task";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Play up to the given second.
    Play(f64),
    Pause,
    Seek(f64),
    End,
    Unload,
    Resume,
    Restart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepError {
    raw: String,
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid replay step: {} (expected play:N, pause, seek:N, end, unload, resume, restart)",
            self.raw
        )
    }
}

impl std::error::Error for StepError {}

impl std::str::FromStr for Step {
    type Err = StepError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let err = || StepError {
            raw: raw.to_string(),
        };
        let seconds = |value: &str| -> Result<f64, StepError> {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .ok_or_else(err)
        };

        match raw.split_once(':') {
            Some(("play", value)) => Ok(Self::Play(seconds(value)?)),
            Some(("seek", value)) => Ok(Self::Seek(seconds(value)?)),
            Some(_) => Err(err()),
            None => match raw {
                "pause" => Ok(Self::Pause),
                "end" => Ok(Self::End),
                "unload" => Ok(Self::Unload),
                "resume" => Ok(Self::Resume),
                "restart" => Ok(Self::Restart),
                _ => Err(err()),
            },
        }
    }
}

// ─── Simulated surface ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Playhead {
    position: f64,
    paused: bool,
}

/// In-process media element with a fixed duration.
pub struct SimulatedSurface {
    duration: f64,
    playhead: Mutex<Playhead>,
    host: Arc<ConsoleHost>,
}

impl SimulatedSurface {
    #[must_use]
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            playhead: Mutex::new(Playhead {
                position: 0.0,
                paused: true,
            }),
            host: Arc::new(ConsoleHost::default()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut Playhead)) {
        let mut playhead = self.playhead.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut playhead);
    }

    fn move_to(&self, position: f64) {
        let duration = self.duration;
        self.update(|p| p.position = position.min(duration));
    }
}

impl PlaybackSurface for SimulatedSurface {
    fn current_time(&self) -> f64 {
        self.playhead
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.playhead
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .paused
    }

    fn has_metadata(&self) -> bool {
        true
    }

    fn source(&self) -> Option<String> {
        Some(REPLAY_SOURCE.to_string())
    }

    fn seek(&self, position: f64) {
        self.move_to(position);
        println!("  seek -> {}", format_position(position));
    }

    fn play(&self) {
        self.update(|p| p.paused = false);
    }

    fn container(&self) -> Option<Arc<dyn PromptHost>> {
        Some(Arc::clone(&self.host) as Arc<dyn PromptHost>)
    }
}

#[derive(Default)]
struct ConsoleHost {
    positioning: Mutex<Positioning>,
}

impl PromptHost for ConsoleHost {
    fn positioning(&self) -> Positioning {
        self.positioning
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_positioning(&self, positioning: Positioning) {
        *self
            .positioning
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = positioning;
    }

    fn mount(&self, prompt: &ResumePrompt) {
        println!(
            "  prompt: {} [{RESUME_LABEL}] [{RESTART_LABEL}]",
            prompt.message()
        );
    }

    fn unmount(&self, _task_id: &TaskId) {
        println!("  prompt dismissed");
    }
}

// ─── Completion collaborators ────────────────────────────────────────────────

struct ConsoleControl {
    task_id: TaskId,
    label: Mutex<String>,
}

impl CompletionControl for ConsoleControl {
    fn task_id(&self) -> Option<TaskId> {
        Some(self.task_id.clone())
    }

    fn set_enabled(&self, enabled: bool) {
        if enabled {
            println!("  complete button enabled");
        }
    }

    fn set_title(&self, _title: &str) {}

    fn label(&self) -> String {
        self.label
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_label(&self, label: &str) {
        println!("  complete button label: {label}");
        *self.label.lock().unwrap_or_else(PoisonError::into_inner) = label.to_string();
    }
}

struct ConsoleControls(Arc<ConsoleControl>);

impl CompletionControls for ConsoleControls {
    fn controls(&self) -> Vec<Arc<dyn CompletionControl>> {
        vec![Arc::clone(&self.0) as Arc<dyn CompletionControl>]
    }
}

struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notification: Notification) {
        println!("  notice: {} {}", notification.title, notification.body);
    }
}

/// Attach console completion controls and notifications for `task_id`.
#[must_use]
pub fn with_console_collaborators(
    tracker: VideoProgressTracker,
    task_id: TaskId,
) -> VideoProgressTracker {
    let control = Arc::new(ConsoleControl {
        task_id,
        label: Mutex::new(REPLAY_LABEL.to_string()),
    });
    tracker
        .with_completion_controls(Arc::new(ConsoleControls(control)))
        .with_notifier(Arc::new(ConsoleNotifier))
}

// ─── Driver ──────────────────────────────────────────────────────────────────

/// Run `steps` on a fresh surface, then wait for anything still pending.
pub async fn run(
    tracker: &VideoProgressTracker,
    task_id: &TaskId,
    surface: Arc<SimulatedSurface>,
    steps: &[Step],
) {
    tracker
        .initialize_video(task_id, Arc::clone(&surface) as Arc<dyn PlaybackSurface>)
        .await;

    let mut unloaded = false;
    for step in steps {
        debug!(?step, "replay step");
        println!("{}", describe(*step));
        match *step {
            Step::Play(until) => {
                surface.update(|p| p.paused = false);
                surface.move_to(until);
                tracker.handle_event(task_id, SurfaceEvent::TimeUpdate).await;
            }
            Step::Pause => {
                surface.update(|p| p.paused = true);
                tracker.handle_event(task_id, SurfaceEvent::Pause).await;
            }
            Step::Seek(to) => {
                tracker.handle_event(task_id, SurfaceEvent::Seeking).await;
                surface.move_to(to);
                tracker.handle_event(task_id, SurfaceEvent::Seeked).await;
            }
            Step::End => {
                surface.update(|p| p.paused = true);
                surface.move_to(surface.duration);
                tracker.handle_event(task_id, SurfaceEvent::Ended).await;
            }
            Step::Unload => {
                let queued = tracker.handle_page_unload();
                info!("{queued} unload beacon(s) queued");
                unloaded = true;
            }
            Step::Resume | Step::Restart => {
                let choice = if *step == Step::Resume {
                    ResumeChoice::Resume
                } else {
                    ResumeChoice::Restart
                };
                if !tracker.resolve_prompt(task_id, choice) {
                    warn!("no resume prompt visible for task {task_id}");
                }
            }
        }
    }

    if tracker.session_state(task_id) == SessionState::PendingSave {
        let wait = tracker.config().save_debounce + Duration::from_millis(50);
        info!("waiting {}ms for the pending save", wait.as_millis());
        tokio::time::sleep(wait).await;
    }
    if unloaded {
        tokio::time::sleep(BEACON_GRACE).await;
    }
    tracker.cleanup(task_id);
}

fn describe(step: Step) -> String {
    match step {
        Step::Play(until) => format!("play to {}", format_position(until)),
        Step::Pause => "pause".into(),
        Step::Seek(to) => format!("seek to {}", format_position(to)),
        Step::End => "end".into(),
        Step::Unload => "unload".into(),
        Step::Resume => "resume".into(),
        Step::Restart => "start over".into(),
    }
}
