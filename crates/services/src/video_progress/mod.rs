//! Resumable video playback tracking for task instructions.

mod completion;
mod debounce;
mod prompt;
mod session;
mod surface;
mod tracker;

pub use completion::{
    COMPLETED_BODY, COMPLETED_TITLE, CompletionControl, CompletionControls, LogNotifier,
    NoCompletionControls, Notification, Notifier,
};
pub use prompt::{RESTART_LABEL, RESUME_LABEL, ResumeChoice, ResumePrompt};
pub use session::SessionState;
pub use surface::{PlaybackSurface, Positioning, PromptHost, SurfaceEvent};
pub use tracker::VideoProgressTracker;
