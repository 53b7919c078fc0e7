use std::sync::Arc;

use onboard_core::model::ProgressRecord;

use super::debounce::DelayedTask;
use super::prompt::ResumePrompt;
use super::surface::{PlaybackSurface, Positioning, PromptHost};

/// Observable lifecycle of a task's tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No surface bound.
    Idle,
    /// Surface bound, nothing scheduled.
    Tracking,
    /// A debounced save is armed.
    PendingSave,
}

/// A resume prompt currently mounted on a host.
pub(crate) struct ActivePrompt {
    pub(crate) prompt: ResumePrompt,
    pub(crate) surface: Arc<dyn PlaybackSurface>,
    pub(crate) host: Arc<dyn PromptHost>,
    pub(crate) original_positioning: Positioning,
    pub(crate) timeout: DelayedTask,
}

impl ActivePrompt {
    /// Unmount and restore the host. Does not touch the surface.
    pub(crate) fn dismiss(self) {
        self.timeout.cancel();
        self.host.unmount(self.prompt.task_id());
        self.host.set_positioning(self.original_positioning);
    }
}

/// Per-task bookkeeping while a surface is mounted.
pub(crate) struct TrackerSession {
    pub(crate) surface: Arc<dyn PlaybackSurface>,
    pub(crate) pending_save: Option<DelayedTask>,
    /// Whether playback was running when the last seek started.
    pub(crate) was_playing: bool,
    /// Record waiting for metadata before its prompt can be shown.
    pub(crate) deferred_prompt: Option<ProgressRecord>,
    pub(crate) prompt: Option<ActivePrompt>,
}

impl TrackerSession {
    pub(crate) fn new(surface: Arc<dyn PlaybackSurface>) -> Self {
        Self {
            surface,
            pending_save: None,
            was_playing: false,
            deferred_prompt: None,
            prompt: None,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        if self.pending_save.is_some() {
            SessionState::PendingSave
        } else {
            SessionState::Tracking
        }
    }

    /// Cancel the armed debounce timer, if any.
    pub(crate) fn cancel_pending_save(&mut self) {
        if let Some(timer) = self.pending_save.take() {
            timer.cancel();
        }
    }

    /// Cancel every timer and hand back the prompt that still needs dismissing.
    pub(crate) fn shutdown(mut self) -> Option<ActivePrompt> {
        self.cancel_pending_save();
        self.deferred_prompt = None;
        self.prompt.take()
    }
}
