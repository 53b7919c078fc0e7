use std::sync::Arc;

use onboard_core::model::TaskId;

use super::prompt::ResumePrompt;

/// Media lifecycle notifications delivered by a playback surface.
///
/// Page unload is not a surface event; it is delivered once for the whole
/// tracker through `VideoProgressTracker::handle_page_unload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEvent {
    /// Playback position advanced. Fires many times per second while playing.
    TimeUpdate,
    Pause,
    Ended,
    /// A seek started.
    Seeking,
    /// A seek finished and the position settled.
    Seeked,
    /// Duration and dimensions became available.
    MetadataLoaded,
}

/// A media element bound to a task, as seen by the tracker.
pub trait PlaybackSurface: Send + Sync {
    /// Elapsed seconds into the media.
    fn current_time(&self) -> f64;

    /// Total length in seconds; `NaN` until metadata is loaded.
    fn duration(&self) -> f64;

    fn is_paused(&self) -> bool;

    /// True once metadata has loaded and seeking is meaningful.
    fn has_metadata(&self) -> bool;

    /// Resource identifier currently loaded, if any.
    fn source(&self) -> Option<String>;

    fn seek(&self, position: f64);

    fn play(&self);

    /// Element that hosts overlays for this surface. `None` disables the
    /// resume prompt.
    fn container(&self) -> Option<Arc<dyn PromptHost>>;
}

/// CSS-style positioning of a prompt host.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Positioning {
    #[default]
    Unset,
    Relative,
    Other(String),
}

/// Container that can overlay a resume prompt on top of a surface.
///
/// The tracker switches the host to `Positioning::Relative` while a prompt
/// is mounted and restores whatever was there before on dismissal.
pub trait PromptHost: Send + Sync {
    fn positioning(&self) -> Positioning;

    fn set_positioning(&self, positioning: Positioning);

    fn mount(&self, prompt: &ResumePrompt);

    fn unmount(&self, task_id: &TaskId);
}
