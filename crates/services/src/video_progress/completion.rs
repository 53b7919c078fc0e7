use std::sync::Arc;
use std::time::Duration;

use onboard_core::model::TaskId;
use tracing::info;

pub const COMPLETED_TITLE: &str = "Video Completed!";
pub const COMPLETED_BODY: &str = "You can now mark this task as complete.";

/// A "mark complete" control rendered somewhere in the UI.
pub trait CompletionControl: Send + Sync {
    /// Task the control completes, if it is bound to one.
    fn task_id(&self) -> Option<TaskId>;

    fn set_enabled(&self, enabled: bool);

    fn set_title(&self, title: &str);

    fn label(&self) -> String;

    fn set_label(&self, label: &str);
}

/// Locates the completion controls currently on screen.
pub trait CompletionControls: Send + Sync {
    fn controls(&self) -> Vec<Arc<dyn CompletionControl>>;
}

/// No completion controls anywhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompletionControls;

impl CompletionControls for NoCompletionControls {
    fn controls(&self) -> Vec<Arc<dyn CompletionControl>> {
        Vec::new()
    }
}

/// A transient message that dismisses itself after `ttl`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub task_id: TaskId,
    pub title: String,
    pub body: String,
    pub ttl: Duration,
}

impl Notification {
    #[must_use]
    pub fn video_completed(task_id: TaskId, ttl: Duration) -> Self {
        Self {
            task_id,
            title: COMPLETED_TITLE.to_string(),
            body: COMPLETED_BODY.to_string(),
            ttl,
        }
    }
}

/// Renders transient notifications. Dismissal after `ttl` is the renderer's job.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that only writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            task_id = %notification.task_id,
            "{}: {}",
            notification.title,
            notification.body
        );
    }
}
