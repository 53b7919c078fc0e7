mod completion;
mod ids;
mod progress;

pub use completion::{READY_TITLE, ready_label};
pub use ids::{ParseIdError, TaskId, UserId};
pub use progress::{
    COMPLETION_PERCENT, ProgressError, ProgressRecord, ProgressUpdate, RESUME_CEILING_PERCENT,
    is_usable_duration, watch_percentage,
};
