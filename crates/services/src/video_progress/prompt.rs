use onboard_core::model::{ProgressRecord, TaskId};
use onboard_core::time::format_position;

pub const RESUME_LABEL: &str = "Resume";
pub const RESTART_LABEL: &str = "Start Over";

/// The user's answer to a resume prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeChoice {
    /// Seek to the saved position and play.
    Resume,
    /// Seek to zero and play.
    Restart,
}

/// Offer to continue a partially watched video.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePrompt {
    task_id: TaskId,
    resume_position: f64,
    watch_percentage: f64,
}

impl ResumePrompt {
    #[must_use]
    pub fn from_record(record: &ProgressRecord) -> Self {
        Self {
            task_id: record.task_id().clone(),
            resume_position: record.current_position(),
            watch_percentage: record.watch_percentage(),
        }
    }

    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn resume_position(&self) -> f64 {
        self.resume_position
    }

    #[must_use]
    pub fn watch_percentage(&self) -> f64 {
        self.watch_percentage
    }

    /// Position the surface should seek to for a given choice.
    #[must_use]
    pub fn target(&self, choice: ResumeChoice) -> f64 {
        match choice {
            ResumeChoice::Resume => self.resume_position,
            ResumeChoice::Restart => 0.0,
        }
    }

    /// e.g. `Resume from 0:42 (30% watched)?`
    #[must_use]
    pub fn message(&self) -> String {
        format!(
            "Resume from {} ({}% watched)?",
            format_position(self.resume_position),
            self.watch_percentage.round()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onboard_core::model::UserId;
    use onboard_core::time::fixed_now;

    fn prompt(position: f64, duration: f64, pct: f64) -> ResumePrompt {
        let record = ProgressRecord::from_persisted(
            UserId::random(),
            TaskId::new("welcome_video"),
            position,
            duration,
            pct,
            false,
            None,
            fixed_now(),
        )
        .unwrap();
        ResumePrompt::from_record(&record)
    }

    #[test]
    fn message_uses_clock_format_and_rounded_percent() {
        assert_eq!(
            prompt(42.0, 140.0, 30.0).message(),
            "Resume from 0:42 (30% watched)?"
        );
        assert_eq!(
            prompt(125.5, 300.0, 41.8).message(),
            "Resume from 2:05 (42% watched)?"
        );
    }

    #[test]
    fn targets_follow_choice() {
        let p = prompt(42.0, 140.0, 30.0);
        assert_eq!(p.target(ResumeChoice::Resume), 42.0);
        assert_eq!(p.target(ResumeChoice::Restart), 0.0);
    }
}
