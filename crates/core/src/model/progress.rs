use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{TaskId, UserId};

/// Records at or above this percentage are treated as finished and never
/// produce a resume prompt.
pub const RESUME_CEILING_PERCENT: f64 = 95.0;

/// Percentage at which a record is marked completed.
pub const COMPLETION_PERCENT: f64 = 100.0;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("duration must be finite and positive, got {provided}")]
    InvalidDuration { provided: f64 },

    #[error("position must be finite and non-negative, got {provided}")]
    InvalidPosition { provided: f64 },

    #[error("watch percentage must be within 0..=100, got {provided}")]
    InvalidPercentage { provided: f64 },
}

/// Returns true once media metadata has produced a duration worth persisting.
#[must_use]
pub fn is_usable_duration(duration: f64) -> bool {
    duration.is_finite() && duration > 0.0
}

/// `position / duration * 100`, clamped to `0..=100`.
///
/// Unusable durations or positions yield `0.0`.
#[must_use]
pub fn watch_percentage(position: f64, duration: f64) -> f64 {
    if !is_usable_duration(duration) || !position.is_finite() {
        return 0.0;
    }
    (position / duration * 100.0).clamp(0.0, 100.0)
}

/// Write payload forwarded to the persistence endpoint.
///
/// Nothing is derived client-side; the store owns percentage and completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub user_id: UserId,
    pub task_id: TaskId,
    pub current_position: f64,
    pub duration: f64,
    pub source_url: Option<String>,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(user_id: UserId, task_id: TaskId, current_position: f64, duration: f64) -> Self {
        Self {
            user_id,
            task_id,
            current_position,
            duration,
            source_url: None,
        }
    }

    #[must_use]
    pub fn with_source_url(mut self, source_url: Option<String>) -> Self {
        self.source_url = source_url;
        self
    }
}

/// Last known playback state of one task's video for one user.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRecord {
    user_id: UserId,
    task_id: TaskId,
    current_position: f64,
    duration: f64,
    watch_percentage: f64,
    completed: bool,
    source_url: Option<String>,
    last_watched_at: DateTime<Utc>,
}

impl ProgressRecord {
    /// Build the stored record for an update, the way the store-side upsert does.
    ///
    /// Positions past the end are clamped to the duration. `completed` is
    /// sticky: once a record reached the end it stays completed even if the
    /// user later rewinds.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if the duration is not usable or the position
    /// is negative or not finite.
    pub fn derive(
        update: &ProgressUpdate,
        previous: Option<&ProgressRecord>,
        now: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if !is_usable_duration(update.duration) {
            return Err(ProgressError::InvalidDuration {
                provided: update.duration,
            });
        }
        if !update.current_position.is_finite() || update.current_position < 0.0 {
            return Err(ProgressError::InvalidPosition {
                provided: update.current_position,
            });
        }

        let current_position = update.current_position.min(update.duration);
        let watch_percentage = watch_percentage(current_position, update.duration);
        let completed =
            previous.is_some_and(ProgressRecord::completed) || watch_percentage >= COMPLETION_PERCENT;
        let source_url = update
            .source_url
            .clone()
            .or_else(|| previous.and_then(|p| p.source_url.clone()));

        Ok(Self {
            user_id: update.user_id,
            task_id: update.task_id.clone(),
            current_position,
            duration: update.duration,
            watch_percentage,
            completed,
            source_url,
            last_watched_at: now,
        })
    }

    /// Rehydrate a record from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError` if any numeric field is out of range.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        user_id: UserId,
        task_id: TaskId,
        current_position: f64,
        duration: f64,
        watch_percentage: f64,
        completed: bool,
        source_url: Option<String>,
        last_watched_at: DateTime<Utc>,
    ) -> Result<Self, ProgressError> {
        if !is_usable_duration(duration) {
            return Err(ProgressError::InvalidDuration { provided: duration });
        }
        if !current_position.is_finite() || current_position < 0.0 {
            return Err(ProgressError::InvalidPosition {
                provided: current_position,
            });
        }
        if !(0.0..=100.0).contains(&watch_percentage) {
            return Err(ProgressError::InvalidPercentage {
                provided: watch_percentage,
            });
        }

        Ok(Self {
            user_id,
            task_id,
            current_position,
            duration,
            watch_percentage,
            completed,
            source_url,
            last_watched_at,
        })
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    #[must_use]
    pub fn current_position(&self) -> f64 {
        self.current_position
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn watch_percentage(&self) -> f64 {
        self.watch_percentage
    }

    #[must_use]
    pub fn completed(&self) -> bool {
        self.completed
    }

    #[must_use]
    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    #[must_use]
    pub fn last_watched_at(&self) -> DateTime<Utc> {
        self.last_watched_at
    }

    /// Whether reopening this video should offer to resume, given a ceiling
    /// above which playback counts as finished.
    #[must_use]
    pub fn offers_resume_below(&self, ceiling_percent: f64) -> bool {
        self.current_position > 0.0 && self.watch_percentage < ceiling_percent
    }

    /// `offers_resume_below` with the default 95% ceiling.
    #[must_use]
    pub fn should_offer_resume(&self) -> bool {
        self.offers_resume_below(RESUME_CEILING_PERCENT)
    }
}
