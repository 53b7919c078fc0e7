use onboard_core::model::{ProgressRecord, TaskId, UserId};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn task_id_to_text(task_id: &TaskId) -> &str {
    task_id.as_str()
}

pub(crate) fn task_id_from_text(s: &str) -> Result<TaskId, StorageError> {
    s.parse::<TaskId>().map_err(ser)
}

pub(crate) fn user_id_to_text(user_id: UserId) -> String {
    user_id.value().hyphenated().to_string()
}

pub(crate) fn user_id_from_text(s: &str) -> Result<UserId, StorageError> {
    s.parse::<UserId>().map_err(ser)
}

pub(crate) fn map_progress_row(row: &sqlx::sqlite::SqliteRow) -> Result<ProgressRecord, StorageError> {
    let user_id: String = row.try_get("user_id").map_err(ser)?;
    let task_id: String = row.try_get("task_id").map_err(ser)?;

    ProgressRecord::from_persisted(
        user_id_from_text(&user_id)?,
        task_id_from_text(&task_id)?,
        row.try_get("current_position").map_err(ser)?,
        row.try_get("duration").map_err(ser)?,
        row.try_get("watch_percentage").map_err(ser)?,
        row.try_get("completed").map_err(ser)?,
        row.try_get("video_url").map_err(ser)?,
        row.try_get("last_watched_at").map_err(ser)?,
    )
    .map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_text_keeps_slugs_verbatim() {
        let id = TaskId::new("welcome_video");
        assert_eq!(task_id_to_text(&id), "welcome_video");
        assert_eq!(task_id_from_text("welcome_video").unwrap(), id);
    }

    #[test]
    fn task_id_rejects_blank_text() {
        assert!(matches!(
            task_id_from_text(" "),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn user_id_text_is_hyphenated_lowercase() {
        let user = UserId::random();
        let text = user_id_to_text(user);
        assert_eq!(text.len(), 36);
        assert_eq!(user_id_from_text(&text).unwrap(), user);
    }
}
