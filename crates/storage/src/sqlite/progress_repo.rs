use async_trait::async_trait;
use onboard_core::model::{ProgressRecord, ProgressUpdate, TaskId, UserId};

use super::{
    SqliteRepository,
    mapping::{map_progress_row, task_id_to_text, user_id_to_text},
};
use crate::repository::{StorageError, VideoProgressRepository};

const SELECT_PROGRESS: &str = r"
    SELECT
        user_id, task_id, current_position, duration,
        watch_percentage, completed, video_url, last_watched_at
    FROM video_progress
";

#[async_trait]
impl VideoProgressRepository for SqliteRepository {
    async fn update_video_progress(
        &self,
        update: &ProgressUpdate,
    ) -> Result<ProgressRecord, StorageError> {
        let user = user_id_to_text(update.user_id);
        let task = task_id_to_text(&update.task_id);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let previous = sqlx::query(&format!(
            "{SELECT_PROGRESS} WHERE user_id = ?1 AND task_id = ?2"
        ))
        .bind(&user)
        .bind(task)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .map(|row| map_progress_row(&row))
        .transpose()?;

        let record = ProgressRecord::derive(update, previous.as_ref(), self.clock.now())?;

        sqlx::query(
            r"
            INSERT INTO video_progress (
                user_id, task_id, current_position, duration,
                watch_percentage, completed, video_url, last_watched_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(user_id, task_id) DO UPDATE SET
                current_position = excluded.current_position,
                duration = excluded.duration,
                watch_percentage = excluded.watch_percentage,
                completed = excluded.completed,
                video_url = excluded.video_url,
                last_watched_at = excluded.last_watched_at
            ",
        )
        .bind(&user)
        .bind(task)
        .bind(record.current_position())
        .bind(record.duration())
        .bind(record.watch_percentage())
        .bind(record.completed())
        .bind(record.source_url())
        .bind(record.last_watched_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(record)
    }

    async fn get_video_progress(
        &self,
        user_id: UserId,
        task_id: &TaskId,
    ) -> Result<ProgressRecord, StorageError> {
        let row = sqlx::query(&format!(
            "{SELECT_PROGRESS} WHERE user_id = ?1 AND task_id = ?2"
        ))
        .bind(user_id_to_text(user_id))
        .bind(task_id_to_text(task_id))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let Some(row) = row else {
            return Err(StorageError::NotFound);
        };
        map_progress_row(&row)
    }

    async fn list_video_progress(
        &self,
        user_id: UserId,
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "{SELECT_PROGRESS} WHERE user_id = ?1 ORDER BY task_id ASC"
        ))
        .bind(user_id_to_text(user_id))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_progress_row(&row)?);
        }
        Ok(out)
    }
}
