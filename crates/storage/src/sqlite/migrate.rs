use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Applies versioned schema migrations.
///
/// Version 1 creates the `video_progress` table keyed by `(user_id, task_id)`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS video_progress (
                    user_id TEXT NOT NULL,
                    task_id TEXT NOT NULL CHECK (length(task_id) > 0),
                    current_position REAL NOT NULL CHECK (current_position >= 0),
                    duration REAL NOT NULL CHECK (duration > 0),
                    watch_percentage REAL NOT NULL CHECK (watch_percentage BETWEEN 0 AND 100),
                    completed INTEGER NOT NULL CHECK (completed IN (0, 1)),
                    video_url TEXT,
                    last_watched_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, task_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_video_progress_user_watched
                    ON video_progress (user_id, last_watched_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
