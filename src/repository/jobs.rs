use chrono::DateTime;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::ImportMode;
use crate::domain::JobStatus;

#[derive(Debug, Clone)]
pub struct ImportJob {
    pub id: Uuid,
    pub user_id: Uuid,
    pub idempotency_key: String,
    pub status: JobStatus,
    pub mode: ImportMode,
    pub filename: String,
    pub s3_key: String,
    pub total_rows: i64,
    pub processed_rows: i64,
    pub error: Option<String>,
    pub error_report_object_key: Option<String>,
    pub error_count: i64,
    pub created_at: DateTime<Utc>,
}

pub struct NewImportJob {
    pub user_id: Uuid,
    pub idempotency_key: String,
    pub mode: ImportMode,
    pub filename: String,
    pub s3_key: String,
}

#[derive(thiserror::Error, Debug)]
pub enum JobRepoError {
    #[error("a job with this idempotency key already exists for this user")]
    Duplicate,
    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn find_by_user_and_key(&self, user_id: Uuid, idempotency_key: &str) -> Result<Option<ImportJob>, sqlx::Error> {
        sqlx::query_as!(
            ImportJob,
            r#"
            SELECT
                id, user_id, idempotency_key,
                status AS "status: JobStatus",
                mode AS "mode: ImportMode",
                filename, s3_key, total_rows, processed_rows, error,
                error_report_object_key, error_count, created_at
            FROM import_jobs
            WHERE user_id = $1 AND idempotency_key = $2
            "#,
            user_id,
            idempotency_key,
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// Inserts a fresh `pending` job. On a unique-constraint hit (a
    /// concurrent submission with the same `(user_id, idempotency_key)` won
    /// the race), returns `JobRepoError::Duplicate` so the caller can
    /// re-read and return the winning row instead.
    pub async fn insert(&self, new: NewImportJob) -> Result<ImportJob, JobRepoError> {
        let id = Uuid::new_v4();
        sqlx::query_as!(
            ImportJob,
            r#"
            INSERT INTO import_jobs
                (id, user_id, idempotency_key, status, mode, filename, s3_key, total_rows, processed_rows, created_at)
            VALUES
                ($1, $2, $3, 'pending', $4, $5, $6, 0, 0, now())
            RETURNING
                id, user_id, idempotency_key,
                status AS "status: JobStatus",
                mode AS "mode: ImportMode",
                filename, s3_key, total_rows, processed_rows, error,
                error_report_object_key, error_count, created_at
            "#,
            id,
            new.user_id,
            new.idempotency_key,
            new.mode.as_str(),
            new.filename,
            new.s3_key,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| if is_unique_violation(&e) { JobRepoError::Duplicate } else { JobRepoError::Other(e) })
    }

    /// Scoped read for HTTP handlers: a job not owned by `user_id` is
    /// indistinguishable from a nonexistent one.
    pub async fn get_for_user(&self, id: Uuid, user_id: Uuid) -> Result<Option<ImportJob>, sqlx::Error> {
        sqlx::query_as!(
            ImportJob,
            r#"
            SELECT
                id, user_id, idempotency_key,
                status AS "status: JobStatus",
                mode AS "mode: ImportMode",
                filename, s3_key, total_rows, processed_rows, error,
                error_report_object_key, error_count, created_at
            FROM import_jobs
            WHERE id = $1 AND user_id = $2
            "#,
            id,
            user_id,
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// Unscoped read for the worker, which owns a job by id alone.
    pub async fn get(&self, id: Uuid) -> Result<Option<ImportJob>, sqlx::Error> {
        sqlx::query_as!(
            ImportJob,
            r#"
            SELECT
                id, user_id, idempotency_key,
                status AS "status: JobStatus",
                mode AS "mode: ImportMode",
                filename, s3_key, total_rows, processed_rows, error,
                error_report_object_key, error_count, created_at
            FROM import_jobs
            WHERE id = $1
            "#,
            id,
        )
        .fetch_optional(&self.pool)
        .await
    }

    /// The worker's entry guard: transitions `pending -> processing`,
    /// clearing `error` and resetting `processed_rows`. Any other starting
    /// status leaves the row untouched and returns `false`, which the
    /// worker treats as a redelivery to no-op (logged at warning level).
    pub async fn try_start_processing(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query!(
            r#"
            UPDATE import_jobs
            SET status = 'processing', error = NULL, processed_rows = 0
            WHERE id = $1 AND status = 'pending'
            "#,
            id,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_total_rows(&self, id: Uuid, total_rows: i64) -> Result<(), sqlx::Error> {
        sqlx::query!("UPDATE import_jobs SET total_rows = $2 WHERE id = $1", id, total_rows)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn bump_processed_rows(&self, id: Uuid, processed_rows: i64) -> Result<(), sqlx::Error> {
        sqlx::query!("UPDATE import_jobs SET processed_rows = $2 WHERE id = $1", id, processed_rows)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn finalize_done(&self, id: Uuid, processed_rows: i64) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            UPDATE import_jobs
            SET status = 'done', error = NULL, error_report_object_key = NULL, error_count = 0, processed_rows = $2
            WHERE id = $1
            "#,
            id,
            processed_rows,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_failed(
        &self,
        id: Uuid,
        processed_rows: i64,
        error: &str,
        error_report_object_key: Option<&str>,
        error_count: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query!(
            r#"
            UPDATE import_jobs
            SET status = 'failed', error = $2, error_report_object_key = $3, error_count = $4, processed_rows = $5
            WHERE id = $1
            "#,
            id,
            error,
            error_report_object_key,
            error_count,
            processed_rows,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Marks a job `failed` before the worker ever sees it, used by the
    /// submission path when enqueueing onto the broker fails.
    pub async fn mark_failed_on_enqueue(&self, id: Uuid, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query!("UPDATE import_jobs SET status = 'failed', error = $2 WHERE id = $1", id, error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
