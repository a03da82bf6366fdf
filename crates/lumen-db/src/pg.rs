use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use lumen_core::models::{
    File, FileStatus, JobType, NewVariant, ProcessingJob, UserSettings, Variant, WebhookEndpoint,
};

use crate::error::{DbError, DbResult};
use crate::queries::Queries;

const FILE_COLUMNS: &str = "id, user_id, storage_key, content_type, size_bytes, status, deleted, \
     original_deleted, created_at, updated_at";

const JOB_COLUMNS: &str =
    "id, file_id, job_type, status, error_message, created_at, started_at, completed_at";

const VARIANT_COLUMNS: &str = "id, file_id, variant_type, content_type, size_bytes, storage_key, \
     width, height, duration_seconds, resolution, created_at";

/// Postgres implementation of [`Queries`]
#[derive(Clone)]
pub struct PgQueries {
    pool: PgPool,
}

impl PgQueries {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn expect_one(rows: u64, entity: &'static str, id: Uuid) -> DbResult<()> {
        if rows == 0 {
            Err(DbError::not_found(entity, id))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Queries for PgQueries {
    #[tracing::instrument(skip(self))]
    async fn get_file(&self, file_id: Uuid) -> DbResult<Option<File>> {
        let file = sqlx::query_as::<Postgres, File>(&format!(
            "SELECT {FILE_COLUMNS} FROM files WHERE id = $1"
        ))
        .bind(file_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(file)
    }

    #[tracing::instrument(skip(self))]
    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE files
            SET status = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(file_id)
        .bind(status)
        .execute(&self.pool)
        .await?;

        Self::expect_one(result.rows_affected(), "file", file_id)?;
        tracing::debug!(file_id = %file_id, status = %status, "File status updated");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn mark_original_deleted(&self, file_id: Uuid) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE files SET original_deleted = TRUE, updated_at = NOW() WHERE id = $1",
        )
        .bind(file_id)
        .execute(&self.pool)
        .await?;
        Self::expect_one(result.rows_affected(), "file", file_id)
    }

    #[tracing::instrument(skip(self))]
    async fn create_job(&self, file_id: Uuid, job_type: JobType) -> DbResult<ProcessingJob> {
        let job = sqlx::query_as::<Postgres, ProcessingJob>(&format!(
            r#"
            INSERT INTO processing_jobs (id, file_id, job_type, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(file_id)
        .bind(job_type)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(job_id = %job.id, file_id = %file_id, job_type = %job_type, "Job record created");
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ProcessingJob>> {
        let job = sqlx::query_as::<Postgres, ProcessingJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_job_running(&self, job_id: Uuid) -> DbResult<()> {
        // A retried attempt restarts the clock and clears the previous error
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'running',
                started_at = NOW(),
                completed_at = NULL,
                error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Self::expect_one(result.rows_affected(), "job", job_id)
    }

    #[tracing::instrument(skip(self))]
    async fn mark_job_completed(&self, job_id: Uuid) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'completed',
                completed_at = NOW(),
                error_message = NULL
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .execute(&self.pool)
        .await?;
        Self::expect_one(result.rows_affected(), "job", job_id)
    }

    #[tracing::instrument(skip(self, error))]
    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE processing_jobs
            SET status = 'failed',
                completed_at = NOW(),
                error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Self::expect_one(result.rows_affected(), "job", job_id)
    }

    #[tracing::instrument(skip(self, variant), fields(file_id = %variant.file_id, variant_type = %variant.variant_type))]
    async fn create_variant(&self, variant: NewVariant) -> DbResult<Variant> {
        let row = sqlx::query_as::<Postgres, Variant>(&format!(
            r#"
            INSERT INTO variants (
                id, file_id, variant_type, content_type, size_bytes, storage_key,
                width, height, duration_seconds, resolution
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {VARIANT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(variant.file_id)
        .bind(variant.variant_type)
        .bind(&variant.content_type)
        .bind(variant.size_bytes)
        .bind(&variant.storage_key)
        .bind(variant.width)
        .bind(variant.height)
        .bind(variant.duration_seconds)
        .bind(&variant.resolution)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self))]
    async fn list_variants(&self, file_id: Uuid) -> DbResult<Vec<Variant>> {
        let rows = sqlx::query_as::<Postgres, Variant>(&format!(
            "SELECT {VARIANT_COLUMNS} FROM variants WHERE file_id = $1 ORDER BY created_at ASC"
        ))
        .bind(file_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    #[tracing::instrument(skip(self))]
    async fn increment_usage(&self, user_id: Uuid, bytes: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_counters (user_id, bytes_processed, jobs_completed)
            VALUES ($1, $2, 1)
            ON CONFLICT (user_id) DO UPDATE
            SET bytes_processed = usage_counters.bytes_processed + EXCLUDED.bytes_processed,
                jobs_completed = usage_counters.jobs_completed + 1,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(bytes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn get_user_settings(&self, user_id: Uuid) -> DbResult<UserSettings> {
        let settings = sqlx::query_as::<Postgres, UserSettings>(
            "SELECT user_id, auto_delete_original FROM user_settings WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(settings.unwrap_or(UserSettings {
            user_id,
            auto_delete_original: false,
        }))
    }

    #[tracing::instrument(skip(self))]
    async fn webhook_endpoints(&self, user_id: Uuid) -> DbResult<Vec<WebhookEndpoint>> {
        let endpoints = sqlx::query_as::<Postgres, WebhookEndpoint>(
            r#"
            SELECT id, user_id, url, signing_secret, events, is_active
            FROM webhook_endpoints
            WHERE user_id = $1 AND is_active = TRUE
            ORDER BY created_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(endpoints)
    }
}
