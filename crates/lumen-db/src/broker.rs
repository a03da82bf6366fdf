//! Postgres-backed job queue
//!
//! Jobs are claimed with `FOR UPDATE SKIP LOCKED` so any number of workers
//! can poll the same table. Transient failures are rescheduled with
//! exponential backoff; permanent failures and exhausted jobs are parked as
//! `dead` for inspection.

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use lumen_core::models::JobType;
use lumen_core::{Broker, JobOutcome, QueuedJob};

use crate::error::{DbError, DbResult};

/// Upper bound on the retry delay
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Delay before the next delivery after `attempt` failed deliveries:
/// 2^attempt seconds, capped at [`MAX_RETRY_BACKOFF_SECS`].
pub fn compute_retry_backoff_seconds(attempt: u32) -> u64 {
    2u64.checked_pow(attempt)
        .unwrap_or(MAX_RETRY_BACKOFF_SECS)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
    max_attempts: u32,
}

impl PgBroker {
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Return jobs stuck in `running` (worker crashed mid-job) to the queue
    #[tracing::instrument(skip(self))]
    pub async fn requeue_stale(&self, older_than: Duration) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'pending',
                locked_at = NULL,
                run_at = NOW(),
                updated_at = NOW()
            WHERE status = 'running'
                AND locked_at < NOW() - make_interval(secs => $1)
            "#,
        )
        .bind(older_than.num_seconds() as f64)
        .execute(&self.pool)
        .await?;

        let count = result.rows_affected();
        if count > 0 {
            tracing::warn!(count = count, "Requeued stale running jobs");
        }
        Ok(count)
    }

    async fn claim(&self) -> DbResult<Option<QueuedJob>> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(Uuid, String, serde_json::Value, i32)> = sqlx::query_as(
            r#"
            SELECT id, job_type, payload, attempts
            FROM job_queue
            WHERE status = 'pending'
                AND run_at <= NOW()
            ORDER BY run_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, job_type, payload, attempts)) = row else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'running',
                attempts = attempts + 1,
                locked_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        let job_type: JobType = job_type
            .parse()
            .map_err(|e: anyhow::Error| DbError::InvalidData(e.to_string()))?;

        tracing::debug!(queue_id = %id, job_type = %job_type, attempt = attempts + 1, "Job claimed");

        Ok(Some(QueuedJob {
            id,
            job_type,
            payload,
            attempt: (attempts + 1).max(1) as u32,
        }))
    }

    async fn park(&self, queue_id: Uuid, error: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE job_queue
            SET status = 'dead',
                last_error = $2,
                locked_at = NULL,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(queue_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl Broker for PgBroker {
    #[tracing::instrument(skip(self, payload))]
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> anyhow::Result<Uuid> {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO job_queue (id, job_type, payload, max_attempts)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(job_type.as_str())
        .bind(payload)
        .bind(self.max_attempts as i32)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(queue_id = %id, job_type = %job_type, "Job enqueued");
        Ok(id)
    }

    async fn dequeue(&self) -> anyhow::Result<Option<QueuedJob>> {
        Ok(self.claim().await?)
    }

    #[tracing::instrument(skip(self, outcome))]
    async fn ack(&self, queue_id: Uuid, outcome: JobOutcome) -> anyhow::Result<()> {
        match outcome {
            JobOutcome::Completed => {
                sqlx::query(
                    r#"
                    UPDATE job_queue
                    SET status = 'completed',
                        locked_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(queue_id)
                .execute(&self.pool)
                .await?;
            }
            JobOutcome::Discard { error } => {
                tracing::warn!(queue_id = %queue_id, error = %error, "Job discarded");
                self.park(queue_id, &error).await?;
            }
            JobOutcome::Retry { error } => {
                let (attempts, max_attempts): (i32, i32) =
                    sqlx::query_as("SELECT attempts, max_attempts FROM job_queue WHERE id = $1")
                        .bind(queue_id)
                        .fetch_optional(&self.pool)
                        .await?
                        .ok_or_else(|| DbError::not_found("queued job", queue_id))?;

                if attempts >= max_attempts {
                    tracing::warn!(
                        queue_id = %queue_id,
                        attempts = attempts,
                        error = %error,
                        "Job exhausted its attempts"
                    );
                    self.park(queue_id, &error).await?;
                    return Ok(());
                }

                let backoff = compute_retry_backoff_seconds(attempts.max(0) as u32);
                sqlx::query(
                    r#"
                    UPDATE job_queue
                    SET status = 'pending',
                        last_error = $2,
                        run_at = NOW() + make_interval(secs => $3),
                        locked_at = NULL,
                        updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(queue_id)
                .bind(&error)
                .bind(backoff as f64)
                .execute(&self.pool)
                .await?;

                tracing::info!(
                    queue_id = %queue_id,
                    attempt = attempts,
                    backoff_secs = backoff,
                    "Job scheduled for retry"
                );
            }
        }
        Ok(())
    }
}
