use anyhow::{Context, Result};
use uuid::Uuid;

use lumen_core::models::{JobPayload, JobType};
use lumen_core::Broker;
use lumen_db::Queries;

/// Identifiers of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedJob {
    /// `processing_jobs` row
    pub job_id: Uuid,
    /// Broker-level id
    pub queue_id: Uuid,
}

/// Create the job record for `payload`, link it into the payload and enqueue.
///
/// The record is created first so the job is visible as `pending` before any
/// worker can pick it up.
#[tracing::instrument(skip(queries, broker, payload), fields(file_id = %payload.file_id()))]
pub async fn submit_job<P: JobPayload>(
    queries: &dyn Queries,
    broker: &dyn Broker,
    job_type: JobType,
    mut payload: P,
) -> Result<SubmittedJob> {
    let job = queries
        .create_job(payload.file_id(), job_type)
        .await
        .context("Failed to create job record")?;
    payload.set_job_id(job.id);

    let value = serde_json::to_value(&payload).context("Failed to serialize job payload")?;
    let queue_id = match broker.enqueue(job_type, value).await {
        Ok(id) => id,
        Err(e) => {
            // Leave no pending record that nothing will ever run
            if let Err(mark_err) = queries
                .mark_job_failed(job.id, &format!("Failed to enqueue: {e:#}"))
                .await
            {
                tracing::warn!(error = %mark_err, job_id = %job.id, "Failed to mark unqueued job failed");
            }
            return Err(e.context("Failed to enqueue job"));
        }
    };

    tracing::info!(job_id = %job.id, queue_id = %queue_id, job_type = %job_type, "Job submitted");
    Ok(SubmittedJob {
        job_id: job.id,
        queue_id,
    })
}
