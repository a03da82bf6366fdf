//! Job transport contract.
//!
//! Retry and backoff live in the broker implementation. Handlers only report
//! how an attempt ended through [`JobOutcome`].

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::models::JobType;

/// A job handed to a worker by the broker
#[derive(Debug, Clone)]
pub struct QueuedJob {
    /// Queue-level identity (distinct from the `processing_jobs` row id)
    pub id: Uuid,
    pub job_type: JobType,
    pub payload: serde_json::Value,
    /// 1 on the first delivery
    pub attempt: u32,
}

impl QueuedJob {
    pub fn unmarshal_payload<P: DeserializeOwned>(&self) -> Result<P, serde_json::Error> {
        P::deserialize(&self.payload)
    }
}

/// How an attempt ended, as reported back to the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    /// Transient failure; the broker may deliver the job again
    Retry { error: String },
    /// Permanent failure; the broker must not deliver the job again
    Discard { error: String },
}

#[async_trait]
pub trait Broker: Send + Sync {
    /// Queue a payload for `job_type` and return the queue id.
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> anyhow::Result<Uuid>;

    /// Take the next ready job, if any.
    async fn dequeue(&self) -> anyhow::Result<Option<QueuedJob>>;

    /// Report the outcome of a dequeued job.
    async fn ack(&self, queue_id: Uuid, outcome: JobOutcome) -> anyhow::Result<()>;
}
