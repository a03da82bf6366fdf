//! In-process broker
//!
//! FIFO queue for tests and single-process deployments. Retries go to the
//! back of the queue immediately; there is no backoff and nothing survives a
//! restart.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use lumen_core::models::JobType;
use lumen_core::{Broker, JobOutcome, QueuedJob};

#[derive(Default)]
struct State {
    ready: VecDeque<QueuedJob>,
    /// Dequeued and not yet acked
    in_flight: HashMap<Uuid, QueuedJob>,
    /// Permanently failed or out of attempts
    dead: Vec<(QueuedJob, String)>,
    completed: Vec<Uuid>,
}

pub struct MemoryBroker {
    state: Mutex<State>,
    max_attempts: u32,
}

impl MemoryBroker {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            max_attempts: max_attempts.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Jobs waiting to be dequeued
    pub fn pending(&self) -> usize {
        self.lock().ready.len()
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Queue ids acked as completed, in ack order
    pub fn completed(&self) -> Vec<Uuid> {
        self.lock().completed.clone()
    }

    /// Dead-lettered jobs with their last error
    pub fn dead_letters(&self) -> Vec<(QueuedJob, String)> {
        self.lock().dead.clone()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn enqueue(&self, job_type: JobType, payload: serde_json::Value) -> anyhow::Result<Uuid> {
        let id = Uuid::new_v4();
        self.lock().ready.push_back(QueuedJob {
            id,
            job_type,
            payload,
            attempt: 0,
        });
        tracing::debug!(queue_id = %id, job_type = %job_type, "Job enqueued in memory");
        Ok(id)
    }

    async fn dequeue(&self) -> anyhow::Result<Option<QueuedJob>> {
        let mut state = self.lock();
        let Some(mut job) = state.ready.pop_front() else {
            return Ok(None);
        };
        job.attempt += 1;
        state.in_flight.insert(job.id, job.clone());
        Ok(Some(job))
    }

    async fn ack(&self, queue_id: Uuid, outcome: JobOutcome) -> anyhow::Result<()> {
        let mut state = self.lock();
        let job = state
            .in_flight
            .remove(&queue_id)
            .ok_or_else(|| anyhow::anyhow!("Job {queue_id} is not in flight"))?;

        match outcome {
            JobOutcome::Completed => state.completed.push(queue_id),
            JobOutcome::Discard { error } => {
                tracing::warn!(queue_id = %queue_id, error = %error, "Job discarded");
                state.dead.push((job, error));
            }
            JobOutcome::Retry { error } => {
                if job.attempt >= self.max_attempts {
                    tracing::warn!(
                        queue_id = %queue_id,
                        attempts = job.attempt,
                        error = %error,
                        "Job exhausted its attempts"
                    );
                    state.dead.push((job, error));
                } else {
                    tracing::info!(queue_id = %queue_id, attempt = job.attempt, "Job requeued");
                    state.ready.push_back(job);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fifo_with_attempt_counting() {
        let broker = MemoryBroker::new(3);
        let first = broker.enqueue(JobType::Thumbnail, json!({"n": 1})).await.unwrap();
        let second = broker.enqueue(JobType::Resize, json!({"n": 2})).await.unwrap();

        let job = broker.dequeue().await.unwrap().unwrap();
        assert_eq!(job.id, first);
        assert_eq!(job.attempt, 1);
        assert_eq!(broker.in_flight(), 1);

        broker.ack(first, JobOutcome::Completed).await.unwrap();
        assert_eq!(broker.completed(), vec![first]);
        assert_eq!(broker.dequeue().await.unwrap().unwrap().id, second);
        assert!(broker.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_retry_until_attempts_exhausted() {
        let broker = MemoryBroker::new(2);
        let id = broker.enqueue(JobType::Webp, json!({})).await.unwrap();

        let job = broker.dequeue().await.unwrap().unwrap();
        broker
            .ack(job.id, JobOutcome::Retry { error: "reset".into() })
            .await
            .unwrap();
        assert_eq!(broker.pending(), 1);

        let job = broker.dequeue().await.unwrap().unwrap();
        assert_eq!(job.attempt, 2);
        broker
            .ack(job.id, JobOutcome::Retry { error: "reset again".into() })
            .await
            .unwrap();

        assert_eq!(broker.pending(), 0);
        let dead = broker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0.id, id);
        assert_eq!(dead[0].1, "reset again");
    }

    #[tokio::test]
    async fn test_discard_is_never_redelivered() {
        let broker = MemoryBroker::new(5);
        broker.enqueue(JobType::Convert, json!({})).await.unwrap();
        let job = broker.dequeue().await.unwrap().unwrap();
        broker
            .ack(job.id, JobOutcome::Discard { error: "bad payload".into() })
            .await
            .unwrap();
        assert!(broker.dequeue().await.unwrap().is_none());
        assert_eq!(broker.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_ack_unknown_job_fails() {
        let broker = MemoryBroker::default();
        assert!(broker.ack(Uuid::new_v4(), JobOutcome::Completed).await.is_err());
    }
}
