//! Fixed-size worker pool
//!
//! Polls the broker while a permit is free, runs each job on its own task and
//! acks the outcome. A handler error marked permanent is discarded, anything
//! else is handed back for retry.
//!
//! Each job gets a child of the shutdown token. The per-job timeout cancels
//! that child so the handler can record the failure itself; a handler that
//! ignores cancellation is dropped after a grace period, which kills any
//! external tool it started. [`WorkerPool::run`] returns once every in-flight
//! job has been acked.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use lumen_core::{Broker, JobOutcome, QueuedJob, WorkerConfig};

use crate::handler::Handlers;

/// Time a cancelled handler gets to wind down before it is dropped
const CANCEL_GRACE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub job_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            poll_interval: Duration::from_millis(1000),
            job_timeout: Duration::from_secs(3600),
        }
    }
}

impl From<&WorkerConfig> for WorkerPoolConfig {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            job_timeout: Duration::from_secs(config.job_timeout_seconds.max(1)),
        }
    }
}

pub struct WorkerPool {
    broker: Arc<dyn Broker>,
    handlers: Arc<Handlers>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(broker: Arc<dyn Broker>, handlers: Handlers, config: WorkerPoolConfig) -> Self {
        Self {
            broker,
            handlers: Arc::new(handlers),
            config,
        }
    }

    /// Run until `shutdown` is cancelled, then wait for in-flight jobs.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            job_timeout_secs = self.config.job_timeout.as_secs(),
            job_types = ?self.handlers.job_types(),
            "Worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            reap(&mut in_flight);
            if shutdown.is_cancelled() {
                break;
            }

            // Keep claiming while there is both capacity and work
            if self
                .claim_and_dispatch_one(&semaphore, &mut in_flight, &shutdown)
                .await
            {
                continue;
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.poll_interval) => {}
            }
        }

        tracing::info!(in_flight = in_flight.len(), "Worker pool shutting down");
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Job task panicked");
            }
        }
        tracing::info!("Worker pool stopped");
    }

    async fn claim_and_dispatch_one(
        &self,
        semaphore: &Arc<Semaphore>,
        in_flight: &mut JoinSet<()>,
        shutdown: &CancellationToken,
    ) -> bool {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::trace!("No workers available, skipping claim");
                return false;
            }
        };

        match self.broker.dequeue().await {
            Ok(Some(job)) => {
                let broker = self.broker.clone();
                let handlers = self.handlers.clone();
                let timeout = self.config.job_timeout;
                let shutdown = shutdown.clone();
                in_flight.spawn(async move {
                    let _permit = permit;
                    run_job(broker, handlers, job, shutdown, timeout).await;
                });
                true
            }
            Ok(None) => {
                tracing::trace!("No jobs available in queue");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to dequeue job");
                false
            }
        }
    }
}

fn reap(in_flight: &mut JoinSet<()>) {
    while let Some(result) = in_flight.try_join_next() {
        if let Err(e) = result {
            tracing::error!(error = %e, "Job task panicked");
        }
    }
}

/// Execute one job and ack its outcome with the broker
#[tracing::instrument(
    skip(broker, handlers, job, shutdown),
    fields(queue_id = %job.id, job_type = %job.job_type, attempt = job.attempt)
)]
pub(crate) async fn run_job(
    broker: Arc<dyn Broker>,
    handlers: Arc<Handlers>,
    job: QueuedJob,
    shutdown: CancellationToken,
    timeout: Duration,
) -> JobOutcome {
    let started = Instant::now();
    let cancel = shutdown.child_token();

    let timer = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            sleep(timeout).await;
            cancel.cancel();
        })
    };

    let result =
        tokio::time::timeout(timeout + CANCEL_GRACE_PERIOD, handlers.dispatch(&job, &cancel)).await;
    timer.abort();

    let timed_out = cancel.is_cancelled() && !shutdown.is_cancelled();
    let outcome = match result {
        Ok(Ok(())) => JobOutcome::Completed,
        Ok(Err(e)) if e.is_permanent() => JobOutcome::Discard {
            error: e.to_string(),
        },
        Ok(Err(e)) if timed_out => JobOutcome::Retry {
            error: format!("Timed out after {}s: {e}", timeout.as_secs()),
        },
        Ok(Err(e)) => JobOutcome::Retry {
            error: e.to_string(),
        },
        Err(_) => JobOutcome::Retry {
            error: format!(
                "Handler did not stop within {}s of cancellation",
                CANCEL_GRACE_PERIOD.as_secs()
            ),
        },
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    match &outcome {
        JobOutcome::Completed => tracing::debug!(duration_ms = duration_ms, "Job succeeded"),
        JobOutcome::Discard { error } => {
            tracing::error!(duration_ms = duration_ms, error = %error, "Job failed permanently")
        }
        JobOutcome::Retry { error } => {
            tracing::warn!(duration_ms = duration_ms, error = %error, "Job failed, retry requested")
        }
    }

    if let Err(e) = broker.ack(job.id, outcome.clone()).await {
        tracing::error!(error = %e, "Failed to ack job");
    }
    outcome
}
