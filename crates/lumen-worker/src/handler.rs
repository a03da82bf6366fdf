//! Job handler contract and dispatch table
//!
//! The worker pool hands every dequeued job to [`Handlers::dispatch`], which
//! routes it by job type to the registered [`JobHandler`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use lumen_core::models::JobType;
use lumen_core::{JobError, QueuedJob};

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Execute one attempt. Cancelling `cancel` must make the handler return
    /// promptly with a transient error.
    async fn handle(&self, job: &QueuedJob, cancel: &CancellationToken) -> Result<(), JobError>;
}

/// Job type → handler map
#[derive(Clone, Default)]
pub struct Handlers {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under its own job type, replacing any previous one
    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        let job_type = handler.job_type();
        if self.handlers.insert(job_type, handler).is_some() {
            tracing::debug!(job_type = %job_type, "Replacing registered job handler");
        }
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Registered job types, in [`JobType::ALL`] order
    pub fn job_types(&self) -> Vec<JobType> {
        JobType::ALL
            .iter()
            .copied()
            .filter(|t| self.handlers.contains_key(t))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Route `job` to its handler. A job nobody handles can never succeed.
    pub async fn dispatch(&self, job: &QueuedJob, cancel: &CancellationToken) -> Result<(), JobError> {
        match self.handlers.get(&job.job_type) {
            Some(handler) => handler.handle(job, cancel).await,
            None => Err(JobError::permanent(anyhow::anyhow!(
                "No handler registered for job type {}",
                job.job_type
            ))),
        }
    }
}
