//! Persistence contract used by the job pipeline

use async_trait::async_trait;
use lumen_core::models::{
    File, FileStatus, JobType, NewVariant, ProcessingJob, UserSettings, Variant, WebhookEndpoint,
};
use uuid::Uuid;

use crate::error::DbResult;

/// Everything the processing pipeline reads or writes.
///
/// Implementations must be safe to share between concurrent jobs.
#[async_trait]
pub trait Queries: Send + Sync {
    /// `None` when no row exists
    async fn get_file(&self, file_id: Uuid) -> DbResult<Option<File>>;

    async fn update_file_status(&self, file_id: Uuid, status: FileStatus) -> DbResult<()>;

    async fn mark_original_deleted(&self, file_id: Uuid) -> DbResult<()>;

    /// Insert a pending job record
    async fn create_job(&self, file_id: Uuid, job_type: JobType) -> DbResult<ProcessingJob>;

    async fn get_job(&self, job_id: Uuid) -> DbResult<Option<ProcessingJob>>;

    async fn mark_job_running(&self, job_id: Uuid) -> DbResult<()>;

    async fn mark_job_completed(&self, job_id: Uuid) -> DbResult<()>;

    async fn mark_job_failed(&self, job_id: Uuid, error: &str) -> DbResult<()>;

    /// Always inserts; variants are never deduplicated
    async fn create_variant(&self, variant: NewVariant) -> DbResult<Variant>;

    async fn list_variants(&self, file_id: Uuid) -> DbResult<Vec<Variant>>;

    /// Add produced bytes and one completed job to the user's counters
    async fn increment_usage(&self, user_id: Uuid, bytes: i64) -> DbResult<()>;

    /// Stored settings, or defaults when the user has none
    async fn get_user_settings(&self, user_id: Uuid) -> DbResult<UserSettings>;

    async fn webhook_endpoints(&self, user_id: Uuid) -> DbResult<Vec<WebhookEndpoint>>;
}
