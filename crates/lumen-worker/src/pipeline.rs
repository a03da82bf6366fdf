//! Generic file job pipeline
//!
//! Every single-output job runs the same steps: resolve the job record, mark
//! it running, load and validate the file, check the named processor accepts
//! its content type, download the original, run the processor, upload the
//! result, record the variant and mark the job
//! completed. What differs between job types (processor, variant type,
//! filename, options, key layout, validation and bookkeeping flags) is data
//! in a [`JobConfig`], executed by [`FileJobBuilder`].
//!
//! Failures are classified once: a bad payload, a missing or unsuitable file
//! and a processor rejecting its input are permanent; storage, database and
//! cancellation failures are transient and left to the broker.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lumen_core::models::{
    variant_storage_key, File, FileStatus, JobPayload, JobType, NewVariant, Variant, VariantType,
};
use lumen_core::{
    JobError, JobResultExt, QueuedJob, WebhookDispatcher, WebhookEvent, WebhookEventType,
};
use lumen_db::Queries;
use lumen_processing::{ProcessOptions, ProcessorError, ProcessorResult, Registry};
use lumen_storage::Storage;

use crate::handler::JobHandler;

/// Shared collaborators every job handler needs
#[derive(Clone)]
pub struct JobDeps {
    pub storage: Arc<dyn Storage>,
    pub queries: Arc<dyn Queries>,
    pub registry: Registry,
    pub webhooks: Arc<dyn WebhookDispatcher>,
}

pub type FilenameFn<P> = fn(&P, &ProcessorResult) -> String;
pub type OptionsFn<P> = fn(&P) -> ProcessOptions;
/// Returns the variant type and full storage key for a produced filename
pub type VariantKeyFn<P> = fn(&P, Uuid, &str, &ProcessorResult) -> (VariantType, String);
/// Rejects a payload/file combination before any download happens
pub type ValidateFn<P> = fn(&P, &File) -> Result<(), String>;

/// Declarative description of one single-output job type
pub struct JobConfig<P> {
    pub job_type: JobType,
    /// Registry name of the processor to run
    pub processor: &'static str,
    pub variant_type: VariantType,
    pub filename: FilenameFn<P>,
    pub options: OptionsFn<P>,
    /// Overrides `processed/{file_id}/{variant_type}/{filename}`
    pub variant_key: Option<VariantKeyFn<P>>,
    pub validate: Option<ValidateFn<P>>,
    /// Move the file to `processing`, then `completed` or (on a permanent
    /// failure) `failed`
    pub complete_file: bool,
    /// Fire `processing.completed` / `processing.failed` webhooks
    pub notify: bool,
    /// Honor the owner's auto-delete-original setting after success
    pub delete_original: bool,
}

impl<P> JobConfig<P> {
    pub fn new(
        job_type: JobType,
        processor: &'static str,
        variant_type: VariantType,
        filename: FilenameFn<P>,
        options: OptionsFn<P>,
    ) -> Self {
        Self {
            job_type,
            processor,
            variant_type,
            filename,
            options,
            variant_key: None,
            validate: None,
            complete_file: false,
            notify: true,
            delete_original: false,
        }
    }

    pub fn with_variant_key(mut self, variant_key: VariantKeyFn<P>) -> Self {
        self.variant_key = Some(variant_key);
        self
    }

    pub fn with_validation(mut self, validate: ValidateFn<P>) -> Self {
        self.validate = Some(validate);
        self
    }

    pub fn completes_file(mut self) -> Self {
        self.complete_file = true;
        self
    }

    pub fn without_notifications(mut self) -> Self {
        self.notify = false;
        self
    }

    pub fn deletes_original(mut self) -> Self {
        self.delete_original = true;
        self
    }
}

/// Executes a [`JobConfig`] against queued payloads of type `P`
pub struct FileJobBuilder<P> {
    deps: JobDeps,
    config: JobConfig<P>,
}

impl<P: JobPayload> FileJobBuilder<P> {
    pub fn new(deps: JobDeps, config: JobConfig<P>) -> Self {
        Self { deps, config }
    }

    pub fn config(&self) -> &JobConfig<P> {
        &self.config
    }

    async fn execute(
        &self,
        scope: &JobScope<'_>,
        payload: &P,
        file_slot: &mut Option<File>,
        cancel: &CancellationToken,
    ) -> Result<Variant, JobError> {
        let config = &self.config;
        let file = file_slot.insert(scope.begin().await?);

        if let Some(validate) = config.validate {
            validate(payload, file)
                .map_err(|reason| JobError::permanent(anyhow::anyhow!(reason)))?;
        }

        let processor = self.deps.registry.get_or_error(config.processor).permanent()?;
        processor
            .ensure_supports(&file.content_type)
            .map_err(classify_processor_error)?;

        let input = scope.download(file, cancel).await?;
        let options = (config.options)(payload);

        let started = Instant::now();
        let result = cancellable(cancel, "processing", async {
            processor
                .process(Some(&options), input)
                .await
                .map_err(classify_processor_error)
        })
        .await?;

        tracing::debug!(
            processor = config.processor,
            output_bytes = result.size,
            duration_ms = started.elapsed().as_millis() as u64,
            "Processor finished"
        );

        let filename = (config.filename)(payload, &result);
        let (variant_type, storage_key) = match config.variant_key {
            Some(build_key) => build_key(payload, file.id, &filename, &result),
            None => (
                config.variant_type,
                variant_storage_key(file.id, config.variant_type, &filename),
            ),
        };

        scope
            .upload(&storage_key, result.data.clone(), &result.content_type, cancel)
            .await?;

        let variant = self
            .deps
            .queries
            .create_variant(new_variant(file.id, variant_type, storage_key, &result))
            .await
            .context("Failed to record variant")
            .transient()?;

        scope.complete(file, &variant).await?;

        if config.delete_original {
            scope.delete_original_if_configured(file).await;
        }

        Ok(variant)
    }
}

#[async_trait]
impl<P: JobPayload> JobHandler for FileJobBuilder<P> {
    fn job_type(&self) -> JobType {
        self.config.job_type
    }

    #[tracing::instrument(
        skip(self, job, cancel),
        fields(
            queue_id = %job.id,
            job_type = %self.config.job_type,
            attempt = job.attempt,
            file_id = tracing::field::Empty,
            job_id = tracing::field::Empty
        )
    )]
    async fn handle(&self, job: &QueuedJob, cancel: &CancellationToken) -> Result<(), JobError> {
        let job_type = self.config.job_type;
        let mut payload: P = job
            .unmarshal_payload()
            .with_context(|| format!("Failed to parse {job_type} payload"))
            .permanent()?;

        let file_id = payload.file_id();
        let job_id = ensure_job_record(&self.deps, job_type, &mut payload).await?;

        let span = tracing::Span::current();
        span.record("file_id", tracing::field::display(file_id));
        span.record("job_id", tracing::field::display(job_id));

        let scope = JobScope {
            deps: &self.deps,
            job_type,
            file_id,
            job_id,
            complete_file: self.config.complete_file,
            notify: self.config.notify,
        };

        let started = Instant::now();
        let mut file = None;
        match self.execute(&scope, &payload, &mut file, cancel).await {
            Ok(variant) => {
                tracing::info!(
                    variant_type = %variant.variant_type,
                    storage_key = %variant.storage_key,
                    size_bytes = variant.size_bytes,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed"
                );
                Ok(())
            }
            Err(e) => {
                let e = e.context(format!("{job_type} job for file {file_id}"));
                scope.fail(file.as_ref(), &e).await;
                Err(e)
            }
        }
    }
}

/// Return the payload's job id, creating the `processing_jobs` row first
/// when the payload was enqueued without one.
pub(crate) async fn ensure_job_record<P: JobPayload>(
    deps: &JobDeps,
    job_type: JobType,
    payload: &mut P,
) -> Result<Uuid, JobError> {
    if let Some(job_id) = payload.job_id() {
        return Ok(job_id);
    }

    let file_id = payload.file_id();
    // A missing file would otherwise surface as a foreign key violation and
    // be retried
    if deps
        .queries
        .get_file(file_id)
        .await
        .context("Failed to load file")
        .transient()?
        .is_none()
    {
        return Err(JobError::permanent(anyhow::anyhow!("File {file_id} not found")));
    }

    let job = deps
        .queries
        .create_job(file_id, job_type)
        .await
        .context("Failed to create job record")
        .transient()?;
    payload.set_job_id(job.id);
    tracing::debug!(job_id = %job.id, "Created job record for payload without one");
    Ok(job.id)
}

/// Run `fut` unless `cancel` fires first, which yields a transient error.
/// Dropping `fut` kills any external tool it started.
pub(crate) async fn cancellable<T, F>(
    cancel: &CancellationToken,
    step: &str,
    fut: F,
) -> Result<T, JobError>
where
    F: Future<Output = Result<T, JobError>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(JobError::transient(anyhow::anyhow!("Job cancelled during {step}"))),
        result = fut => result,
    }
}

pub(crate) fn classify_processor_error(err: ProcessorError) -> JobError {
    if err.is_permanent() {
        JobError::permanent(err)
    } else {
        JobError::transient(err)
    }
}

pub(crate) fn new_variant(
    file_id: Uuid,
    variant_type: VariantType,
    storage_key: String,
    result: &ProcessorResult,
) -> NewVariant {
    NewVariant {
        file_id,
        variant_type,
        content_type: result.content_type.clone(),
        size_bytes: i64::try_from(result.size).unwrap_or(i64::MAX),
        storage_key,
        width: result.metadata.width.and_then(|w| i32::try_from(w).ok()),
        height: result.metadata.height.and_then(|h| i32::try_from(h).ok()),
        duration_seconds: result.metadata.duration,
        resolution: result.metadata.resolution.clone(),
    }
}

/// Bookkeeping shared by every handler for one execution attempt
pub(crate) struct JobScope<'a> {
    pub deps: &'a JobDeps,
    pub job_type: JobType,
    pub file_id: Uuid,
    pub job_id: Uuid,
    pub complete_file: bool,
    pub notify: bool,
}

impl JobScope<'_> {
    /// Mark the job running and load its file. Files are only moved to
    /// `processing` once they are known to exist.
    pub async fn begin(&self) -> Result<File, JobError> {
        self.deps
            .queries
            .mark_job_running(self.job_id)
            .await
            .context("Failed to mark job running")
            .transient()?;

        let file = self.load_file().await?;

        if self.complete_file {
            self.deps
                .queries
                .update_file_status(self.file_id, FileStatus::Processing)
                .await
                .context("Failed to mark file processing")
                .transient()?;
        }
        Ok(file)
    }

    /// Load the file, rejecting missing and deleted files permanently
    async fn load_file(&self) -> Result<File, JobError> {
        let file = self
            .deps
            .queries
            .get_file(self.file_id)
            .await
            .context("Failed to load file")
            .transient()?
            .ok_or_else(|| {
                JobError::permanent(anyhow::anyhow!("File {} not found", self.file_id))
            })?;

        if file.deleted {
            return Err(JobError::permanent(anyhow::anyhow!(
                "File {} has been deleted",
                file.id
            )));
        }
        if file.original_deleted {
            return Err(JobError::permanent(anyhow::anyhow!(
                "Original of file {} is no longer stored",
                file.id
            )));
        }
        Ok(file)
    }

    pub async fn download(&self, file: &File, cancel: &CancellationToken) -> Result<Bytes, JobError> {
        cancellable(cancel, "download", async {
            self.deps
                .storage
                .download(&file.storage_key)
                .await
                .with_context(|| format!("Failed to download original {}", file.storage_key))
                .transient()
        })
        .await
    }

    pub async fn upload(
        &self,
        storage_key: &str,
        data: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(), JobError> {
        cancellable(cancel, "upload", async {
            self.deps
                .storage
                .upload(storage_key, data, content_type)
                .await
                .with_context(|| format!("Failed to upload {storage_key}"))
                .transient()
        })
        .await
    }

    /// Finish a successful attempt. Usage accounting and the webhook are
    /// best-effort and never fail the job.
    pub async fn complete(&self, file: &File, variant: &Variant) -> Result<(), JobError> {
        if self.complete_file {
            self.deps
                .queries
                .update_file_status(file.id, FileStatus::Completed)
                .await
                .context("Failed to mark file completed")
                .transient()?;
        }

        self.deps
            .queries
            .mark_job_completed(self.job_id)
            .await
            .context("Failed to mark job completed")
            .transient()?;

        if let Err(e) = self
            .deps
            .queries
            .increment_usage(file.user_id, variant.size_bytes)
            .await
        {
            tracing::warn!(error = %e, user_id = %file.user_id, "Failed to record usage");
        }

        self.notify(
            file.user_id,
            self.event(WebhookEventType::ProcessingCompleted, Some(variant), None),
        );
        Ok(())
    }

    /// Record a failed attempt. Errors here are logged, the original error
    /// is what the broker sees.
    pub async fn fail(&self, file: Option<&File>, error: &JobError) {
        let message = error.to_string();
        tracing::error!(
            error = %message,
            permanent = error.is_permanent(),
            "Job failed"
        );

        if let Err(e) = self.deps.queries.mark_job_failed(self.job_id, &message).await {
            tracing::warn!(error = %e, "Failed to mark job failed");
        }

        if self.complete_file && error.is_permanent() {
            if let Err(e) = self
                .deps
                .queries
                .update_file_status(self.file_id, FileStatus::Failed)
                .await
            {
                tracing::warn!(error = %e, "Failed to mark file failed");
            }
        }

        if let Some(file) = file {
            self.notify(
                file.user_id,
                self.event(WebhookEventType::ProcessingFailed, None, Some(message)),
            );
        }
    }

    pub async fn delete_original_if_configured(&self, file: &File) {
        let settings = match self.deps.queries.get_user_settings(file.user_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load user settings, keeping original");
                return;
            }
        };
        if !settings.auto_delete_original {
            return;
        }

        if let Err(e) = self.deps.storage.delete(&file.storage_key).await {
            tracing::warn!(error = %e, storage_key = %file.storage_key, "Failed to delete original");
            return;
        }
        if let Err(e) = self.deps.queries.mark_original_deleted(file.id).await {
            tracing::warn!(error = %e, "Failed to flag original as deleted");
            return;
        }
        tracing::info!(storage_key = %file.storage_key, "Original deleted after processing");
    }

    fn event(
        &self,
        event_type: WebhookEventType,
        variant: Option<&Variant>,
        error: Option<String>,
    ) -> WebhookEvent {
        WebhookEvent {
            event_type,
            file_id: self.file_id,
            job_id: Some(self.job_id),
            job_type: self.job_type,
            variant_key: variant.map(|v| v.storage_key.clone()),
            content_type: variant.map(|v| v.content_type.clone()),
            size_bytes: variant.map(|v| v.size_bytes),
            duration_seconds: variant.and_then(|v| v.duration_seconds),
            error,
            occurred_at: chrono::Utc::now(),
        }
    }

    /// Fire-and-forget webhook delivery
    fn notify(&self, user_id: Uuid, event: WebhookEvent) {
        if !self.notify {
            return;
        }
        let webhooks = self.deps.webhooks.clone();
        tokio::spawn(async move {
            let event_type = event.event_type;
            if let Err(e) = webhooks.dispatch(user_id, event).await {
                tracing::warn!(
                    error = %e,
                    user_id = %user_id,
                    event_type = %event_type,
                    "Failed to dispatch webhook"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_processing::ResultMetadata;

    #[test]
    fn test_processor_errors_keep_their_classification() {
        assert!(classify_processor_error(ProcessorError::CorruptedFile("x".into())).is_permanent());
        assert!(classify_processor_error(ProcessorError::FfmpegNotFound).is_permanent());
        let degraded = ProcessorError::Degraded {
            reason: "cwebp failed".into(),
            fallback: Box::new(ProcessorResult::new(vec![1u8], "image/jpeg")),
        };
        assert!(classify_processor_error(degraded).is_permanent());
        assert!(!classify_processor_error(ProcessorError::Io(std::io::Error::other("disk")))
            .is_permanent());
    }

    #[test]
    fn test_new_variant_copies_result_metadata() {
        let result = ProcessorResult::new(vec![0u8; 10], "video/mp4").with_metadata(ResultMetadata {
            width: Some(1280),
            height: Some(720),
            duration: Some(4.5),
            resolution: Some("1280x720".into()),
            ..Default::default()
        });
        let id = Uuid::new_v4();
        let variant = new_variant(id, VariantType::Video720p, "k".into(), &result);
        assert_eq!(variant.file_id, id);
        assert_eq!(variant.size_bytes, 10);
        assert_eq!((variant.width, variant.height), (Some(1280), Some(720)));
        assert_eq!(variant.duration_seconds, Some(4.5));
        assert_eq!(variant.resolution.as_deref(), Some("1280x720"));
    }

    #[tokio::test]
    async fn test_cancellable_returns_transient_on_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = cancellable(&cancel, "download", std::future::pending::<Result<(), JobError>>())
            .await
            .unwrap_err();
        assert!(!err.is_permanent());
        assert!(err.to_string().contains("download"));
    }

    #[tokio::test]
    async fn test_cancellable_passes_result_through() {
        let cancel = CancellationToken::new();
        let value = cancellable(&cancel, "upload", async { Ok::<_, JobError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}
