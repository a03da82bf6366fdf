//! HLS packaging job
//!
//! HLS output is a manifest plus a directory of segments, so it does not fit
//! the single-buffer [`Processor`](lumen_processing::Processor) contract. The
//! handler drives [`VideoProcessor::generate_hls`] directly, uploads every
//! file under `processed/{file_id}/hls_master/` and records one `hls_master`
//! variant pointing at the manifest.

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lumen_core::models::{
    variant_storage_key, File, JobType, NewVariant, Variant, VariantType, VideoHlsPayload,
};
use lumen_core::{JobError, JobResultExt, QueuedJob};
use lumen_processing::{ensure_supported, HlsOutput, ProcessOptions, VideoProcessor, VIDEO_TYPES};

use crate::handler::JobHandler;
use crate::pipeline::{
    cancellable, classify_processor_error, ensure_job_record, JobDeps, JobScope,
};

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub struct HlsHandler {
    deps: JobDeps,
    video: Arc<VideoProcessor>,
}

/// What landed in storage for one HLS rendition
struct UploadedHls {
    manifest_key: String,
    total_bytes: i64,
}

impl HlsHandler {
    pub fn new(deps: JobDeps, video: Arc<VideoProcessor>) -> Self {
        Self { deps, video }
    }

    async fn execute(
        &self,
        scope: &JobScope<'_>,
        payload: &VideoHlsPayload,
        file_slot: &mut Option<File>,
        cancel: &CancellationToken,
    ) -> Result<Variant, JobError> {
        let file = file_slot.insert(scope.begin().await?);
        ensure_supported("video_hls", VIDEO_TYPES, &file.content_type)
            .map_err(classify_processor_error)?;

        let input = scope.download(file, cancel).await?;

        let options = ProcessOptions {
            max_resolution: payload.max_resolution,
            segment_duration: payload.segment_duration,
            ..Default::default()
        };
        let output = cancellable(cancel, "HLS encoding", async {
            self.video
                .generate_hls(input, &options)
                .await
                .map_err(classify_processor_error)
        })
        .await?;

        // The output directory goes away whether or not every upload landed
        let uploaded = self.upload_output(scope, file.id, &output, cancel).await;
        output.cleanup().await;
        let uploaded = uploaded?;

        let variant = self
            .deps
            .queries
            .create_variant(NewVariant {
                file_id: file.id,
                variant_type: VariantType::HlsMaster,
                content_type: MANIFEST_CONTENT_TYPE.to_string(),
                size_bytes: uploaded.total_bytes,
                storage_key: uploaded.manifest_key,
                width: i32::try_from(output.width).ok(),
                height: i32::try_from(output.height).ok(),
                duration_seconds: Some(output.total_duration),
                resolution: Some(format!("{}x{}", output.width, output.height)),
            })
            .await
            .context("Failed to record HLS variant")
            .transient()?;

        scope.complete(file, &variant).await?;
        Ok(variant)
    }

    async fn upload_output(
        &self,
        scope: &JobScope<'_>,
        file_id: Uuid,
        output: &HlsOutput,
        cancel: &CancellationToken,
    ) -> Result<UploadedHls, JobError> {
        let mut total_bytes = 0i64;

        for segment in &output.segment_paths {
            let (_, size) = self
                .upload_file(scope, file_id, segment, SEGMENT_CONTENT_TYPE, cancel)
                .await?;
            total_bytes += size;
        }

        // Manifest last, so it never points at segments that are not stored yet
        let (manifest_key, size) = self
            .upload_file(scope, file_id, &output.manifest_path, MANIFEST_CONTENT_TYPE, cancel)
            .await?;
        total_bytes += size;

        tracing::debug!(
            segments = output.segment_count,
            total_bytes = total_bytes,
            "HLS output uploaded"
        );

        Ok(UploadedHls {
            manifest_key,
            total_bytes,
        })
    }

    async fn upload_file(
        &self,
        scope: &JobScope<'_>,
        file_id: Uuid,
        path: &Path,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<(String, i64), JobError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                JobError::permanent(anyhow::anyhow!("Unexpected HLS output path {}", path.display()))
            })?;
        let key = variant_storage_key(file_id, VariantType::HlsMaster, name);

        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read HLS output {}", path.display()))
            .transient()?;
        let size = i64::try_from(data.len()).unwrap_or(i64::MAX);

        scope
            .upload(&key, Bytes::from(data), content_type, cancel)
            .await?;
        Ok((key, size))
    }
}

#[async_trait]
impl JobHandler for HlsHandler {
    fn job_type(&self) -> JobType {
        JobType::VideoHls
    }

    #[tracing::instrument(
        skip(self, job, cancel),
        fields(
            queue_id = %job.id,
            job_type = "video_hls",
            attempt = job.attempt,
            file_id = tracing::field::Empty,
            job_id = tracing::field::Empty
        )
    )]
    async fn handle(&self, job: &QueuedJob, cancel: &CancellationToken) -> Result<(), JobError> {
        let mut payload: VideoHlsPayload = job
            .unmarshal_payload()
            .context("Failed to parse video_hls payload")
            .permanent()?;

        let file_id = payload.file_id;
        let job_id = ensure_job_record(&self.deps, JobType::VideoHls, &mut payload).await?;

        let span = tracing::Span::current();
        span.record("file_id", tracing::field::display(file_id));
        span.record("job_id", tracing::field::display(job_id));

        let scope = JobScope {
            deps: &self.deps,
            job_type: JobType::VideoHls,
            file_id,
            job_id,
            complete_file: true,
            notify: true,
        };

        let started = Instant::now();
        let mut file = None;
        match self.execute(&scope, &payload, &mut file, cancel).await {
            Ok(variant) => {
                tracing::info!(
                    storage_key = %variant.storage_key,
                    size_bytes = variant.size_bytes,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "HLS job completed"
                );
                Ok(())
            }
            Err(e) => {
                let e = e.context(format!("video_hls job for file {file_id}"));
                scope.fail(file.as_ref(), &e).await;
                Err(e)
            }
        }
    }
}
