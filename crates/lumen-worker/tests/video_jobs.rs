//! Video jobs end to end. Skipped when ffmpeg / ffprobe are not installed.

mod common;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use lumen_core::models::{
    FileStatus, JobPayload, JobStatus, JobType, VariantType, VideoHlsPayload,
    VideoTranscodePayload,
};
use lumen_core::Broker;
use lumen_processing::{tool_available, video_processor};
use lumen_worker::{default_handlers, submit_job, Handlers, MemoryBroker};

use common::Harness;

fn ffmpeg_available() -> bool {
    tool_available("ffmpeg") && tool_available("ffprobe")
}

/// Two seconds of 640x360 test pattern
async fn sample_video() -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.mp4");
    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=640x360:rate=25",
            "-t",
            "2",
            "-pix_fmt",
            "yuv420p",
            "-c:v",
            "mpeg4",
        ])
        .arg(&path)
        .status()
        .await
        .unwrap();
    assert!(status.success(), "ffmpeg could not generate the sample");
    tokio::fs::read(&path).await.unwrap()
}

fn handlers(harness: &Harness) -> Handlers {
    default_handlers(
        &harness.deps(),
        Arc::new(video_processor(&harness.config)),
    )
}

async fn run<P: JobPayload>(harness: &Harness, job_type: JobType, payload: P) -> Uuid {
    let broker = MemoryBroker::new(1);
    let submitted = submit_job(&*harness.queries, &broker, job_type, payload)
        .await
        .unwrap();
    let job = broker.dequeue().await.unwrap().unwrap();
    handlers(harness)
        .dispatch(&job, &CancellationToken::new())
        .await
        .unwrap();
    submitted.job_id
}

#[tokio::test]
async fn test_transcode_caps_height_and_records_actual_resolution() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }
    let harness = Harness::new().await;
    let file = harness
        .upload_original("clip.mp4", "video/mp4", sample_video().await)
        .await;
    harness.queries.set_auto_delete(file.user_id);

    let job_id = run(
        &harness,
        JobType::VideoTranscode,
        VideoTranscodePayload {
            file_id: file.id,
            job_id: None,
            quality: Some(80),
            max_resolution: Some(240),
            preset: Some("ultrafast".to_string()),
        },
    )
    .await;

    assert_eq!(harness.queries.job(job_id).status, JobStatus::Completed);
    let variants = harness.queries.variants();
    assert_eq!(variants.len(), 1);
    let variant = &variants[0];
    assert_eq!(variant.variant_type, VariantType::for_video_height(240));
    assert_eq!(variant.height, Some(240));
    let width = variant.width.unwrap();
    assert!((424..=428).contains(&width), "width {width} not proportional");
    assert_eq!(variant.resolution.as_deref(), Some(format!("{width}x240").as_str()));
    assert!(harness.storage.exists(&variant.storage_key).await.unwrap());

    // The owner asked for originals to be removed once transcoded
    let updated = harness.queries.file(file.id);
    assert_eq!(updated.status, FileStatus::Completed);
    assert!(updated.original_deleted);
    assert!(!harness.storage.exists(&file.storage_key).await.unwrap());
}

#[tokio::test]
async fn test_hls_uploads_segments_and_manifest() {
    if !ffmpeg_available() {
        eprintln!("ffmpeg not found, skipping");
        return;
    }
    let harness = Harness::new().await;
    let file = harness
        .upload_original("clip.mp4", "video/mp4", sample_video().await)
        .await;

    let job_id = run(
        &harness,
        JobType::VideoHls,
        VideoHlsPayload {
            file_id: file.id,
            job_id: None,
            segment_duration: Some(1),
            max_resolution: Some(240),
        },
    )
    .await;

    assert_eq!(harness.queries.job(job_id).status, JobStatus::Completed);
    assert_eq!(harness.queries.file(file.id).status, FileStatus::Completed);

    let variants = harness.queries.variants();
    assert_eq!(variants.len(), 1);
    let variant = &variants[0];
    assert_eq!(variant.variant_type, VariantType::HlsMaster);
    assert_eq!(variant.content_type, "application/vnd.apple.mpegurl");

    let prefix = format!("processed/{}/hls_master/", file.id);
    assert!(variant.storage_key.starts_with(&prefix));
    assert!(variant.storage_key.ends_with(".m3u8"));

    let manifest = harness.storage.download(&variant.storage_key).await.unwrap();
    let manifest = String::from_utf8(manifest.to_vec()).unwrap();
    assert!(manifest.starts_with("#EXTM3U"));

    let segments: Vec<&str> = manifest.lines().filter(|l| l.ends_with(".ts")).collect();
    assert!(!segments.is_empty());
    for segment in segments {
        let key = format!("{prefix}{segment}");
        assert!(harness.storage.exists(&key).await.unwrap(), "missing {key}");
    }

    // The original stays: auto-delete only follows transcodes
    assert!(harness.storage.exists(&file.storage_key).await.unwrap());
}
