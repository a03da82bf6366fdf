use super::ffmpeg::{
    self, build_drawtext_filter, build_hls_args, build_sprite_args, build_thumbnail_args,
    build_transcode_args, build_watermark_args, crf_from_quality, EncodeParams, SpriteLayout,
    VideoWatermarkPosition, X264_PRESETS,
};
use super::probe::{parse_probe_output, VideoMetadata};
use super::HLS_MANIFEST_NAME;
use crate::codec;
use crate::command::{run_tool, stderr_tail};
use crate::error::ProcessorError;
use crate::processor::{ProcessOptions, ProcessorResult, ResultMetadata};
use bytes::Bytes;
use lumen_core::config::{ToolPaths, VideoConfig};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Largest source frame accepted (8K UHD)
const MAX_SOURCE_WIDTH: u32 = 7680;
const MAX_SOURCE_HEIGHT: u32 = 4320;

const DEFAULT_THUMBNAIL_PERCENT: f64 = 0.1;
const DEFAULT_SPRITE_GRID: u32 = 5;
const DEFAULT_SPRITE_TILE_WIDTH: u32 = 160;
const DEFAULT_WATERMARK_OPACITY: u32 = 50;

/// Result of HLS generation.
///
/// The files live in `dir`, which is NOT removed automatically: the caller
/// uploads them and then calls [`HlsOutput::cleanup`].
#[derive(Debug, Clone)]
pub struct HlsOutput {
    pub dir: PathBuf,
    pub manifest_path: PathBuf,
    /// Sorted by segment number
    pub segment_paths: Vec<PathBuf>,
    pub segment_count: usize,
    /// Sum of the manifest's segment durations, in seconds
    pub total_duration: f64,
    pub width: u32,
    pub height: u32,
}

impl HlsOutput {
    /// Remove the output directory
    pub async fn cleanup(&self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.dir).await {
            tracing::warn!(error = %e, dir = %self.dir.display(), "Failed to remove HLS output directory");
        }
    }
}

/// FFmpeg-backed video operations.
///
/// Every operation stages the input into a scratch directory that is removed
/// on return. HLS generation is the exception, see [`HlsOutput`].
pub struct VideoProcessor {
    ffmpeg_path: String,
    ffprobe_path: String,
    config: VideoConfig,
    font_path: Option<String>,
}

impl VideoProcessor {
    pub fn new(tools: &ToolPaths, config: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: tools.ffmpeg.clone(),
            ffprobe_path: tools.ffprobe.clone(),
            config: config.clone(),
            font_path: None,
        }
    }

    /// Font file for drawtext; ffmpeg's default font is used when unset
    pub fn with_font_path(mut self, font_path: Option<String>) -> Self {
        self.font_path = font_path;
        self
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// Probe raw video bytes
    pub async fn probe(&self, input: &[u8]) -> Result<VideoMetadata, ProcessorError> {
        let (_dir, path) = stage_input(input).await?;
        self.probe_path(&path).await
    }

    #[tracing::instrument(skip(self), fields(path = %path.display()))]
    pub async fn probe_path(&self, path: &Path) -> Result<VideoMetadata, ProcessorError> {
        let args: [&OsStr; 7] = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ];
        let output = run_tool(&self.ffprobe_path, args).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessorError::FfprobeNotFound
            } else {
                ProcessorError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(ProcessorError::InvalidVideo(format!(
                "ffprobe failed: {}",
                stderr_tail(&output)
            )));
        }

        parse_probe_output(&output.stdout)
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<(), ProcessorError> {
        let output = run_tool(&self.ffmpeg_path, args).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProcessorError::FfmpegNotFound
            } else {
                ProcessorError::Io(e)
            }
        })?;

        if !output.status.success() {
            return Err(ProcessorError::ProcessingFailed(format!(
                "ffmpeg failed: {}",
                stderr_tail(&output)
            )));
        }
        Ok(())
    }

    fn check_source(&self, meta: &VideoMetadata) -> Result<(), ProcessorError> {
        // ffprobe leaves codec_name empty for streams it has no decoder for
        let codec = meta.video_codec.trim();
        if codec.is_empty() || codec == "none" || codec == "unknown" {
            return Err(ProcessorError::UnsupportedCodec(format!(
                "no decodable video stream in {} container",
                if meta.container.is_empty() { "unknown" } else { meta.container.as_str() }
            )));
        }
        if meta.width > MAX_SOURCE_WIDTH || meta.height > MAX_SOURCE_HEIGHT {
            return Err(ProcessorError::ResolutionTooHigh {
                width: meta.width,
                height: meta.height,
            });
        }
        if self.config.max_duration_seconds > 0.0 && meta.duration > self.config.max_duration_seconds
        {
            return Err(ProcessorError::VideoTooLong {
                duration: meta.duration,
                max: self.config.max_duration_seconds,
            });
        }
        Ok(())
    }

    fn encode_params(
        &self,
        options: &ProcessOptions,
        meta: &VideoMetadata,
    ) -> Result<EncodeParams, ProcessorError> {
        let preset = options
            .preset
            .as_deref()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.default_preset.clone());
        if !X264_PRESETS.contains(&preset.as_str()) {
            return Err(ProcessorError::InvalidConfig(format!(
                "unknown encoder preset: {preset}"
            )));
        }

        Ok(EncodeParams {
            crf: options
                .quality
                .map(crf_from_quality)
                .unwrap_or(self.config.default_crf),
            preset,
            max_height: options
                .max_resolution
                .filter(|h| *h > 0)
                .unwrap_or(self.config.max_resolution),
            source_height: meta.height,
            has_audio: meta.has_audio,
        })
    }

    /// Re-encode to H.264 MP4, downscaling to the height cap when needed
    #[tracing::instrument(skip(self, input, options), fields(size_bytes = input.len()))]
    pub async fn transcode(
        &self,
        input: Bytes,
        options: &ProcessOptions,
    ) -> Result<ProcessorResult, ProcessorError> {
        let (dir, input_path) = stage_input(&input).await?;
        let meta = self.probe_path(&input_path).await?;
        self.check_source(&meta)?;
        let params = self.encode_params(options, &meta)?;

        let output_path = dir.path().join("output.mp4");
        self.run_ffmpeg(&build_transcode_args(&input_path, &output_path, &params))
            .await?;

        // Report what the encoder actually produced
        let encoded = self.probe_path(&output_path).await?;
        let data = tokio::fs::read(&output_path).await?;

        tracing::info!(
            source = %meta.resolution(),
            output = %encoded.resolution(),
            crf = params.crf,
            preset = %params.preset,
            "Video transcoded"
        );

        Ok(ProcessorResult::new(data, "video/mp4")
            .with_filename(format!("{}p.mp4", encoded.height))
            .with_metadata(ResultMetadata {
                width: Some(encoded.width),
                height: Some(encoded.height),
                duration: Some(encoded.duration),
                format: Some("mp4".to_string()),
                compressed: true,
                resolution: Some(encoded.resolution()),
            }))
    }

    /// Extract one JPEG frame at `percent` of the duration
    #[tracing::instrument(skip(self, input, options), fields(size_bytes = input.len()))]
    pub async fn thumbnail(
        &self,
        input: Bytes,
        options: &ProcessOptions,
    ) -> Result<ProcessorResult, ProcessorError> {
        let (dir, input_path) = stage_input(&input).await?;
        let meta = self.probe_path(&input_path).await?;

        let percent = options
            .percent
            .filter(|p| p.is_finite())
            .unwrap_or(DEFAULT_THUMBNAIL_PERCENT)
            .clamp(0.0, 1.0);
        let timestamp = meta.duration * percent;

        let output_path = dir.path().join("thumbnail.jpg");
        self.run_ffmpeg(&build_thumbnail_args(
            &input_path,
            &output_path,
            timestamp,
            options.width,
        ))
        .await?;

        let data = tokio::fs::read(&output_path).await?;
        let (width, height, _) = codec::probe_header(&data)?;

        Ok(ProcessorResult::new(data, "image/jpeg")
            .with_filename("thumbnail.jpg")
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some("jpeg".to_string()),
                ..Default::default()
            }))
    }

    /// Encode an HLS rendition into a fresh directory under the system temp
    /// dir. On success the directory is left in place for the caller.
    ///
    /// `options.segment_duration` overrides the configured segment length.
    #[tracing::instrument(skip(self, input, options), fields(size_bytes = input.len()))]
    pub async fn generate_hls(
        &self,
        input: Bytes,
        options: &ProcessOptions,
    ) -> Result<HlsOutput, ProcessorError> {
        let (_scratch, input_path) = stage_input(&input).await?;
        let meta = self.probe_path(&input_path).await?;
        self.check_source(&meta)?;
        let params = self.encode_params(options, &meta)?;

        let segment_duration = options
            .segment_duration
            .filter(|d| *d > 0)
            .unwrap_or(self.config.hls_segment_duration);

        // Removed on drop until the encode succeeds, so a failed or cancelled
        // run leaves nothing behind
        let out_dir = tempfile::Builder::new().prefix("lumen-hls-").tempdir()?;
        let output = self
            .encode_hls(&input_path, out_dir.path(), &params, segment_duration)
            .await?;
        #[allow(deprecated)]
        let _kept = out_dir.into_path();
        Ok(output)
    }

    async fn encode_hls(
        &self,
        input_path: &Path,
        out_dir: &Path,
        params: &EncodeParams,
        segment_duration: u32,
    ) -> Result<HlsOutput, ProcessorError> {
        self.run_ffmpeg(&build_hls_args(input_path, out_dir, params, segment_duration))
            .await?;

        let manifest_path = out_dir.join(HLS_MANIFEST_NAME);
        let manifest = tokio::fs::read_to_string(&manifest_path).await?;

        let mut segment_paths = Vec::new();
        let mut entries = tokio::fs::read_dir(out_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "ts") {
                segment_paths.push(path);
            }
        }
        ffmpeg::sort_segments(&mut segment_paths);

        if segment_paths.is_empty() {
            return Err(ProcessorError::ProcessingFailed(
                "ffmpeg produced no HLS segments".to_string(),
            ));
        }

        let rendition = self.probe_path(&segment_paths[0]).await?;

        Ok(HlsOutput {
            dir: out_dir.to_path_buf(),
            manifest_path,
            segment_count: segment_paths.len(),
            segment_paths,
            total_duration: ffmpeg::manifest_duration(&manifest),
            width: rendition.width,
            height: rendition.height,
        })
    }

    /// Burn a text overlay into the video
    #[tracing::instrument(skip(self, input, options), fields(size_bytes = input.len()))]
    pub async fn watermark(
        &self,
        input: Bytes,
        options: &ProcessOptions,
    ) -> Result<ProcessorResult, ProcessorError> {
        let text = options
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ProcessorError::InvalidConfig("video watermark requires text".to_string())
            })?;

        let (dir, input_path) = stage_input(&input).await?;
        let meta = self.probe_path(&input_path).await?;
        self.check_source(&meta)?;

        let opacity = options.quality.unwrap_or(DEFAULT_WATERMARK_OPACITY).min(100) as f32 / 100.0;
        let filter = build_drawtext_filter(
            text,
            VideoWatermarkPosition::parse(options.position.as_deref()),
            meta.height,
            opacity,
            self.font_path.as_deref(),
        );

        let params = EncodeParams {
            crf: self.config.default_crf,
            preset: self.config.default_preset.clone(),
            max_height: 0,
            source_height: meta.height,
            has_audio: meta.has_audio,
        };

        let output_path = dir.path().join("watermarked.mp4");
        self.run_ffmpeg(&build_watermark_args(&input_path, &output_path, &filter, &params))
            .await?;
        let data = tokio::fs::read(&output_path).await?;

        Ok(ProcessorResult::new(data, "video/mp4")
            .with_filename("watermarked.mp4")
            .with_metadata(ResultMetadata {
                width: Some(meta.width),
                height: Some(meta.height),
                duration: Some(meta.duration),
                format: Some("mp4".to_string()),
                resolution: Some(meta.resolution()),
                ..Default::default()
            }))
    }

    /// Tile evenly spaced frames into one JPEG sprite sheet
    #[tracing::instrument(skip(self, input, options), fields(size_bytes = input.len()))]
    pub async fn sprite(
        &self,
        input: Bytes,
        options: &ProcessOptions,
    ) -> Result<ProcessorResult, ProcessorError> {
        let (dir, input_path) = stage_input(&input).await?;
        let meta = self.probe_path(&input_path).await?;

        let layout = SpriteLayout::new(
            meta.duration,
            options.columns.unwrap_or(DEFAULT_SPRITE_GRID),
            options.rows.unwrap_or(DEFAULT_SPRITE_GRID),
            match options.width {
                0 => DEFAULT_SPRITE_TILE_WIDTH,
                w => w,
            },
        );

        let output_path = dir.path().join("sprite.jpg");
        self.run_ffmpeg(&build_sprite_args(&input_path, &output_path, &layout))
            .await?;

        let data = tokio::fs::read(&output_path).await?;
        let (width, height, _) = codec::probe_header(&data)?;

        Ok(ProcessorResult::new(data, "image/jpeg")
            .with_filename("sprite.jpg")
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                duration: Some(meta.duration),
                format: Some("jpeg".to_string()),
                ..Default::default()
            }))
    }
}

/// Write input bytes into a fresh scratch directory
async fn stage_input(input: &[u8]) -> Result<(TempDir, PathBuf), ProcessorError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("input");
    tokio::fs::write(&path, input).await?;
    Ok((dir, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::tool_available;

    fn ffmpeg_available() -> bool {
        tool_available("ffmpeg") && tool_available("ffprobe")
    }

    fn processor() -> VideoProcessor {
        VideoProcessor::new(&ToolPaths::default(), &VideoConfig::default())
    }

    fn metadata(codec: &str, width: u32, height: u32, duration: f64) -> VideoMetadata {
        VideoMetadata {
            duration,
            container: "matroska,webm".to_string(),
            bitrate: None,
            width,
            height,
            video_codec: codec.to_string(),
            frame_rate: Some(25.0),
            has_audio: false,
            audio_codec: None,
            streams: Vec::new(),
        }
    }

    #[test]
    fn test_source_without_decodable_codec_is_unsupported() {
        let video = processor();
        assert!(video.check_source(&metadata("h264", 1280, 720, 10.0)).is_ok());

        for codec in ["", "none", "unknown"] {
            let err = video.check_source(&metadata(codec, 1280, 720, 10.0)).unwrap_err();
            assert!(matches!(err, ProcessorError::UnsupportedCodec(_)), "{codec:?}: {err}");
            assert!(err.is_permanent());
        }
    }

    #[test]
    fn test_source_limits() {
        let video = processor();
        assert!(matches!(
            video.check_source(&metadata("h264", 8192, 4320, 10.0)),
            Err(ProcessorError::ResolutionTooHigh { .. })
        ));
        assert!(matches!(
            video.check_source(&metadata("h264", 1280, 720, 1.0e9)),
            Err(ProcessorError::VideoTooLong { .. })
        ));
    }

    /// Two seconds of 1920x1080 test pattern with a sine tone
    async fn sample_video(dir: &Path) -> Bytes {
        let path = dir.join("sample.mp4");
        let output = tokio::process::Command::new("ffmpeg")
            .args([
                "-y",
                "-f",
                "lavfi",
                "-i",
                "testsrc=duration=2:size=1920x1080:rate=10",
                "-f",
                "lavfi",
                "-i",
                "sine=frequency=440:duration=2",
                "-c:v",
                "libx264",
                "-preset",
                "ultrafast",
                "-pix_fmt",
                "yuv420p",
                "-c:a",
                "aac",
                "-shortest",
            ])
            .arg(&path)
            .output()
            .await
            .unwrap();
        assert!(output.status.success(), "failed to build sample video");
        Bytes::from(tokio::fs::read(&path).await.unwrap())
    }

    #[tokio::test]
    async fn test_missing_ffprobe() {
        let tools = ToolPaths {
            ffprobe: "lumen-no-such-ffprobe".to_string(),
            ..Default::default()
        };
        let video = VideoProcessor::new(&tools, &VideoConfig::default());
        let err = video.probe(b"not a video").await.unwrap_err();
        assert!(matches!(err, ProcessorError::FfprobeNotFound));
    }

    #[tokio::test]
    async fn test_garbage_is_invalid_video() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let err = processor().probe(b"definitely not a video").await.unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidVideo(_)));
    }

    #[tokio::test]
    async fn test_transcode_caps_resolution() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = sample_video(dir.path()).await;

        let options = ProcessOptions {
            quality: Some(80),
            max_resolution: Some(720),
            preset: Some("ultrafast".to_string()),
            ..Default::default()
        };
        let result = processor().transcode(input, &options).await.unwrap();

        assert_eq!(result.content_type, "video/mp4");
        assert_eq!(result.metadata.height, Some(720));
        assert_eq!(result.metadata.width, Some(1280));
        assert_eq!(result.metadata.resolution.as_deref(), Some("1280x720"));
        assert_eq!(result.filename.as_deref(), Some("720p.mp4"));
    }

    #[tokio::test]
    async fn test_too_long_rejected_before_encoding() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = sample_video(dir.path()).await;

        let config = VideoConfig {
            max_duration_seconds: 1.0,
            ..Default::default()
        };
        let video = VideoProcessor::new(&ToolPaths::default(), &config);
        let err = video
            .transcode(input, &ProcessOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::VideoTooLong { .. }));
    }

    #[tokio::test]
    async fn test_unknown_preset() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = sample_video(dir.path()).await;
        let options = ProcessOptions {
            preset: Some("warp-speed".to_string()),
            ..Default::default()
        };
        let err = processor().transcode(input, &options).await.unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn test_thumbnail_and_sprite() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = sample_video(dir.path()).await;
        let video = processor();

        let thumb = video
            .thumbnail(
                input.clone(),
                &ProcessOptions {
                    width: 320,
                    percent: Some(0.5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(thumb.content_type, "image/jpeg");
        assert_eq!(thumb.metadata.width, Some(320));
        assert_eq!(thumb.metadata.height, Some(180));

        let sprite = video
            .sprite(
                input,
                &ProcessOptions {
                    width: 100,
                    columns: Some(2),
                    rows: Some(2),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(sprite.metadata.width, Some(200));
    }

    #[tokio::test]
    async fn test_hls_leaves_output_for_caller() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not installed");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let input = sample_video(dir.path()).await;
        let config = VideoConfig {
            hls_segment_duration: 1,
            ..Default::default()
        };
        let video = VideoProcessor::new(&ToolPaths::default(), &config);

        let options = ProcessOptions {
            max_resolution: Some(360),
            preset: Some("ultrafast".to_string()),
            ..Default::default()
        };
        let hls = video.generate_hls(input, &options).await.unwrap();

        assert!(hls.manifest_path.exists());
        assert_eq!(hls.segment_count, hls.segment_paths.len());
        assert!(hls.segment_count >= 1);
        assert!(hls.total_duration > 1.0);
        assert_eq!((hls.width, hls.height), (640, 360));

        hls.cleanup().await;
        assert!(!hls.dir.exists());
    }
}
