//! Registry adapters for single-output video operations

use super::processor::VideoProcessor;
use crate::error::ProcessorError;
use crate::processor::{ProcessOptions, Processor, ProcessorResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Content types the video processors accept
pub const VIDEO_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/webm",
    "video/x-matroska",
    "video/x-msvideo",
    "video/mpeg",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoOperation {
    Transcode,
    Thumbnail,
    Watermark,
    Sprite,
}

impl VideoOperation {
    pub const ALL: [VideoOperation; 4] = [
        VideoOperation::Transcode,
        VideoOperation::Thumbnail,
        VideoOperation::Watermark,
        VideoOperation::Sprite,
    ];

    pub fn processor_name(self) -> &'static str {
        match self {
            VideoOperation::Transcode => "video_transcode",
            VideoOperation::Thumbnail => "video_thumbnail",
            VideoOperation::Watermark => "video_watermark",
            VideoOperation::Sprite => "video_sprite",
        }
    }
}

/// Exposes one [`VideoOperation`] of a shared [`VideoProcessor`] as a
/// [`Processor`]. HLS is not adapted: it produces a directory, not a buffer.
pub struct VideoJobProcessor {
    video: Arc<VideoProcessor>,
    operation: VideoOperation,
}

impl VideoJobProcessor {
    pub fn new(video: Arc<VideoProcessor>, operation: VideoOperation) -> Self {
        Self { video, operation }
    }
}

#[async_trait]
impl Processor for VideoJobProcessor {
    fn name(&self) -> &'static str {
        self.operation.processor_name()
    }

    fn supported_types(&self) -> &'static [&'static str] {
        VIDEO_TYPES
    }

    async fn process(
        &self,
        options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError> {
        let defaults = ProcessOptions::default();
        let options = options.unwrap_or(&defaults);
        match self.operation {
            VideoOperation::Transcode => self.video.transcode(input, options).await,
            VideoOperation::Thumbnail => self.video.thumbnail(input, options).await,
            VideoOperation::Watermark => self.video.watermark(input, options).await,
            VideoOperation::Sprite => self.video.sprite(input, options).await,
        }
    }
}
