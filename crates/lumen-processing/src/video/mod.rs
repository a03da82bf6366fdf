//! Video processing through FFmpeg
//!
//! `probe` parses ffprobe JSON, `ffmpeg` builds command lines, `processor`
//! runs them, and `jobs` adapts single-output operations to the registry.

pub mod ffmpeg;
pub mod jobs;
pub mod probe;
pub mod processor;

/// HLS manifest file name inside the output directory
pub const HLS_MANIFEST_NAME: &str = "master.m3u8";

pub use ffmpeg::{crf_from_quality, escape_drawtext, preset_for_height, ResolutionPreset};
pub use jobs::{VideoJobProcessor, VideoOperation, VIDEO_TYPES};
pub use probe::{StreamInfo, VideoMetadata};
pub use processor::{HlsOutput, VideoProcessor};
