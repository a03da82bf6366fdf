//! Processor error taxonomy

use crate::processor::ProcessorResult;
use thiserror::Error;

/// Errors a processor can return.
///
/// Callers branch on the kind to decide between retrying and giving up, see
/// [`ProcessorError::is_permanent`].
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("corrupted file: {0}")]
    CorruptedFile(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// The processor could not do its job and returns a usable fallback
    /// (e.g. the original bytes relabeled). Callers must look at both.
    #[error("processing failed, returning original: {reason}")]
    Degraded {
        reason: String,
        fallback: Box<ProcessorResult>,
    },

    #[error("video too long: {duration:.1}s exceeds maximum of {max:.1}s")]
    VideoTooLong { duration: f64, max: f64 },

    #[error("unsupported codec: {0}")]
    UnsupportedCodec(String),

    #[error("ffmpeg not found")]
    FfmpegNotFound,

    #[error("ffprobe not found")]
    FfprobeNotFound,

    #[error("invalid video: {0}")]
    InvalidVideo(String),

    #[error("resolution too high: {width}x{height}")]
    ResolutionTooHigh { width: u32, height: u32 },

    #[error("pdf is encrypted or password protected")]
    PdfEncrypted,

    #[error("pdf has no pages")]
    PdfEmpty,

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: u32, count: u32 },

    #[error("processor not registered: {0}")]
    NotRegistered(String),

    #[error("blocking task aborted: {0}")]
    TaskAborted(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessorError {
    /// Whether retrying the same input can never succeed.
    ///
    /// Only scratch-file I/O and an aborted blocking task are transient; a
    /// missing binary or a bad input will not fix itself between attempts.
    pub fn is_permanent(&self) -> bool {
        !matches!(self, ProcessorError::Io(_) | ProcessorError::TaskAborted(_))
    }

    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessorError::InvalidConfig(_) => "invalid_config",
            ProcessorError::CorruptedFile(_) => "corrupted_file",
            ProcessorError::ProcessingFailed(_) => "processing_failed",
            ProcessorError::UnsupportedType(_) => "unsupported_type",
            ProcessorError::Degraded { .. } => "degraded",
            ProcessorError::VideoTooLong { .. } => "video_too_long",
            ProcessorError::UnsupportedCodec(_) => "unsupported_codec",
            ProcessorError::FfmpegNotFound => "ffmpeg_not_found",
            ProcessorError::FfprobeNotFound => "ffprobe_not_found",
            ProcessorError::InvalidVideo(_) => "invalid_video",
            ProcessorError::ResolutionTooHigh { .. } => "resolution_too_high",
            ProcessorError::PdfEncrypted => "pdf_encrypted",
            ProcessorError::PdfEmpty => "pdf_empty",
            ProcessorError::PageOutOfRange { .. } => "page_out_of_range",
            ProcessorError::NotRegistered(_) => "not_registered",
            ProcessorError::TaskAborted(_) => "task_aborted",
            ProcessorError::Io(_) => "io",
        }
    }
}

/// Run CPU-heavy work on the blocking pool.
#[cfg_attr(not(feature = "image"), allow(dead_code))]
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ProcessorError>
where
    F: FnOnce() -> Result<T, ProcessorError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessorError::TaskAborted(e.to_string()))?
}
