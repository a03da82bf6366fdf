//! Processor contract
//!
//! A processor turns an input byte buffer plus options into an output byte
//! buffer, a content type and a bit of metadata. Processors are looked up by
//! name through the [`Registry`](crate::Registry).

use crate::error::ProcessorError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

/// Options passed to a processor.
///
/// Zero width/height means "not set". Each processor reads only the fields it
/// understands and rejects missing required ones with `InvalidConfig`.
#[derive(Debug, Clone, Default)]
pub struct ProcessOptions {
    pub width: u32,
    pub height: u32,
    /// 1-100; processors clamp and apply their own default
    pub quality: Option<u32>,
    pub format: Option<String>,
    /// Resize fit mode: `fit`, `cover` or `fill`
    pub fit: Option<String>,
    /// Crop anchor for thumbnails (`center`, `north`, `south-east`, ...)
    pub anchor: Option<String>,
    /// Watermark position
    pub position: Option<String>,
    pub text: Option<String>,
    pub font_size: Option<u32>,
    /// 1-indexed PDF page
    pub page: Option<u32>,
    /// Video seek position as a fraction of the duration
    pub percent: Option<f64>,
    /// Video height cap
    pub max_resolution: Option<u32>,
    /// x264 preset
    pub preset: Option<String>,
    /// HLS segment length in seconds
    pub segment_duration: Option<u32>,
    pub columns: Option<u32>,
    pub rows: Option<u32>,
}

impl ProcessOptions {
    pub fn with_size(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    pub(crate) fn format_lowercase(&self) -> Option<String> {
        self.format
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(str::to_lowercase)
    }
}

/// Metadata describing a processor's output
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Seconds, for video output
    pub duration: Option<f64>,
    pub format: Option<String>,
    /// Set when the processor recompressed the input
    pub compressed: bool,
    /// `WxH` of the actual encoded video
    pub resolution: Option<String>,
}

/// Output of a processor. The caller owns the bytes and consumes them fully.
#[derive(Debug, Clone)]
pub struct ProcessorResult {
    pub data: Bytes,
    pub content_type: String,
    /// Suggested filename for the variant, if the processor has an opinion
    pub filename: Option<String>,
    pub size: u64,
    pub metadata: ResultMetadata,
}

impl ProcessorResult {
    pub fn new(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        let data = data.into();
        Self {
            size: data.len() as u64,
            data,
            content_type: content_type.into(),
            filename: None,
            metadata: ResultMetadata::default(),
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_metadata(mut self, metadata: ResultMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A named unit of work transforming bytes plus options into a result.
///
/// Cancellation is cooperative: dropping the future aborts the work, and any
/// external tool it launched is killed.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Registry name (e.g. `thumbnail`)
    fn name(&self) -> &'static str;

    /// Content types this processor accepts
    fn supported_types(&self) -> &'static [&'static str];

    /// `UnsupportedType` unless `content_type` is one of [`supported_types`](Self::supported_types)
    fn ensure_supports(&self, content_type: &str) -> Result<(), ProcessorError> {
        ensure_supported(self.name(), self.supported_types(), content_type)
    }

    async fn process(
        &self,
        options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError>;
}

/// Raster formats every image processor can decode
#[cfg_attr(not(feature = "image"), allow(dead_code))]
pub(crate) const IMAGE_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

/// Reject `None` options for processors that need them.
pub(crate) fn require_options<'a>(
    processor: &str,
    options: Option<&'a ProcessOptions>,
) -> Result<&'a ProcessOptions, ProcessorError> {
    options.ok_or_else(|| ProcessorError::InvalidConfig(format!("{processor} requires options")))
}

/// Check `content_type` against a list of accepted media types.
///
/// Parameters (`; charset=...`) and case are ignored.
pub fn ensure_supported(
    name: &str,
    supported: &[&str],
    content_type: &str,
) -> Result<(), ProcessorError> {
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if supported.iter().any(|t| *t == media_type) {
        Ok(())
    } else {
        Err(ProcessorError::UnsupportedType(format!(
            "{name} does not accept {content_type}"
        )))
    }
}
