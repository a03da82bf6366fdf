use crate::codec::{self, OutputFormat};
use crate::command::{run_tool, stderr_tail, tool_available};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES};
use async_trait::async_trait;
use bytes::Bytes;
use image::ImageFormat;
use std::ffi::OsStr;

const WEBP_CONTENT_TYPE: &str = "image/webp";

/// WebP conversion through the external `cwebp` encoder.
///
/// Without the encoder the original bytes come back relabeled as WebP inside
/// [`ProcessorError::Degraded`].
pub struct WebpProcessor {
    cwebp_path: String,
}

impl WebpProcessor {
    pub fn new(cwebp_path: impl Into<String>) -> Self {
        Self {
            cwebp_path: cwebp_path.into(),
        }
    }

    fn degraded(reason: String, input: Bytes) -> ProcessorError {
        let fallback = ProcessorResult::new(input, WEBP_CONTENT_TYPE)
            .with_filename("image.webp")
            .with_metadata(ResultMetadata {
                format: Some("webp".to_string()),
                ..Default::default()
            });
        ProcessorError::Degraded {
            reason,
            fallback: Box::new(fallback),
        }
    }
}

impl Default for WebpProcessor {
    fn default() -> Self {
        Self::new("cwebp")
    }
}

#[async_trait]
impl Processor for WebpProcessor {
    fn name(&self) -> &'static str {
        "webp"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    async fn process(
        &self,
        options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError> {
        let quality = codec::clamp_quality(options.and_then(|o| o.quality));

        // Validate input and hand cwebp something it can read (it has no GIF/BMP support)
        let decode_input = input.clone();
        let (staged, width, height) = run_blocking(move || {
            let (img, format) = codec::decode(&decode_input)?;
            let staged = match format {
                ImageFormat::Jpeg | ImageFormat::Png | ImageFormat::WebP => None,
                _ => Some(codec::encode(&img, OutputFormat::Png, codec::DEFAULT_QUALITY)?),
            };
            Ok((staged, img.width(), img.height()))
        })
        .await?;

        if !tool_available(&self.cwebp_path) {
            tracing::warn!(cwebp = %self.cwebp_path, "cwebp not available, returning original");
            return Err(Self::degraded("cwebp encoder not available".to_string(), input));
        }

        let dir = tempfile::tempdir()?;
        let input_path = dir.path().join("input");
        let output_path = dir.path().join("output.webp");
        let staged = staged.map(Bytes::from).unwrap_or_else(|| input.clone());
        tokio::fs::write(&input_path, &staged).await?;

        let quality_arg = quality.to_string();
        let args: [&OsStr; 6] = [
            "-quiet".as_ref(),
            "-q".as_ref(),
            quality_arg.as_ref(),
            input_path.as_os_str(),
            "-o".as_ref(),
            output_path.as_os_str(),
        ];
        let output = match run_tool(&self.cwebp_path, args).await {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Self::degraded(
                    "cwebp encoder not available".to_string(),
                    input,
                ));
            }
            Err(e) => return Err(e.into()),
        };

        if !output.status.success() {
            return Err(ProcessorError::ProcessingFailed(format!(
                "cwebp failed: {}",
                stderr_tail(&output)
            )));
        }

        let data = tokio::fs::read(&output_path).await?;

        Ok(ProcessorResult::new(data, WEBP_CONTENT_TYPE)
            .with_filename("image.webp")
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some("webp".to_string()),
                compressed: true,
                ..Default::default()
            }))
    }
}
