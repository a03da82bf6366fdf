use crate::codec::{self, OutputFormat};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES};
use async_trait::async_trait;
use bytes::Bytes;
use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};

/// Longest side kept by the optimizer
pub const MAX_DIMENSION: u32 = 4096;

/// Downscale oversized images and recompress. PNG stays PNG, everything
/// else becomes JPEG.
pub struct OptimizeProcessor;

#[async_trait]
impl Processor for OptimizeProcessor {
    fn name(&self) -> &'static str {
        "optimize"
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
        let original_size = input.len();

        let (data, format, width, height) = run_blocking(move || {
            let (mut img, source_format) = codec::decode(&input)?;
            let (width, height) = img.dimensions();
            if width > MAX_DIMENSION || height > MAX_DIMENSION {
                // resize() preserves the aspect ratio inside the box
                img = img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3);
            }
            let format = match source_format {
                ImageFormat::Png => OutputFormat::Png,
                _ => OutputFormat::Jpeg,
            };
            let (width, height) = img.dimensions();
            Ok((codec::encode(&img, format, quality)?, format, width, height))
        })
        .await?;

        tracing::debug!(
            original_size = original_size,
            optimized_size = data.len(),
            width = width,
            height = height,
            "Image optimized"
        );

        Ok(ProcessorResult::new(data, format.content_type())
            .with_filename(format!("optimized.{}", format.extension()))
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(format.name().to_string()),
                compressed: true,
                ..Default::default()
            }))
    }
}
