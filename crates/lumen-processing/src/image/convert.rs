use crate::codec::{self, OutputFormat};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{
    require_options, ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES,
};
use async_trait::async_trait;
use bytes::Bytes;
use image::GenericImageView;

/// Format conversion to an explicit target.
///
/// Unlike resize and optimize there is no fallback: an unsupported target is
/// an `InvalidConfig` error.
pub struct ConvertProcessor;

fn target_format(name: Option<String>) -> Result<OutputFormat, ProcessorError> {
    let name = name.ok_or_else(|| {
        ProcessorError::InvalidConfig("convert requires a target format".to_string())
    })?;
    match OutputFormat::from_name(&name) {
        Some(format @ (OutputFormat::Jpeg | OutputFormat::Png | OutputFormat::Gif)) => Ok(format),
        _ => Err(ProcessorError::InvalidConfig(format!(
            "unsupported target format: {name}"
        ))),
    }
}

#[async_trait]
impl Processor for ConvertProcessor {
    fn name(&self) -> &'static str {
        "convert"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    async fn process(
        &self,
        options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError> {
        let options = require_options(self.name(), options)?;
        let format = target_format(options.format_lowercase())?;
        let quality = codec::clamp_quality(options.quality);

        let (data, width, height) = run_blocking(move || {
            let (img, _) = codec::decode(&input)?;
            let (width, height) = img.dimensions();
            Ok((codec::encode(&img, format, quality)?, width, height))
        })
        .await?;

        Ok(ProcessorResult::new(data, format.content_type())
            .with_filename(format!("converted.{}", format.extension()))
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(format.name().to_string()),
                ..Default::default()
            }))
    }
}
