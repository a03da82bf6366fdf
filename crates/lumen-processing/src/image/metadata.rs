use crate::codec;
use crate::error::ProcessorError;
use crate::processor::{ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ImageInfo {
    width: u32,
    height: u32,
    format: String,
    size_bytes: u64,
}

/// Header-only dimension probe. Tolerates `None` options.
pub struct MetadataProcessor;

#[async_trait]
impl Processor for MetadataProcessor {
    fn name(&self) -> &'static str {
        "metadata"
    }

    fn supported_types(&self) -> &'static [&'static str] {
        IMAGE_TYPES
    }

    async fn process(
        &self,
        _options: Option<&ProcessOptions>,
        input: Bytes,
    ) -> Result<ProcessorResult, ProcessorError> {
        let (width, height, format) = codec::probe_header(&input)?;
        let format = format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("unknown")
            .to_string();

        let info = ImageInfo {
            width,
            height,
            format: format.clone(),
            size_bytes: input.len() as u64,
        };
        let json = serde_json::to_vec(&info)
            .map_err(|e| ProcessorError::ProcessingFailed(e.to_string()))?;

        Ok(ProcessorResult::new(json, "application/json")
            .with_filename("metadata.json")
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(format),
                ..Default::default()
            }))
    }
}
