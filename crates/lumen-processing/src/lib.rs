//! Lumen Processing Library
//!
//! The [`Processor`] contract, the name-keyed [`Registry`] and the built-in
//! processors for images, PDFs and video. Each media type sits behind a cargo
//! feature of the same name.

#[cfg(any(feature = "image", feature = "pdf", feature = "video"))]
pub mod codec;
pub mod command;
pub mod error;
#[cfg(feature = "image")]
pub mod image;
#[cfg(feature = "pdf")]
pub mod pdf;
pub mod processor;
pub mod registry;
#[cfg(feature = "video")]
pub mod video;

use lumen_core::Config;
#[cfg(any(feature = "image", feature = "pdf", feature = "video"))]
use std::sync::Arc;

// Re-export commonly used types
pub use command::tool_available;
pub use error::ProcessorError;
#[cfg(feature = "pdf")]
pub use pdf::PdfProcessor;
pub use processor::{
    ensure_supported, ProcessOptions, Processor, ProcessorResult, ResultMetadata,
};
pub use registry::Registry;
#[cfg(feature = "video")]
pub use video::{
    HlsOutput, VideoJobProcessor, VideoMetadata, VideoOperation, VideoProcessor, VIDEO_TYPES,
};

/// Build a registry holding every processor enabled at compile time,
/// configured with the tool paths and font from `config`.
#[cfg_attr(
    not(any(feature = "image", feature = "pdf", feature = "video")),
    allow(unused_variables)
)]
pub fn build_registry(config: &Config) -> Registry {
    let registry = Registry::new();

    #[cfg(feature = "image")]
    {
        use crate::image::*;
        registry.register("thumbnail", Arc::new(ThumbnailProcessor) as _);
        registry.register("resize", Arc::new(ResizeProcessor) as _);
        registry.register("webp", Arc::new(WebpProcessor::new(config.tools.cwebp.clone())) as _);
        registry.register(
            "watermark",
            Arc::new(WatermarkProcessor::new(config.watermark_font_path.as_deref())) as _,
        );
        registry.register("optimize", Arc::new(OptimizeProcessor) as _);
        registry.register("convert", Arc::new(ConvertProcessor) as _);
        registry.register("metadata", Arc::new(MetadataProcessor) as _);
    }

    #[cfg(feature = "pdf")]
    registry.register(
        "pdf_thumbnail",
        Arc::new(PdfProcessor::new(
            config.tools.pdfinfo.clone(),
            config.tools.pdftoppm.clone(),
        )) as _,
    );

    #[cfg(feature = "video")]
    register_video(&registry, Arc::new(video_processor(config)));

    tracing::info!(processors = ?registry.names(), "Processor registry built");
    registry
}

/// Video processor configured from `config`
#[cfg(feature = "video")]
pub fn video_processor(config: &Config) -> VideoProcessor {
    VideoProcessor::new(&config.tools, &config.video)
        .with_font_path(config.watermark_font_path.clone())
}

/// Register every single-output video operation backed by `video`
#[cfg(feature = "video")]
pub fn register_video(registry: &Registry, video: Arc<VideoProcessor>) {
    for operation in VideoOperation::ALL {
        registry.register(
            operation.processor_name(),
            Arc::new(VideoJobProcessor::new(video.clone(), operation)) as _,
        );
    }
}
