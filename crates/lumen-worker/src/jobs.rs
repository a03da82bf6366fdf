//! Per-job-type pipeline configurations
//!
//! Content types are not checked here: the pipeline rejects files the named
//! processor does not list in its supported types.

use std::sync::Arc;

use lumen_core::models::{
    variant_storage_key, ConvertPayload, JobType, OptimizePayload, PdfThumbnailPayload,
    ResizePayload, ThumbnailPayload, VariantType, VideoSpritePayload, VideoThumbnailPayload,
    VideoTranscodePayload, VideoWatermarkPayload, WatermarkPayload, WebpPayload,
};
use lumen_processing::{ProcessOptions, ProcessorResult, VideoProcessor};

use crate::handler::Handlers;
use crate::hls::HlsHandler;
use crate::pipeline::{FileJobBuilder, JobConfig, JobDeps};

fn require_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        Err("Watermark text must not be empty".to_string())
    } else {
        Ok(())
    }
}

/// Processor-suggested filename, or `fallback`
fn suggested(result: &ProcessorResult, fallback: impl FnOnce() -> String) -> String {
    result.filename.clone().unwrap_or_else(fallback)
}

pub fn thumbnail() -> JobConfig<ThumbnailPayload> {
    JobConfig::<ThumbnailPayload>::new(
        JobType::Thumbnail,
        "thumbnail",
        VariantType::Thumbnail,
        |_, _| "thumb.jpg".to_string(),
        |p| ProcessOptions {
            width: p.width,
            height: p.height,
            quality: p.quality,
            anchor: p.anchor.clone(),
            ..Default::default()
        },
    )
    .with_validation(|p, _| {
        if p.width == 0 || p.height == 0 {
            return Err(format!(
                "Thumbnail size must be positive, got {}x{}",
                p.width, p.height
            ));
        }
        Ok(())
    })
    .completes_file()
}

/// Resize picks its variant bucket (small/medium/large) from the requested size
pub fn resize() -> JobConfig<ResizePayload> {
    JobConfig::<ResizePayload>::new(
        JobType::Resize,
        "resize",
        VariantType::Medium,
        |p, result| suggested(result, || format!("resized_{}x{}", p.width, p.height)),
        |p| ProcessOptions {
            width: p.width,
            height: p.height,
            fit: p.fit.clone(),
            format: p.format.clone(),
            quality: p.quality,
            ..Default::default()
        },
    )
    .with_variant_key(|p, file_id, filename, _| {
        let variant_type = VariantType::for_resize(p.width, p.height);
        (variant_type, variant_storage_key(file_id, variant_type, filename))
    })
    .with_validation(|p, _| {
        if p.width == 0 && p.height == 0 {
            return Err("Resize needs a width or a height".to_string());
        }
        Ok(())
    })
}

pub fn webp() -> JobConfig<WebpPayload> {
    JobConfig::<WebpPayload>::new(
        JobType::Webp,
        "webp",
        VariantType::Webp,
        |_, _| "image.webp".to_string(),
        |p| ProcessOptions {
            quality: p.quality,
            ..Default::default()
        },
    )
}

pub fn watermark() -> JobConfig<WatermarkPayload> {
    JobConfig::<WatermarkPayload>::new(
        JobType::Watermark,
        "watermark",
        VariantType::Watermarked,
        |_, result| suggested(result, || "watermarked.jpg".to_string()),
        |p| ProcessOptions {
            text: Some(p.text.clone()),
            position: p.position.clone(),
            font_size: p.font_size,
            // Processors read text opacity from the quality slot
            quality: p.opacity,
            ..Default::default()
        },
    )
    .with_validation(|p, _| require_text(&p.text))
}

pub fn optimize() -> JobConfig<OptimizePayload> {
    JobConfig::<OptimizePayload>::new(
        JobType::Optimize,
        "optimize",
        VariantType::Optimized,
        |_, result| suggested(result, || "optimized.jpg".to_string()),
        |p| ProcessOptions {
            quality: p.quality,
            ..Default::default()
        },
    )
    .completes_file()
}

pub fn convert() -> JobConfig<ConvertPayload> {
    JobConfig::<ConvertPayload>::new(
        JobType::Convert,
        "convert",
        VariantType::Converted,
        |p, result| {
            suggested(result, || {
                format!("converted.{}", p.format.trim().to_lowercase())
            })
        },
        |p| ProcessOptions {
            format: Some(p.format.clone()),
            quality: p.quality,
            ..Default::default()
        },
    )
    .with_validation(|p, _| {
        if p.format.trim().is_empty() {
            return Err("Convert needs a target format".to_string());
        }
        Ok(())
    })
}

pub fn pdf_thumbnail() -> JobConfig<PdfThumbnailPayload> {
    JobConfig::<PdfThumbnailPayload>::new(
        JobType::PdfThumbnail,
        "pdf_thumbnail",
        VariantType::PdfPreview,
        |p, result| suggested(result, || format!("page_{}.png", p.page.unwrap_or(1))),
        |p| ProcessOptions {
            page: p.page,
            width: p.width,
            height: p.height,
            format: p.format.clone(),
            quality: p.quality,
            ..Default::default()
        },
    )
    .completes_file()
}

/// Transcode buckets its variant by the height actually encoded
pub fn video_transcode() -> JobConfig<VideoTranscodePayload> {
    JobConfig::<VideoTranscodePayload>::new(
        JobType::VideoTranscode,
        "video_transcode",
        VariantType::Video1080p,
        |p, result| {
            suggested(result, || {
                format!("{}p.mp4", p.max_resolution.unwrap_or(1080))
            })
        },
        |p| ProcessOptions {
            quality: p.quality,
            max_resolution: p.max_resolution,
            preset: p.preset.clone(),
            ..Default::default()
        },
    )
    .with_variant_key(|p, file_id, filename, result| {
        let height = result
            .metadata
            .height
            .or(p.max_resolution)
            .unwrap_or(1080);
        let variant_type = VariantType::for_video_height(height);
        (variant_type, variant_storage_key(file_id, variant_type, filename))
    })
    .completes_file()
    .deletes_original()
}

pub fn video_thumbnail() -> JobConfig<VideoThumbnailPayload> {
    JobConfig::<VideoThumbnailPayload>::new(
        JobType::VideoThumbnail,
        "video_thumbnail",
        VariantType::VideoThumbnail,
        |_, _| "thumbnail.jpg".to_string(),
        |p| ProcessOptions {
            percent: p.percent,
            width: p.width,
            ..Default::default()
        },
    )
}

pub fn video_watermark() -> JobConfig<VideoWatermarkPayload> {
    JobConfig::<VideoWatermarkPayload>::new(
        JobType::VideoWatermark,
        "video_watermark",
        VariantType::VideoWatermarked,
        |_, _| "watermarked.mp4".to_string(),
        |p| ProcessOptions {
            text: Some(p.text.clone()),
            position: p.position.clone(),
            quality: p.opacity,
            ..Default::default()
        },
    )
    .with_validation(|p, _| require_text(&p.text))
}

pub fn video_sprite() -> JobConfig<VideoSpritePayload> {
    JobConfig::<VideoSpritePayload>::new(
        JobType::VideoSprite,
        "video_sprite",
        VariantType::VideoSprite,
        |_, _| "sprite.jpg".to_string(),
        |p| ProcessOptions {
            columns: p.columns,
            rows: p.rows,
            width: p.width,
            ..Default::default()
        },
    )
}

/// Handler table covering every job type
pub fn default_handlers(deps: &JobDeps, video: Arc<VideoProcessor>) -> Handlers {
    let mut handlers = Handlers::new();
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), thumbnail())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), resize())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), webp())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), watermark())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), optimize())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), convert())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), pdf_thumbnail())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), video_transcode())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), video_thumbnail())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), video_watermark())));
    handlers.register(Arc::new(FileJobBuilder::new(deps.clone(), video_sprite())));
    handlers.register(Arc::new(HlsHandler::new(deps.clone(), video)));
    handlers
}
