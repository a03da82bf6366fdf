//! Raster decoding and encoding shared by the image, PDF and video processors
#![cfg_attr(not(feature = "image"), allow(dead_code))]

use crate::error::ProcessorError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, ImageFormat, ImageReader};
use std::io::Cursor;

pub const DEFAULT_QUALITY: u8 = 85;

/// Largest width or height an image processor will produce
pub const MAX_OUTPUT_DIMENSION: u32 = 16_384;

/// Reject output sizes beyond [`MAX_OUTPUT_DIMENSION`] before allocating them
pub fn check_output_size(width: u32, height: u32) -> Result<(), ProcessorError> {
    if width > MAX_OUTPUT_DIMENSION || height > MAX_OUTPUT_DIMENSION {
        return Err(ProcessorError::InvalidConfig(format!(
            "output size {width}x{height} exceeds {MAX_OUTPUT_DIMENSION}px"
        )));
    }
    Ok(())
}

/// Formats the image processors can write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
}

impl OutputFormat {
    /// Parse a user-supplied format name (`jpg` aliases `jpeg`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "gif" => Some(OutputFormat::Gif),
            "bmp" => Some(OutputFormat::Bmp),
            _ => None,
        }
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Jpeg => Some(OutputFormat::Jpeg),
            ImageFormat::Png => Some(OutputFormat::Png),
            ImageFormat::Gif => Some(OutputFormat::Gif),
            ImageFormat::Bmp => Some(OutputFormat::Bmp),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::Gif => "image/gif",
            OutputFormat::Bmp => "image/bmp",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::Gif => "gif",
            OutputFormat::Bmp => "bmp",
        }
    }
}

/// Clamp a 1-100 quality, defaulting when unset
pub fn clamp_quality(quality: Option<u32>) -> u8 {
    quality.map_or(DEFAULT_QUALITY, |q| q.clamp(1, 100) as u8)
}

/// File extension for a content type, `bin` when unknown
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        "image/webp" => "webp",
        "application/json" => "json",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "application/vnd.apple.mpegurl" => "m3u8",
        _ => "bin",
    }
}

/// Decode a raster image. Anything undecodable is a corrupted file.
pub fn decode(data: &[u8]) -> Result<(DynamicImage, ImageFormat), ProcessorError> {
    if data.is_empty() {
        return Err(ProcessorError::CorruptedFile("empty input".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessorError::CorruptedFile(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessorError::CorruptedFile("unrecognized image format".to_string()))?;
    let img = reader
        .decode()
        .map_err(|e| ProcessorError::CorruptedFile(e.to_string()))?;

    Ok((img, format))
}

/// Read width, height and format from the header without decoding pixels
pub fn probe_header(data: &[u8]) -> Result<(u32, u32, ImageFormat), ProcessorError> {
    if data.is_empty() {
        return Err(ProcessorError::CorruptedFile("empty input".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| ProcessorError::CorruptedFile(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessorError::CorruptedFile("unrecognized image format".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProcessorError::CorruptedFile(e.to_string()))?;

    Ok((width, height, format))
}

/// Encode an image. PNG always uses the best compression level.
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
) -> Result<Vec<u8>, ProcessorError> {
    let (width, height) = (img.width(), img.height());
    let mut buffer = Vec::with_capacity((width as usize).saturating_mul(height as usize));

    let result = match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buffer,
                CompressionType::Best,
                PngFilter::Adaptive,
            );
            DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)
        }
        OutputFormat::Gif => DynamicImage::ImageRgba8(img.to_rgba8())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Gif),
        OutputFormat::Bmp => DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Bmp),
    };

    result.map_err(|e| {
        ProcessorError::ProcessingFailed(format!("failed to encode {}: {}", format.name(), e))
    })?;

    Ok(buffer)
}

/// Select resampling filter based on resize ratio
pub fn select_filter(
    orig_width: u32,
    orig_height: u32,
    new_width: u32,
    new_height: u32,
) -> image::imageops::FilterType {
    let width_ratio = orig_width as f32 / new_width.max(1) as f32;
    let height_ratio = orig_height as f32 / new_height.max(1) as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        image::imageops::FilterType::Triangle
    } else if max_ratio > 1.5 {
        image::imageops::FilterType::CatmullRom
    } else {
        image::imageops::FilterType::Lanczos3
    }
}
