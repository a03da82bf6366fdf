use crate::codec::{self, OutputFormat};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{
    require_options, ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES,
};
use ab_glyph::{FontVec, PxScale};
use async_trait::async_trait;
use bytes::Bytes;
use image::{imageops, DynamicImage, GenericImageView, Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;
use std::sync::Arc;

const MIN_FONT_SIZE: u32 = 12;
const DEFAULT_FONT_SIZE: u32 = 24;
const DEFAULT_OPACITY_PERCENT: u32 = 50;
const MARGIN: i32 = 10;
const SHADOW_OFFSET: i32 = 2;

/// Fonts tried when no font path is configured
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// Watermark position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    #[default]
    BottomRight,
    Center,
}

impl WatermarkPosition {
    /// Parse a position name; unknown names use bottom-right
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .map(|v| v.trim().to_lowercase().replace(['_', ' '], "-"))
            .as_deref()
        {
            Some("top-left") => WatermarkPosition::TopLeft,
            Some("top-right") => WatermarkPosition::TopRight,
            Some("bottom-left") => WatermarkPosition::BottomLeft,
            Some("center") | Some("centre") => WatermarkPosition::Center,
            _ => WatermarkPosition::BottomRight,
        }
    }

    /// Top-left corner of a `text_width`×`text_height` box inside the image
    pub fn origin(
        self,
        img_width: u32,
        img_height: u32,
        text_width: u32,
        text_height: u32,
    ) -> (i32, i32) {
        let right = img_width as i32 - text_width as i32 - MARGIN;
        let bottom = img_height as i32 - text_height as i32 - MARGIN;
        let (x, y) = match self {
            WatermarkPosition::TopLeft => (MARGIN, MARGIN),
            WatermarkPosition::TopRight => (right, MARGIN),
            WatermarkPosition::BottomLeft => (MARGIN, bottom),
            WatermarkPosition::BottomRight => (right, bottom),
            WatermarkPosition::Center => (
                (img_width as i32 - text_width as i32) / 2,
                (img_height as i32 - text_height as i32) / 2,
            ),
        };
        (x.max(0), y.max(0))
    }
}

/// Clamp a requested font size to `[12, min(width, height) / 4]`
pub fn clamp_font_size(requested: Option<u32>, img_width: u32, img_height: u32) -> u32 {
    let max = (img_width.min(img_height) / 4).max(MIN_FONT_SIZE);
    requested.unwrap_or(DEFAULT_FONT_SIZE).clamp(MIN_FONT_SIZE, max)
}

/// Load the configured font, or the first system font found
pub fn load_font(configured: Option<&str>) -> Option<FontVec> {
    let candidates = configured.into_iter().chain(SYSTEM_FONTS.iter().copied());
    for path in candidates {
        if !Path::new(path).is_file() {
            continue;
        }
        match std::fs::read(path).map(FontVec::try_from_vec) {
            Ok(Ok(font)) => {
                tracing::debug!(font = %path, "Loaded watermark font");
                return Some(font);
            }
            Ok(Err(e)) => tracing::warn!(font = %path, error = %e, "Invalid font file"),
            Err(e) => tracing::warn!(font = %path, error = %e, "Failed to read font file"),
        }
    }
    None
}

/// Draw `text` on a transparent layer: a half-opacity shadow, then the text
fn render_text_layer(
    width: u32,
    height: u32,
    text: &str,
    font_size: u32,
    alpha: u8,
    position: WatermarkPosition,
    font: Option<&FontVec>,
) -> RgbaImage {
    let mut layer = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0]));
    let shadow = Rgba([0, 0, 0, alpha / 2]);
    let color = Rgba([255, 255, 255, alpha]);

    match font {
        Some(font) => {
            let scale = PxScale::from(font_size as f32);
            let (text_width, text_height) = text_size(scale, font, text);
            let (x, y) = position.origin(width, height, text_width, text_height);
            draw_text_mut(
                &mut layer,
                shadow,
                x + SHADOW_OFFSET,
                y + SHADOW_OFFSET,
                scale,
                font,
                text,
            );
            draw_text_mut(&mut layer, color, x, y, scale, font, text);
        }
        None => {
            // Unfilled glyph boxes with fixed metrics
            let glyph_width = (font_size * 3 / 5).max(1);
            let text_width = glyph_width * text.chars().count() as u32;
            let (x, y) = position.origin(width, height, text_width, font_size);
            for (offset, pixel) in [(SHADOW_OFFSET, shadow), (0, color)] {
                for (i, ch) in text.chars().enumerate() {
                    if ch.is_whitespace() {
                        continue;
                    }
                    let gx = x + offset + (i as u32 * glyph_width) as i32;
                    let rect = Rect::at(gx + 1, y + offset).of_size(
                        glyph_width.saturating_sub(2).max(1),
                        font_size,
                    );
                    draw_hollow_rect_mut(&mut layer, rect, pixel);
                }
            }
        }
    }

    layer
}

/// Overlay translucent text on an image
pub fn apply_text_watermark(
    img: &DynamicImage,
    text: &str,
    font_size: u32,
    opacity: f32,
    position: WatermarkPosition,
    font: Option<&FontVec>,
) -> DynamicImage {
    let (width, height) = img.dimensions();
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    let layer = render_text_layer(width, height, text, font_size, alpha, position, font);

    let mut img_rgba = img.to_rgba8();
    imageops::overlay(&mut img_rgba, &layer, 0, 0);
    DynamicImage::ImageRgba8(img_rgba)
}

/// Text watermark. Never fails because a font is missing.
pub struct WatermarkProcessor {
    font: Option<Arc<FontVec>>,
}

impl WatermarkProcessor {
    pub fn new(font_path: Option<&str>) -> Self {
        let font = load_font(font_path);
        if font.is_none() {
            tracing::warn!("No watermark font found, falling back to outlined glyphs");
        }
        Self {
            font: font.map(Arc::new),
        }
    }

    pub fn without_font() -> Self {
        Self { font: None }
    }
}

#[async_trait]
impl Processor for WatermarkProcessor {
    fn name(&self) -> &'static str {
        "watermark"
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
        let text = options
            .text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProcessorError::InvalidConfig("watermark requires text".to_string()))?
            .to_string();

        let position = WatermarkPosition::parse(options.position.as_deref());
        let requested_size = options.font_size;
        let opacity = options
            .quality
            .unwrap_or(DEFAULT_OPACITY_PERCENT)
            .min(100) as f32
            / 100.0;
        let font = self.font.clone();

        let (data, format, width, height) = run_blocking(move || {
            let (img, source_format) = codec::decode(&input)?;
            let (width, height) = img.dimensions();
            let font_size = clamp_font_size(requested_size, width, height);
            let marked =
                apply_text_watermark(&img, &text, font_size, opacity, position, font.as_deref());
            let format =
                OutputFormat::from_image_format(source_format).unwrap_or(OutputFormat::Jpeg);
            let data = codec::encode(&marked, format, codec::DEFAULT_QUALITY)?;
            Ok((data, format, width, height))
        })
        .await?;

        Ok(ProcessorResult::new(data, format.content_type())
            .with_filename(format!("watermarked.{}", format.extension()))
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(format.name().to_string()),
                ..Default::default()
            }))
    }
}
