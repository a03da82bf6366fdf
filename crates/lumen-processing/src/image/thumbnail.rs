use crate::codec::{self, OutputFormat};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{
    require_options, ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES,
};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView};

/// Crop anchor for crop-to-fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Anchor {
    #[default]
    Center,
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

impl Anchor {
    /// Parse an anchor name; unknown names fall back to center
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Anchor::Center;
        };
        match value.trim().to_lowercase().replace(['_', ' '], "-").as_str() {
            "north" | "top" => Anchor::North,
            "south" | "bottom" => Anchor::South,
            "east" | "right" => Anchor::East,
            "west" | "left" => Anchor::West,
            "north-east" | "northeast" | "top-right" => Anchor::NorthEast,
            "north-west" | "northwest" | "top-left" => Anchor::NorthWest,
            "south-east" | "southeast" | "bottom-right" => Anchor::SouthEast,
            "south-west" | "southwest" | "bottom-left" => Anchor::SouthWest,
            _ => Anchor::Center,
        }
    }

    /// Offset of the crop window given the excess on each axis
    fn offset(self, excess_x: u32, excess_y: u32) -> (u32, u32) {
        let x = match self {
            Anchor::West | Anchor::NorthWest | Anchor::SouthWest => 0,
            Anchor::East | Anchor::NorthEast | Anchor::SouthEast => excess_x,
            _ => excess_x / 2,
        };
        let y = match self {
            Anchor::North | Anchor::NorthEast | Anchor::NorthWest => 0,
            Anchor::South | Anchor::SouthEast | Anchor::SouthWest => excess_y,
            _ => excess_y / 2,
        };
        (x, y)
    }
}

/// Scale to cover `width`×`height`, then crop the excess around the anchor.
pub fn crop_to_fill(img: &DynamicImage, width: u32, height: u32, anchor: Anchor) -> DynamicImage {
    let (orig_width, orig_height) = img.dimensions();
    let scale = (width as f64 / orig_width as f64).max(height as f64 / orig_height as f64);
    let scaled_width = ((orig_width as f64 * scale).ceil() as u32).max(width);
    let scaled_height = ((orig_height as f64 * scale).ceil() as u32).max(height);

    let filter = codec::select_filter(orig_width, orig_height, scaled_width, scaled_height);
    let scaled = img.resize_exact(scaled_width, scaled_height, filter);

    let (x, y) = anchor.offset(scaled_width - width, scaled_height - height);
    scaled.crop_imm(x, y, width, height)
}

/// Fixed-size thumbnail. Output is always JPEG.
pub struct ThumbnailProcessor;

#[async_trait]
impl Processor for ThumbnailProcessor {
    fn name(&self) -> &'static str {
        "thumbnail"
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
        if options.width == 0 || options.height == 0 {
            return Err(ProcessorError::InvalidConfig(
                "thumbnail requires width and height".to_string(),
            ));
        }

        let (width, height) = (options.width, options.height);
        codec::check_output_size(width, height)?;
        let anchor = Anchor::parse(options.anchor.as_deref());
        let quality = codec::clamp_quality(options.quality);

        let data = run_blocking(move || {
            let (img, _) = codec::decode(&input)?;
            let thumb = crop_to_fill(&img, width, height, anchor);
            codec::encode(&thumb, OutputFormat::Jpeg, quality)
        })
        .await?;

        Ok(ProcessorResult::new(data, OutputFormat::Jpeg.content_type())
            .with_filename("thumb.jpg")
            .with_metadata(ResultMetadata {
                width: Some(width),
                height: Some(height),
                format: Some(OutputFormat::Jpeg.name().to_string()),
                compressed: true,
                ..Default::default()
            }))
    }
}
