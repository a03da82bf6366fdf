use crate::codec::{self, OutputFormat};
use crate::error::{run_blocking, ProcessorError};
use crate::processor::{
    require_options, ProcessOptions, Processor, ProcessorResult, ResultMetadata, IMAGE_TYPES,
};
use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, GenericImageView};

/// Resize fit mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FitMode {
    /// Preserve aspect ratio, bounded by the target box
    #[default]
    Fit,
    /// Fill the box exactly, center-cropping the excess
    Cover,
    /// Stretch to the exact box, may distort
    Fill,
}

impl FitMode {
    pub fn parse(value: Option<&str>) -> Result<Self, ProcessorError> {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("fit") | Some("contain") => Ok(FitMode::Fit),
            Some("cover") => Ok(FitMode::Cover),
            Some("fill") => Ok(FitMode::Fill),
            Some(other) => Err(ProcessorError::InvalidConfig(format!(
                "unknown fit mode: {other}"
            ))),
        }
    }
}

/// Calculate target dimensions; 0 means "derive from the other side".
pub fn calculate_dimensions(
    orig_width: u32,
    orig_height: u32,
    width: u32,
    height: u32,
) -> (u32, u32) {
    match (width, height) {
        (0, 0) => (orig_width, orig_height),
        (w, 0) => {
            let aspect_ratio = orig_height as f64 / orig_width as f64;
            let h = (w as f64 * aspect_ratio).round() as u32;
            (w, h.max(1))
        }
        (0, h) => {
            let aspect_ratio = orig_width as f64 / orig_height as f64;
            let w = (h as f64 * aspect_ratio).round() as u32;
            (w.max(1), h)
        }
        (w, h) => (w, h),
    }
}

/// Largest size with the source aspect ratio that fits in `width`×`height`
pub fn fit_within(orig_width: u32, orig_height: u32, width: u32, height: u32) -> (u32, u32) {
    let scale = (width as f64 / orig_width as f64).min(height as f64 / orig_height as f64);
    let w = (orig_width as f64 * scale).round() as u32;
    let h = (orig_height as f64 * scale).round() as u32;
    (w.clamp(1, width), h.clamp(1, height))
}

/// Apply a fit mode to a decoded image
pub fn apply_fit(img: &DynamicImage, width: u32, height: u32, mode: FitMode) -> DynamicImage {
    let (orig_width, orig_height) = img.dimensions();
    let (target_width, target_height) =
        calculate_dimensions(orig_width, orig_height, width, height);
    let both_given = width > 0 && height > 0;

    match mode {
        FitMode::Fit if both_given => {
            let (w, h) = fit_within(orig_width, orig_height, width, height);
            let filter = codec::select_filter(orig_width, orig_height, w, h);
            img.resize_exact(w, h, filter)
        }
        FitMode::Cover if both_given => {
            let filter =
                codec::select_filter(orig_width, orig_height, target_width, target_height);
            img.resize_to_fill(target_width, target_height, filter)
        }
        // Fill, and every mode with a single derived side
        _ => {
            let filter =
                codec::select_filter(orig_width, orig_height, target_width, target_height);
            img.resize_exact(target_width, target_height, filter)
        }
    }
}

pub struct ResizeProcessor;

#[async_trait]
impl Processor for ResizeProcessor {
    fn name(&self) -> &'static str {
        "resize"
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
        if options.width == 0 && options.height == 0 {
            return Err(ProcessorError::InvalidConfig(
                "resize requires width or height".to_string(),
            ));
        }

        let mode = FitMode::parse(options.fit.as_deref())?;
        let requested = options.format_lowercase();
        let (width, height) = (options.width, options.height);
        let quality = codec::clamp_quality(options.quality);

        let (data, format, out_width, out_height) = run_blocking(move || {
            let (img, source_format) = codec::decode(&input)?;
            // Requested format wins; unknown names and unwritable sources fall back to JPEG
            let format = match requested {
                Some(name) => OutputFormat::from_name(&name).unwrap_or(OutputFormat::Jpeg),
                None => {
                    OutputFormat::from_image_format(source_format).unwrap_or(OutputFormat::Jpeg)
                }
            };
            let (target_width, target_height) =
                calculate_dimensions(img.width(), img.height(), width, height);
            codec::check_output_size(target_width, target_height)?;
            let resized = apply_fit(&img, width, height, mode);
            let (w, h) = resized.dimensions();
            Ok((codec::encode(&resized, format, quality)?, format, w, h))
        })
        .await?;

        Ok(ProcessorResult::new(data, format.content_type())
            .with_filename(format!("resized_{}x{}.{}", out_width, out_height, format.extension()))
            .with_metadata(ResultMetadata {
                width: Some(out_width),
                height: Some(out_height),
                format: Some(format.name().to_string()),
                compressed: true,
                ..Default::default()
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_support::{dimensions, jpeg, png};

    fn options(width: u32, height: u32, fit: &str) -> ProcessOptions {
        ProcessOptions {
            width,
            height,
            fit: Some(fit.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_calculate_dimensions() {
        assert_eq!(calculate_dimensions(640, 480, 0, 0), (640, 480));
        assert_eq!(calculate_dimensions(640, 480, 320, 0), (320, 240));
        assert_eq!(calculate_dimensions(640, 480, 0, 120), (160, 120));
        assert_eq!(calculate_dimensions(640, 480, 100, 100), (100, 100));
        // Rounding stays within a pixel
        let (w, h) = calculate_dimensions(1000, 333, 100, 0);
        assert_eq!(w, 100);
        assert!((h as i64 - 33).abs() <= 1);
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(800, 400, 200, 200), (200, 100));
        assert_eq!(fit_within(400, 800, 200, 200), (100, 200));
        assert_eq!(fit_within(100, 100, 300, 200), (200, 200));
    }

    #[tokio::test]
    async fn test_cover_is_exact() {
        let result = ResizeProcessor
            .process(Some(&options(150, 150, "cover")), Bytes::from(jpeg(800, 400)))
            .await
            .unwrap();
        assert_eq!(dimensions(&result.data), (150, 150));
        assert_eq!(result.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_fill_is_exact() {
        let result = ResizeProcessor
            .process(Some(&options(120, 300, "fill")), Bytes::from(png(800, 400)))
            .await
            .unwrap();
        assert_eq!(dimensions(&result.data), (120, 300));
        // Source format preserved
        assert_eq!(result.content_type, "image/png");
        assert_eq!(result.filename.as_deref(), Some("resized_120x300.png"));
    }

    #[tokio::test]
    async fn test_fit_preserves_aspect() {
        let result = ResizeProcessor
            .process(Some(&options(300, 300, "fit")), Bytes::from(jpeg(800, 400)))
            .await
            .unwrap();
        let (w, h) = dimensions(&result.data);
        assert_eq!(w, 300);
        assert!((h as i64 - 150).abs() <= 1);
    }

    #[tokio::test]
    async fn test_single_side_derives_other() {
        let options = ProcessOptions {
            height: 100,
            format: Some("gif".to_string()),
            ..Default::default()
        };
        let result = ResizeProcessor
            .process(Some(&options), Bytes::from(jpeg(400, 200)))
            .await
            .unwrap();
        assert_eq!(dimensions(&result.data), (200, 100));
        assert_eq!(result.content_type, "image/gif");
    }

    #[tokio::test]
    async fn test_unknown_format_falls_back_to_jpeg() {
        let options = ProcessOptions {
            width: 50,
            format: Some("tiff".to_string()),
            ..Default::default()
        };
        let result = ResizeProcessor
            .process(Some(&options), Bytes::from(png(100, 100)))
            .await
            .unwrap();
        assert_eq!(result.content_type, "image/jpeg");
    }

    #[tokio::test]
    async fn test_errors() {
        let err = ResizeProcessor
            .process(Some(&ProcessOptions::default()), Bytes::from(jpeg(10, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfig(_)));

        let err = ResizeProcessor
            .process(Some(&options(10, 10, "stretch")), Bytes::from(jpeg(10, 10)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfig(_)));

        let err = ResizeProcessor
            .process(Some(&options(10, 10, "fit")), Bytes::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::CorruptedFile(_)));
    }

    #[tokio::test]
    async fn test_derived_side_is_bounded() {
        // 10000 wide on a 1:10 source derives a 100000 px height
        let err = ResizeProcessor
            .process(Some(&options(10_000, 0, "fit")), Bytes::from(png(2, 20)))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidConfig(_)), "{err}");
    }
}
