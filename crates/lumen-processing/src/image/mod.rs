//! Image processors
//!
//! - thumbnail: fixed-size crop-to-fill, always JPEG
//! - resize: fit / cover / fill geometry
//! - webp: external `cwebp` with a degraded fallback
//! - watermark: translucent text overlay
//! - optimize: downscale oversized images and recompress
//! - convert: explicit format change
//! - metadata: header-only dimension probe

pub mod convert;
pub mod metadata;
pub mod optimize;
pub mod resize;
pub mod thumbnail;
pub mod watermark;
pub mod webp;

pub use convert::ConvertProcessor;
pub use metadata::MetadataProcessor;
pub use optimize::OptimizeProcessor;
pub use resize::{calculate_dimensions, FitMode, ResizeProcessor};
pub use thumbnail::{Anchor, ThumbnailProcessor};
pub use watermark::{WatermarkPosition, WatermarkProcessor};
pub use webp::WebpProcessor;
