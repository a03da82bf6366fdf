pub mod file;
pub mod job;
pub mod payload;
pub mod user;
pub mod variant;

pub use file::{File, FileStatus};
pub use job::{JobStatus, JobType, ProcessingJob};
pub use payload::{
    ConvertPayload, JobPayload, OptimizePayload, PdfThumbnailPayload, ResizePayload,
    ThumbnailPayload, VideoHlsPayload, VideoSpritePayload, VideoThumbnailPayload,
    VideoTranscodePayload, VideoWatermarkPayload, WatermarkPayload, WebpPayload,
};
pub use user::{UserSettings, WebhookEndpoint};
pub use variant::{variant_storage_key, NewVariant, Variant, VariantType};
