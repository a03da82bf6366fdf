use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Kind of derived artifact stored for a file
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum VariantType {
    Thumbnail,
    Small,
    Medium,
    Large,
    Webp,
    Watermarked,
    Optimized,
    Converted,
    PdfPreview,
    VideoThumbnail,
    #[serde(rename = "video_360p")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "video_360p"))]
    Video360p,
    #[serde(rename = "video_480p")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "video_480p"))]
    Video480p,
    #[serde(rename = "video_720p")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "video_720p"))]
    Video720p,
    #[serde(rename = "video_1080p")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "video_1080p"))]
    Video1080p,
    #[serde(rename = "video_2160p")]
    #[cfg_attr(feature = "sqlx", sqlx(rename = "video_2160p"))]
    Video2160p,
    HlsMaster,
    VideoWatermarked,
    VideoSprite,
}

const SMALL_MAX_DIMENSION: u32 = 320;
const MEDIUM_MAX_DIMENSION: u32 = 800;

impl VariantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariantType::Thumbnail => "thumbnail",
            VariantType::Small => "small",
            VariantType::Medium => "medium",
            VariantType::Large => "large",
            VariantType::Webp => "webp",
            VariantType::Watermarked => "watermarked",
            VariantType::Optimized => "optimized",
            VariantType::Converted => "converted",
            VariantType::PdfPreview => "pdf_preview",
            VariantType::VideoThumbnail => "video_thumbnail",
            VariantType::Video360p => "video_360p",
            VariantType::Video480p => "video_480p",
            VariantType::Video720p => "video_720p",
            VariantType::Video1080p => "video_1080p",
            VariantType::Video2160p => "video_2160p",
            VariantType::HlsMaster => "hls_master",
            VariantType::VideoWatermarked => "video_watermarked",
            VariantType::VideoSprite => "video_sprite",
        }
    }

    /// Size bucket for a resize target, by its larger requested edge.
    pub fn for_resize(width: u32, height: u32) -> Self {
        match width.max(height) {
            0..=SMALL_MAX_DIMENSION => VariantType::Small,
            d if d <= MEDIUM_MAX_DIMENSION => VariantType::Medium,
            _ => VariantType::Large,
        }
    }

    /// Transcode target bucket for an output height cap.
    pub fn for_video_height(height: u32) -> Self {
        match height {
            0..=360 => VariantType::Video360p,
            h if h <= 480 => VariantType::Video480p,
            h if h <= 720 => VariantType::Video720p,
            h if h <= 1080 => VariantType::Video1080p,
            _ => VariantType::Video2160p,
        }
    }
}

impl Display for VariantType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariantType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            VariantType::Thumbnail,
            VariantType::Small,
            VariantType::Medium,
            VariantType::Large,
            VariantType::Webp,
            VariantType::Watermarked,
            VariantType::Optimized,
            VariantType::Converted,
            VariantType::PdfPreview,
            VariantType::VideoThumbnail,
            VariantType::Video360p,
            VariantType::Video480p,
            VariantType::Video720p,
            VariantType::Video1080p,
            VariantType::Video2160p,
            VariantType::HlsMaster,
            VariantType::VideoWatermarked,
            VariantType::VideoSprite,
        ];
        all.into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Invalid variant type: {}", s))
    }
}

/// Default object key for a variant: `processed/{file_id}/{variant_type}/{filename}`
pub fn variant_storage_key(file_id: Uuid, variant_type: VariantType, filename: &str) -> String {
    format!("processed/{}/{}/{}", file_id, variant_type, filename)
}

/// A stored derived artifact.
///
/// Append-only: a job that runs twice records two rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct Variant {
    pub id: Uuid,
    pub file_id: Uuid,
    pub variant_type: VariantType,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`Variant`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVariant {
    pub file_id: Uuid,
    pub variant_type: VariantType,
    pub content_type: String,
    pub size_bytes: i64,
    pub storage_key: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_seconds: Option<f64>,
    pub resolution: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_layout() {
        let id = Uuid::nil();
        assert_eq!(
            variant_storage_key(id, VariantType::Thumbnail, "thumb.jpg"),
            "processed/00000000-0000-0000-0000-000000000000/thumbnail/thumb.jpg"
        );
    }

    #[test]
    fn resize_buckets() {
        assert_eq!(VariantType::for_resize(200, 0), VariantType::Small);
        assert_eq!(VariantType::for_resize(0, 320), VariantType::Small);
        assert_eq!(VariantType::for_resize(640, 480), VariantType::Medium);
        assert_eq!(VariantType::for_resize(1920, 1080), VariantType::Large);
    }

    #[test]
    fn video_buckets() {
        assert_eq!(VariantType::for_video_height(360), VariantType::Video360p);
        assert_eq!(VariantType::for_video_height(720), VariantType::Video720p);
        assert_eq!(VariantType::for_video_height(1000), VariantType::Video1080p);
        assert_eq!(VariantType::for_video_height(2160), VariantType::Video2160p);
    }

    #[test]
    fn serde_names_match_display() {
        let json = serde_json::to_string(&VariantType::Video720p).unwrap();
        assert_eq!(json, "\"video_720p\"");
        assert_eq!(
            "hls_master".parse::<VariantType>().unwrap(),
            VariantType::HlsMaster
        );
    }
}
