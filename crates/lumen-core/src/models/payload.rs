//! Typed queue payloads, one per job type.
//!
//! Every payload carries the owning file id and an optional job id. The job id
//! links the `processing_jobs` row created before enqueue to the execution
//! that picks the payload up.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capabilities the generic job pipeline needs from a payload
pub trait JobPayload: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn file_id(&self) -> Uuid;
    fn job_id(&self) -> Option<Uuid>;
    fn set_job_id(&mut self, job_id: Uuid);
}

macro_rules! impl_job_payload {
    ($($ty:ty),+ $(,)?) => {
        $(
            impl JobPayload for $ty {
                fn file_id(&self) -> Uuid {
                    self.file_id
                }

                fn job_id(&self) -> Option<Uuid> {
                    self.job_id
                }

                fn set_job_id(&mut self, job_id: Uuid) {
                    self.job_id = Some(job_id);
                }
            }
        )+
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub quality: Option<u32>,
    /// Crop anchor: center (default), north, south, east, west or a corner
    #[serde(default)]
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResizePayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    /// fit (default), cover or fill
    #[serde(default)]
    pub fit: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebpPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub font_size: Option<u32>,
    /// 0-100, mapped to text opacity
    #[serde(default)]
    pub opacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizePayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub format: String,
    #[serde(default)]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfThumbnailPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    /// 1-indexed; defaults to the first page
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub quality: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoTranscodePayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    /// 1-100, mapped to CRF; configured default CRF when absent
    #[serde(default)]
    pub quality: Option<u32>,
    /// Output height cap; configured default when absent
    #[serde(default)]
    pub max_resolution: Option<u32>,
    #[serde(default)]
    pub preset: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoThumbnailPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    /// Position in the video as a fraction of its duration
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub width: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoHlsPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub segment_duration: Option<u32>,
    #[serde(default)]
    pub max_resolution: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoWatermarkPayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub text: String,
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub opacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoSpritePayload {
    pub file_id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    #[serde(default)]
    pub columns: Option<u32>,
    #[serde(default)]
    pub rows: Option<u32>,
    /// Width of a single tile in pixels
    #[serde(default)]
    pub width: u32,
}

impl_job_payload!(
    ThumbnailPayload,
    ResizePayload,
    WebpPayload,
    WatermarkPayload,
    OptimizePayload,
    ConvertPayload,
    PdfThumbnailPayload,
    VideoTranscodePayload,
    VideoThumbnailPayload,
    VideoHlsPayload,
    VideoWatermarkPayload,
    VideoSpritePayload,
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn job_id_is_optional_and_settable() {
        let file_id = Uuid::new_v4();
        let mut payload: ThumbnailPayload = serde_json::from_value(json!({
            "file_id": file_id,
            "width": 200,
            "height": 200
        }))
        .unwrap();

        assert_eq!(payload.file_id(), file_id);
        assert_eq!(payload.job_id(), None);

        let job_id = Uuid::new_v4();
        payload.set_job_id(job_id);
        assert_eq!(payload.job_id(), Some(job_id));

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["job_id"], json!(job_id));
    }

    #[test]
    fn missing_required_field_fails_to_parse() {
        let result = serde_json::from_value::<ConvertPayload>(json!({
            "file_id": Uuid::new_v4()
        }));
        assert!(result.is_err());
    }
}
