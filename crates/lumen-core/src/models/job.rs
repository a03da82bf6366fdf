use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[cfg(feature = "sqlx")]
use sqlx::FromRow;

/// Kind of processing job. The string form doubles as the queue routing key.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Thumbnail,
    Resize,
    Webp,
    Watermark,
    Optimize,
    Convert,
    PdfThumbnail,
    VideoTranscode,
    VideoThumbnail,
    VideoHls,
    VideoWatermark,
    VideoSprite,
}

impl JobType {
    pub const ALL: [JobType; 12] = [
        JobType::Thumbnail,
        JobType::Resize,
        JobType::Webp,
        JobType::Watermark,
        JobType::Optimize,
        JobType::Convert,
        JobType::PdfThumbnail,
        JobType::VideoTranscode,
        JobType::VideoThumbnail,
        JobType::VideoHls,
        JobType::VideoWatermark,
        JobType::VideoSprite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Thumbnail => "thumbnail",
            JobType::Resize => "resize",
            JobType::Webp => "webp",
            JobType::Watermark => "watermark",
            JobType::Optimize => "optimize",
            JobType::Convert => "convert",
            JobType::PdfThumbnail => "pdf_thumbnail",
            JobType::VideoTranscode => "video_transcode",
            JobType::VideoThumbnail => "video_thumbnail",
            JobType::VideoHls => "video_hls",
            JobType::VideoWatermark => "video_watermark",
            JobType::VideoSprite => "video_sprite",
        }
    }
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Invalid job type: {}", s))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "text", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Record of one processing request against a file.
///
/// Created before the payload is enqueued; each execution attempt moves it to
/// `running` once and then to exactly one terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(FromRow))]
pub struct ProcessingJob {
    pub id: Uuid,
    pub file_id: Uuid,
    pub job_type: JobType,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
