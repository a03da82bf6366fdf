//! Configuration module
//!
//! Worker configuration is read from the environment (a `.env` file is loaded
//! first when present). Every setting except the database URL and the storage
//! backend details has a default.

use std::env;
use std::str::FromStr;

use crate::storage_types::StorageBackend;

// Common constants
const DB_MAX_CONNECTIONS: u32 = 10;
const DB_TIMEOUT_SECS: u64 = 30;
const WORKER_CONCURRENCY: usize = 4;
const WORKER_POLL_INTERVAL_MS: u64 = 1000;
const JOB_TIMEOUT_SECS: u64 = 3600;
const JOB_MAX_ATTEMPTS: u32 = 3;
const VIDEO_MAX_DURATION_SECS: f64 = 3600.0;
const VIDEO_DEFAULT_PRESET: &str = "medium";
const VIDEO_DEFAULT_CRF: u32 = 23;
const VIDEO_MAX_RESOLUTION: u32 = 1080;
const HLS_SEGMENT_DURATION: u32 = 6;
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            _ => Err(anyhow::anyhow!("Invalid log format: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub s3_bucket: Option<String>,
    pub s3_region: Option<String>,
    /// Custom endpoint for S3-compatible providers (MinIO, etc.)
    pub s3_endpoint: Option<String>,
    pub local_storage_path: Option<String>,
    pub local_storage_base_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval_ms: u64,
    pub job_timeout_seconds: u64,
    pub max_attempts: u32,
}

/// Paths (or PATH-resolved names) of the external media tools
#[derive(Clone, Debug)]
pub struct ToolPaths {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub cwebp: String,
    pub pdfinfo: String,
    pub pdftoppm: String,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            cwebp: "cwebp".to_string(),
            pdfinfo: "pdfinfo".to_string(),
            pdftoppm: "pdftoppm".to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub max_duration_seconds: f64,
    pub default_preset: String,
    pub default_crf: u32,
    pub max_resolution: u32,
    pub hls_segment_duration: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            max_duration_seconds: VIDEO_MAX_DURATION_SECS,
            default_preset: VIDEO_DEFAULT_PRESET.to_string(),
            default_crf: VIDEO_DEFAULT_CRF,
            max_resolution: VIDEO_MAX_RESOLUTION,
            hls_segment_duration: HLS_SEGMENT_DURATION,
        }
    }
}

/// Application configuration (processing worker).
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub log_format: LogFormat,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub storage: StorageConfig,
    pub worker: WorkerConfig,
    pub tools: ToolPaths,
    pub video: VideoConfig,
    pub watermark_font_path: Option<String>,
    pub webhook_timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = get("ENVIRONMENT")
            .or_else(|| get("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let log_format = match get("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        let database_url = get("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let backend = match get("STORAGE_BACKEND") {
            Some(value) => value.parse()?,
            None => StorageBackend::S3,
        };

        let storage = StorageConfig {
            backend,
            s3_bucket: get("S3_BUCKET"),
            s3_region: get("S3_REGION").or_else(|| get("AWS_REGION")),
            s3_endpoint: get("S3_ENDPOINT"),
            local_storage_path: get("LOCAL_STORAGE_PATH"),
            local_storage_base_url: get("LOCAL_STORAGE_BASE_URL"),
        };

        let worker = WorkerConfig {
            concurrency: parse_or(&get, "WORKER_CONCURRENCY", WORKER_CONCURRENCY),
            poll_interval_ms: parse_or(&get, "WORKER_POLL_INTERVAL_MS", WORKER_POLL_INTERVAL_MS),
            job_timeout_seconds: parse_or(&get, "JOB_TIMEOUT_SECONDS", JOB_TIMEOUT_SECS),
            max_attempts: parse_or(&get, "JOB_MAX_ATTEMPTS", JOB_MAX_ATTEMPTS),
        };

        let defaults = ToolPaths::default();
        let tools = ToolPaths {
            ffmpeg: get("FFMPEG_PATH").unwrap_or(defaults.ffmpeg),
            ffprobe: get("FFPROBE_PATH").unwrap_or(defaults.ffprobe),
            cwebp: get("CWEBP_PATH").unwrap_or(defaults.cwebp),
            pdfinfo: get("PDFINFO_PATH").unwrap_or(defaults.pdfinfo),
            pdftoppm: get("PDFTOPPM_PATH").unwrap_or(defaults.pdftoppm),
        };

        let video = VideoConfig {
            max_duration_seconds: parse_or(&get, "VIDEO_MAX_DURATION_SECONDS", VIDEO_MAX_DURATION_SECS),
            default_preset: get("VIDEO_DEFAULT_PRESET")
                .unwrap_or_else(|| VIDEO_DEFAULT_PRESET.to_string()),
            default_crf: parse_or(&get, "VIDEO_DEFAULT_CRF", VIDEO_DEFAULT_CRF),
            max_resolution: parse_or(&get, "VIDEO_MAX_RESOLUTION", VIDEO_MAX_RESOLUTION),
            hls_segment_duration: parse_or(&get, "HLS_SEGMENT_DURATION", HLS_SEGMENT_DURATION),
        };

        let config = Config {
            environment,
            log_format,
            database_url,
            db_max_connections: parse_or(&get, "DB_MAX_CONNECTIONS", DB_MAX_CONNECTIONS),
            db_timeout_seconds: parse_or(&get, "DB_TIMEOUT_SECONDS", DB_TIMEOUT_SECS),
            storage,
            worker,
            tools,
            video,
            watermark_font_path: get("WATERMARK_FONT_PATH"),
            webhook_timeout_seconds: parse_or(&get, "WEBHOOK_TIMEOUT_SECONDS", WEBHOOK_TIMEOUT_SECS),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        matches!(self.environment.to_lowercase().as_str(), "production" | "prod")
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://"))
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.worker.concurrency == 0 {
            return Err(anyhow::anyhow!("WORKER_CONCURRENCY must be at least 1"));
        }

        if self.video.default_crf > 51 {
            return Err(anyhow::anyhow!("VIDEO_DEFAULT_CRF must be between 0 and 51"));
        }

        if self.video.hls_segment_duration == 0 {
            return Err(anyhow::anyhow!("HLS_SEGMENT_DURATION must be at least 1"));
        }

        match self.storage.backend {
            StorageBackend::S3 => {
                if self.storage.s3_bucket.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_BUCKET must be set when using S3 storage backend"
                    ));
                }
                if self.storage.s3_region.is_none() {
                    return Err(anyhow::anyhow!(
                        "S3_REGION or AWS_REGION must be set when using S3 storage backend"
                    ));
                }
            }
            StorageBackend::Local => {
                if self.storage.local_storage_path.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_PATH must be set when using local storage backend"
                    ));
                }
                if self.storage.local_storage_base_url.is_none() {
                    return Err(anyhow::anyhow!(
                        "LOCAL_STORAGE_BASE_URL must be set when using local storage backend"
                    ));
                }
            }
        }

        Ok(())
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key = key, value = %raw, "Invalid configuration value, using default");
                default
            }
        },
        None => default,
    }
}
