//! ffprobe output parsing

use crate::error::ProcessorError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    codec_type: String,
    #[serde(default)]
    codec_name: String,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    format_name: String,
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// One stream of a probed file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub index: u32,
    pub codec_type: String,
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
}

/// Probed video metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    /// Seconds
    pub duration: f64,
    pub container: String,
    pub bitrate: Option<u64>,
    pub width: u32,
    pub height: u32,
    pub video_codec: String,
    pub frame_rate: Option<f64>,
    pub has_audio: bool,
    pub audio_codec: Option<String>,
    pub streams: Vec<StreamInfo>,
}

impl VideoMetadata {
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

/// Parse an ffprobe rational such as `30000/1001`
pub fn parse_rational(value: &str) -> Option<f64> {
    let (num, den) = value.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        None
    } else {
        Some(num / den)
    }
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output
pub fn parse_probe_output(raw: &[u8]) -> Result<VideoMetadata, ProcessorError> {
    let probe: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| ProcessorError::InvalidVideo(format!("unreadable ffprobe output: {e}")))?;

    let streams: Vec<StreamInfo> = probe
        .streams
        .iter()
        .map(|s| StreamInfo {
            index: s.index,
            codec_type: s.codec_type.clone(),
            codec_name: s.codec_name.clone(),
            width: s.width,
            height: s.height,
            frame_rate: s
                .r_frame_rate
                .as_deref()
                .and_then(parse_rational)
                .or_else(|| s.avg_frame_rate.as_deref().and_then(parse_rational)),
        })
        .collect();

    let video = streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| ProcessorError::InvalidVideo("no video stream found".to_string()))?;
    let audio = streams.iter().find(|s| s.codec_type == "audio");

    let (width, height) = match (video.width, video.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => {
            return Err(ProcessorError::InvalidVideo(
                "video stream has no dimensions".to_string(),
            ))
        }
    };

    let format = probe.format.as_ref();
    let duration = format
        .and_then(|f| f.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);
    let bitrate = format
        .and_then(|f| f.bit_rate.as_deref())
        .and_then(|b| b.parse::<u64>().ok());
    let container = format.map(|f| f.format_name.clone()).unwrap_or_default();

    Ok(VideoMetadata {
        duration,
        container,
        bitrate,
        width,
        height,
        video_codec: video.codec_name.clone(),
        frame_rate: video.frame_rate,
        has_audio: audio.is_some(),
        audio_codec: audio.map(|a| a.codec_name.clone()),
        streams,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
             "r_frame_rate": "30000/1001", "avg_frame_rate": "30000/1001"},
            {"index": 1, "codec_type": "audio", "codec_name": "aac", "r_frame_rate": "0/0"}
        ],
        "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.512000", "bit_rate": "4500000"}
    }"#;

    #[test]
    fn test_parse_probe_output() {
        let meta = parse_probe_output(SAMPLE.as_bytes()).unwrap();
        assert_eq!((meta.width, meta.height), (1920, 1080));
        assert_eq!(meta.video_codec, "h264");
        assert!((meta.duration - 12.512).abs() < 1e-9);
        assert_eq!(meta.bitrate, Some(4_500_000));
        assert!(meta.has_audio);
        assert_eq!(meta.audio_codec.as_deref(), Some("aac"));
        assert!((meta.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(meta.resolution(), "1920x1080");
        assert_eq!(meta.streams.len(), 2);
        assert_eq!(meta.streams[1].frame_rate, None);
    }

    #[test]
    fn test_no_video_stream() {
        let raw = r#"{"streams": [{"codec_type": "audio", "codec_name": "mp3"}], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(raw.as_bytes()),
            Err(ProcessorError::InvalidVideo(_))
        ));
    }

    #[test]
    fn test_silent_video() {
        let raw = r#"{"streams": [{"codec_type": "video", "codec_name": "vp9", "width": 640, "height": 360}]}"#;
        let meta = parse_probe_output(raw.as_bytes()).unwrap();
        assert!(!meta.has_audio);
        assert_eq!(meta.duration, 0.0);
    }

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("25/1"), Some(25.0));
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("abc"), None);
    }
}
