//! FFmpeg argument construction
//!
//! Everything here is pure so the exact command lines can be unit tested.

use std::path::{Path, PathBuf};

/// x264 presets accepted from payloads
pub const X264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

/// Bitrate ladder entry keyed by output height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionPreset {
    pub width: u32,
    pub height: u32,
    pub video_bitrate: &'static str,
    pub audio_bitrate: &'static str,
}

/// Look up the bitrate preset for an output height
pub fn preset_for_height(height: u32) -> ResolutionPreset {
    match height {
        0..=360 => ResolutionPreset {
            width: 640,
            height: 360,
            video_bitrate: "800k",
            audio_bitrate: "64k",
        },
        361..=480 => ResolutionPreset {
            width: 854,
            height: 480,
            video_bitrate: "1500k",
            audio_bitrate: "96k",
        },
        481..=720 => ResolutionPreset {
            width: 1280,
            height: 720,
            video_bitrate: "3000k",
            audio_bitrate: "128k",
        },
        721..=1080 => ResolutionPreset {
            width: 1920,
            height: 1080,
            video_bitrate: "5000k",
            audio_bitrate: "192k",
        },
        _ => ResolutionPreset {
            width: 3840,
            height: 2160,
            video_bitrate: "15000k",
            audio_bitrate: "256k",
        },
    }
}

/// Map quality 0-100 to CRF 51-0 (integer truncation)
pub fn crf_from_quality(quality: u32) -> u32 {
    51 - quality.min(100) * 51 / 100
}

/// Escape `value` for one level of ffmpeg's token parser: each character in
/// `special` (and the backslash itself) gets a backslash prefix.
fn escape_level(value: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        if ch == '\\' || special.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Escape a value embedded in a `-vf` filter option.
///
/// The string is unescaped twice: once by the filtergraph parser, which
/// splits on `[],;`, then by the filter's option parser, which splits on
/// `:`. The option level is applied first so the graph level wraps it.
pub fn escape_filter_value(value: &str) -> String {
    let option_level = escape_level(value, &['\'', ':', '=']);
    escape_level(&option_level, &['\'', '[', ']', ',', ';'])
}

/// Escape watermark text for `drawtext=text=...`.
///
/// Line breaks become spaces. The filter is built with `expansion=none`, so
/// `%` needs no escaping.
pub fn escape_drawtext(text: &str) -> String {
    let single_line: String = text
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    escape_filter_value(&single_line)
}

/// Parameters shared by transcode and HLS encodes
#[derive(Debug, Clone)]
pub struct EncodeParams {
    pub crf: u32,
    pub preset: String,
    /// Height cap; the source is downscaled only when taller
    pub max_height: u32,
    pub source_height: u32,
    pub has_audio: bool,
}

impl EncodeParams {
    /// Height of the encoded output
    pub fn output_height(&self) -> u32 {
        if self.max_height > 0 && self.source_height > self.max_height {
            self.max_height
        } else {
            self.source_height
        }
    }

    fn push_codec_args(&self, args: &mut Vec<String>) {
        args.extend([
            "-c:v".to_string(),
            "libx264".to_string(),
            "-preset".to_string(),
            self.preset.clone(),
            "-crf".to_string(),
            self.crf.to_string(),
            "-pix_fmt".to_string(),
            "yuv420p".to_string(),
        ]);

        if self.max_height > 0 && self.source_height > self.max_height {
            // -2 keeps the aspect ratio with an even width
            args.extend(["-vf".to_string(), format!("scale=-2:{}", self.max_height)]);
        }

        if self.has_audio {
            let preset = preset_for_height(self.output_height());
            args.extend([
                "-c:a".to_string(),
                "aac".to_string(),
                "-b:a".to_string(),
                preset.audio_bitrate.to_string(),
            ]);
        } else {
            args.push("-an".to_string());
        }
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// H.264 MP4 transcode
pub fn build_transcode_args(input: &Path, output: &Path, params: &EncodeParams) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
    params.push_codec_args(&mut args);
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]);
    args
}

/// Single-rendition HLS encode into `output_dir`
pub fn build_hls_args(
    input: &Path,
    output_dir: &Path,
    params: &EncodeParams,
    segment_duration: u32,
) -> Vec<String> {
    let mut args = vec!["-y".to_string(), "-i".to_string(), path_arg(input)];
    params.push_codec_args(&mut args);
    args.extend([
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        segment_duration.max(1).to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_segment_filename".to_string(),
        path_arg(&output_dir.join("segment_%03d.ts")),
        path_arg(&output_dir.join(super::HLS_MANIFEST_NAME)),
    ]);
    args
}

/// Extract one JPEG frame at `timestamp` seconds, optionally scaled to `width`
pub fn build_thumbnail_args(input: &Path, output: &Path, timestamp: f64, width: u32) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", timestamp.max(0.0)),
        "-i".to_string(),
        path_arg(input),
        "-frames:v".to_string(),
        "1".to_string(),
    ];
    if width > 0 {
        args.extend(["-vf".to_string(), format!("scale={width}:-2")]);
    }
    args.extend(["-q:v".to_string(), "2".to_string(), path_arg(output)]);
    args
}

/// Video watermark placement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoWatermarkPosition {
    TopLeft,
    TopRight,
    BottomLeft,
    Center,
    #[default]
    BottomRight,
}

impl VideoWatermarkPosition {
    pub fn parse(value: Option<&str>) -> Self {
        match value
            .map(|v| v.trim().to_lowercase().replace(['_', ' '], "-"))
            .as_deref()
        {
            Some("top-left") => VideoWatermarkPosition::TopLeft,
            Some("top-right") => VideoWatermarkPosition::TopRight,
            Some("bottom-left") => VideoWatermarkPosition::BottomLeft,
            Some("center") | Some("centre") => VideoWatermarkPosition::Center,
            _ => VideoWatermarkPosition::BottomRight,
        }
    }

    /// drawtext `x`/`y` expressions
    fn coordinates(self) -> (&'static str, &'static str) {
        match self {
            VideoWatermarkPosition::TopLeft => ("10", "10"),
            VideoWatermarkPosition::TopRight => ("w-tw-10", "10"),
            VideoWatermarkPosition::BottomLeft => ("10", "h-th-10"),
            VideoWatermarkPosition::Center => ("(w-tw)/2", "(h-th)/2"),
            VideoWatermarkPosition::BottomRight => ("w-tw-10", "h-th-10"),
        }
    }
}

/// Font size for a video of `height` pixels
pub fn watermark_font_size(height: u32) -> u32 {
    (height / 20).max(16)
}

/// Build the drawtext filter. `text` is escaped here; callers pass it raw.
pub fn build_drawtext_filter(
    text: &str,
    position: VideoWatermarkPosition,
    video_height: u32,
    opacity: f32,
    font_path: Option<&str>,
) -> String {
    let (x, y) = position.coordinates();
    let opacity = opacity.clamp(0.0, 1.0);
    let mut filter = format!(
        "drawtext=expansion=none:text={}:fontsize={}:fontcolor=white@{:.2}:shadowcolor=black@{:.2}:shadowx=2:shadowy=2:x={}:y={}",
        escape_drawtext(text),
        watermark_font_size(video_height),
        opacity,
        opacity / 2.0,
        x,
        y,
    );
    if let Some(font) = font_path {
        filter.push_str(&format!(":fontfile={}", escape_filter_value(font)));
    }
    filter
}

/// Re-encode with a text overlay, copying audio
pub fn build_watermark_args(
    input: &Path,
    output: &Path,
    filter: &str,
    params: &EncodeParams,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        filter.to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        params.preset.clone(),
        "-crf".to_string(),
        params.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ];
    if params.has_audio {
        args.extend(["-c:a".to_string(), "copy".to_string()]);
    } else {
        args.push("-an".to_string());
    }
    args.extend([
        "-movflags".to_string(),
        "+faststart".to_string(),
        path_arg(output),
    ]);
    args
}

/// Sprite sheet layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteLayout {
    pub columns: u32,
    pub rows: u32,
    /// Width of one tile
    pub tile_width: u32,
    /// Seconds between sampled frames
    pub interval: f64,
}

impl SpriteLayout {
    pub fn new(duration: f64, columns: u32, rows: u32, tile_width: u32) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        let frames = (columns * rows) as f64;
        Self {
            columns,
            rows,
            tile_width: tile_width.max(16),
            interval: (duration / frames).max(0.1),
        }
    }

    pub fn filter(&self) -> String {
        format!(
            "fps=1/{:.3},scale={}:-1,tile={}x{}",
            self.interval, self.tile_width, self.columns, self.rows
        )
    }
}

/// Tile sampled frames into a single JPEG
pub fn build_sprite_args(input: &Path, output: &Path, layout: &SpriteLayout) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        layout.filter(),
        "-frames:v".to_string(),
        "1".to_string(),
        "-q:v".to_string(),
        "3".to_string(),
        path_arg(output),
    ]
}

/// Sum of `#EXTINF` durations in an HLS manifest
pub fn manifest_duration(manifest: &str) -> f64 {
    manifest
        .lines()
        .filter_map(|line| line.strip_prefix("#EXTINF:"))
        .filter_map(|rest| rest.split(',').next())
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .sum()
}

/// Numeric index of a `segment_NNN.ts` file
fn segment_index(path: &Path) -> Option<u64> {
    path.file_stem()?
        .to_str()?
        .rsplit('_')
        .next()?
        .parse()
        .ok()
}

/// Order segments by playback index, so `segment_1000.ts` follows
/// `segment_999.ts`. Unnumbered files go last, by name.
pub fn sort_segments(paths: &mut [PathBuf]) {
    paths.sort_by(|a, b| match (segment_index(a), segment_index(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.cmp(b),
    });
}
