//! Representative frame sampling with ffmpeg/ffprobe.

use crate::config::VideoConfig;
use crate::error::{Result, StockMetaError};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgb};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Note attached to results produced from placeholder frames.
pub const PLACEHOLDER_NOTE: &str =
    "Used placeholder frames - install FFmpeg for better frame extraction";

const FALLBACK_DURATION_SECS: f64 = 10.0;
const FALLBACK_FPS: f64 = 25.0;
const MAX_PLACEHOLDERS: usize = 3;
const PLACEHOLDER_WIDTH: u32 = 640;
const PLACEHOLDER_HEIGHT: u32 = 480;

/// Basic properties of a probed video.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub fps: f64,
    pub total_frames: u64,
}

impl VideoInfo {
    /// Values assumed when the video cannot be probed.
    pub fn fallback() -> Self {
        Self {
            duration_secs: FALLBACK_DURATION_SECS,
            fps: FALLBACK_FPS,
            total_frames: (FALLBACK_DURATION_SECS * FALLBACK_FPS) as u64,
        }
    }
}

/// Where the frames of an [`ExtractedFrames`] came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameSource {
    /// Real stills grabbed from the video.
    Extracted,
    /// Uniform gray stand-ins; nothing could be grabbed.
    Placeholder { note: String },
}

/// Frames sampled from one video.
#[derive(Debug, Clone)]
pub struct ExtractedFrames {
    /// JPEG-encoded frames in timestamp order.
    pub frames: Vec<Vec<u8>>,
    pub info: VideoInfo,
    pub source: FrameSource,
}

impl ExtractedFrames {
    /// True when placeholders stand in for real frames.
    pub fn is_placeholder(&self) -> bool {
        matches!(self.source, FrameSource::Placeholder { .. })
    }
}

/// Samples evenly spaced stills from a video.
#[derive(Debug, Clone)]
pub struct FrameExtractor {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    frame_count: usize,
    max_bytes: usize,
    max_dimension: u32,
    jpeg_quality: u8,
    frame_timeout: Duration,
    probe_timeout: Duration,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::from_config(&VideoConfig::default())
    }
}

impl FrameExtractor {
    /// Creates an extractor from the video section of the pipeline config.
    pub fn from_config(config: &VideoConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            frame_count: config.frame_count.max(1),
            max_bytes: config.max_extract_bytes,
            max_dimension: config.max_frame_dimension.max(1),
            jpeg_quality: config.jpeg_quality.clamp(1, 100),
            frame_timeout: Duration::from_secs(config.frame_timeout_secs),
            probe_timeout: Duration::from_secs(config.probe_timeout_secs),
        }
    }

    /// Sets the number of frames to sample.
    pub fn with_frame_count(mut self, count: usize) -> Self {
        self.frame_count = count.max(1);
        self
    }

    /// Sets the ffmpeg binary.
    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    /// Sets the ffprobe binary.
    pub fn with_ffprobe_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffprobe_path = path.into();
        self
    }

    /// Sets the size ceiling for input videos.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Number of frames sampled per video.
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Extracts frames from encoded video bytes.
    ///
    /// Probe failures fall back to 10 s at 25 fps and failed grabs are
    /// skipped. When no frame could be grabbed, up to three gray placeholders
    /// are returned and tagged as such. Only oversized or empty input and
    /// temp-file failures are errors.
    pub async fn extract(&self, video: &[u8]) -> Result<ExtractedFrames> {
        if video.is_empty() {
            return Err(StockMetaError::InvalidInput("video payload is empty".into()));
        }
        if video.len() > self.max_bytes {
            return Err(StockMetaError::PayloadTooLarge {
                kind: "Video file",
                size: video.len(),
                limit: self.max_bytes,
            });
        }

        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("input.mp4");
        tokio::fs::write(&input, video).await?;

        let info = match self.probe(&input).await {
            Ok(info) => info,
            Err(e) => {
                tracing::debug!("ffprobe unavailable, assuming defaults: {e}");
                VideoInfo::fallback()
            }
        };

        let mut frames = Vec::with_capacity(self.frame_count);
        for (index, at) in timestamps(info.duration_secs, self.frame_count)
            .into_iter()
            .enumerate()
        {
            let output = workdir.path().join(format!("frame_{index:03}.jpg"));
            match self.grab_frame(&input, at, &output).await {
                Ok(raw) => match self.encode(raw).await {
                    Ok(jpeg) => frames.push(jpeg),
                    Err(e) => tracing::debug!(index, "dropping undecodable frame: {e}"),
                },
                Err(e) => tracing::debug!(index, at, "frame grab failed: {e}"),
            }
        }

        if frames.is_empty() {
            let count = self.frame_count.min(MAX_PLACEHOLDERS);
            tracing::warn!(count, "no frames extracted, using placeholders");
            let placeholder = placeholder_frame(self.jpeg_quality)?;
            return Ok(ExtractedFrames {
                frames: vec![placeholder; count],
                info: VideoInfo {
                    total_frames: count as u64,
                    ..info
                },
                source: FrameSource::Placeholder {
                    note: PLACEHOLDER_NOTE.to_string(),
                },
            });
        }

        tracing::info!(
            frames = frames.len(),
            duration_secs = info.duration_secs,
            "extracted video frames"
        );
        Ok(ExtractedFrames {
            frames,
            info,
            source: FrameSource::Extracted,
        })
    }

    async fn probe(&self, input: &Path) -> Result<VideoInfo> {
        let mut command = tokio::process::Command::new(&self.ffprobe_path);
        command
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(input)
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.probe_timeout, command.output())
            .await
            .map_err(|_| StockMetaError::FrameExtraction("ffprobe timed out".into()))??;

        if !output.status.success() {
            return Err(StockMetaError::FrameExtraction(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }

    async fn grab_frame(&self, input: &Path, at: f64, output: &Path) -> Result<Vec<u8>> {
        let mut command = tokio::process::Command::new(&self.ffmpeg_path);
        command
            .args(["-v", "error", "-ss", &format!("{at:.3}"), "-i"])
            .arg(input)
            .args(["-frames:v", "1", "-q:v", "2", "-y"])
            .arg(output)
            .kill_on_drop(true);

        let result = tokio::time::timeout(self.frame_timeout, command.output())
            .await
            .map_err(|_| StockMetaError::FrameExtraction(format!("ffmpeg timed out at {at:.3}s")))??;

        if !result.status.success() {
            return Err(StockMetaError::FrameExtraction(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }

        Ok(tokio::fs::read(output).await?)
    }

    async fn encode(&self, raw: Vec<u8>) -> Result<Vec<u8>> {
        let max_dimension = self.max_dimension;
        let quality = self.jpeg_quality;
        tokio::task::spawn_blocking(move || encode_frame(&raw, max_dimension, quality))
            .await
            .map_err(|e| StockMetaError::FrameExtraction(e.to_string()))?
    }
}

/// Evenly spaced timestamps covering `[0, duration]`.
pub fn timestamps(duration_secs: f64, count: usize) -> Vec<f64> {
    let duration = if duration_secs > 0.0 {
        duration_secs
    } else {
        FALLBACK_DURATION_SECS
    };
    let steps = count.saturating_sub(1).max(1) as f64;
    (0..count).map(|i| i as f64 * duration / steps).collect()
}

/// Parses `ffprobe -print_format json` output for the first video stream.
fn parse_probe_output(json: &str) -> Result<VideoInfo> {
    let value: serde_json::Value = serde_json::from_str(json)?;

    let stream = value
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"))
        })
        .ok_or_else(|| StockMetaError::FrameExtraction("No video stream found".into()))?;

    let number = |v: Option<&serde_json::Value>| -> Option<f64> {
        v.and_then(|d| d.as_str()).and_then(|s| s.parse::<f64>().ok())
    };

    let duration_secs = number(stream.get("duration"))
        .or_else(|| number(value.get("format").and_then(|f| f.get("duration"))))
        .filter(|d| *d > 0.0)
        .unwrap_or(FALLBACK_DURATION_SECS);

    // r_frame_rate is a fraction such as "30000/1001".
    let fps = stream
        .get("r_frame_rate")
        .and_then(|f| f.as_str())
        .and_then(|s| match s.split_once('/') {
            Some((num, den)) => {
                let num: f64 = num.parse().ok()?;
                let den: f64 = den.parse().ok()?;
                (den > 0.0).then(|| num / den)
            }
            None => s.parse().ok(),
        })
        .filter(|fps| *fps > 0.0)
        .unwrap_or(FALLBACK_FPS);

    let total_frames = stream
        .get("nb_frames")
        .and_then(|n| n.as_str())
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or((duration_secs * fps) as u64);

    Ok(VideoInfo {
        duration_secs,
        fps,
        total_frames,
    })
}

/// Decodes a still, converts it to RGB, bounds its longest side and
/// re-encodes it as JPEG.
fn encode_frame(raw: &[u8], max_dimension: u32, quality: u8) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(raw)
        .map_err(|e| StockMetaError::FrameExtraction(format!("decode failed: {e}")))?;

    let (width, height) = decoded.dimensions();
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());
    let bounded = if width > max_dimension || height > max_dimension {
        rgb.resize(max_dimension, max_dimension, FilterType::Lanczos3)
    } else {
        rgb
    };

    encode_jpeg(&bounded, quality)
}

fn placeholder_frame(quality: u8) -> Result<Vec<u8>> {
    let gray = ImageBuffer::from_pixel(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT, Rgb([128u8, 128, 128]));
    encode_jpeg(&DynamicImage::ImageRgb8(gray), quality)
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, quality)
        .encode_image(image)
        .map_err(|e| StockMetaError::FrameExtraction(format!("encode failed: {e}")))?;
    Ok(encoded)
}
