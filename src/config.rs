//! Pipeline configuration model and defaults.
//!
//! Values come from an optional `stockmeta.toml`, then `STOCKMETA_*`
//! environment variables override individual fields.

use crate::error::{Result, StockMetaError};
use crate::retry::RetryPolicy;
use crate::types::ProviderKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MB: usize = 1024 * 1024;

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Worker pool and pacing.
    pub batch: BatchConfig,
    /// Per-task retry behavior.
    pub retry: RetryConfig,
    /// Outbound request timeouts.
    pub timeouts: TimeoutConfig,
    /// Video handling and frame extraction.
    pub video: VideoConfig,
    /// Input size limits.
    pub limits: LimitsConfig,
    /// Base URL overrides keyed by provider id.
    pub endpoints: BTreeMap<String, String>,
}

/// Worker pool width and pacing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Concurrent tasks; clamped to 1–5.
    pub workers: usize,
    /// Pause after every this many completions. Zero disables pacing.
    pub pacing_interval: usize,
    /// Length of the pacing pause.
    pub pacing_pause_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            pacing_interval: 5,
            pacing_pause_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Image and text requests.
    pub request_secs: u64,
    /// Cohere requests, which run slower.
    pub cohere_secs: u64,
    /// Native video requests.
    pub video_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            cohere_secs: 60,
            video_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Frames sampled per video.
    pub frame_count: usize,
    /// Largest video the extractor accepts.
    pub max_extract_bytes: usize,
    /// Longest side of an extracted frame.
    pub max_frame_dimension: u32,
    /// JPEG quality of extracted frames.
    pub jpeg_quality: u8,
    pub frame_timeout_secs: u64,
    pub probe_timeout_secs: u64,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            frame_count: 5,
            max_extract_bytes: 50 * MB,
            max_frame_dimension: 1024,
            jpeg_quality: 85,
            frame_timeout_secs: 10,
            probe_timeout_secs: 30,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_image_bytes: usize,
    pub max_video_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 20 * MB,
            max_video_bytes: 100 * MB,
        }
    }
}

impl PipelineConfig {
    /// Parses configuration from TOML text. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| StockMetaError::Config(e.to_string()))
    }

    /// Reads configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StockMetaError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Loads the optional file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `STOCKMETA_*` overrides from an arbitrary variable lookup.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(name: &str, value: String) -> Result<T> {
            value
                .trim()
                .parse()
                .map_err(|_| StockMetaError::Config(format!("{name} has invalid value {value:?}")))
        }

        macro_rules! override_field {
            ($name:literal, $field:expr) => {
                if let Some(value) = lookup($name) {
                    $field = parsed($name, value)?;
                }
            };
        }

        override_field!("STOCKMETA_WORKERS", self.batch.workers);
        override_field!("STOCKMETA_PACING_INTERVAL", self.batch.pacing_interval);
        override_field!("STOCKMETA_PACING_PAUSE_MS", self.batch.pacing_pause_ms);
        override_field!("STOCKMETA_RETRY_ATTEMPTS", self.retry.max_attempts);
        override_field!("STOCKMETA_RETRY_DELAY_MS", self.retry.delay_ms);
        override_field!("STOCKMETA_REQUEST_TIMEOUT_SECS", self.timeouts.request_secs);
        override_field!("STOCKMETA_FRAME_COUNT", self.video.frame_count);
        override_field!("STOCKMETA_FFMPEG", self.video.ffmpeg_path);
        override_field!("STOCKMETA_FFPROBE", self.video.ffprobe_path);

        Ok(self)
    }

    /// Retry policy derived from the retry section.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
    }

    /// Timeout for a non-video request to `provider`.
    pub fn request_timeout(&self, provider: ProviderKind) -> Duration {
        match provider {
            ProviderKind::Cohere => Duration::from_secs(self.timeouts.cohere_secs),
            _ => Duration::from_secs(self.timeouts.request_secs),
        }
    }

    /// Timeout for a native video request.
    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.video_secs)
    }

    /// Base URL override for `provider`, if any.
    pub fn endpoint(&self, provider: ProviderKind) -> Option<&str> {
        self.endpoints.get(provider.as_str()).map(String::as_str)
    }

    /// Sets a base URL override.
    pub fn with_endpoint(mut self, provider: ProviderKind, base_url: impl Into<String>) -> Self {
        self.endpoints
            .insert(provider.as_str().to_string(), base_url.into());
        self
    }
}
