//! Analysis of one asset with one provider.

use crate::config::PipelineConfig;
use crate::error::{Result, StockMetaError};
use crate::prompt::sanitize_input;
use crate::provider::{MetadataProvider, MetadataProviderExt};
use crate::retry::RetryPolicy;
use crate::types::{AssetContent, MetadataRequest, MetadataResult};
use crate::video::{self, FrameExtractor};
use std::time::Instant;

/// Validates a request and routes it to the right analysis path.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    extractor: FrameExtractor,
    retry: RetryPolicy,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl Pipeline {
    /// Creates a pipeline from configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            extractor: FrameExtractor::from_config(&config.video),
            retry: config.retry_policy(),
            config,
        }
    }

    /// Replaces the frame extractor.
    pub fn with_extractor(mut self, extractor: FrameExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replaces the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Checks payload sizes and provider capabilities.
    pub fn validate(&self, request: &MetadataRequest) -> Result<()> {
        let limits = &self.config.limits;
        let kind = request.provider;

        match &request.content {
            AssetContent::Image(data) => {
                if data.is_empty() {
                    return Err(StockMetaError::InvalidInput("Empty image data".into()));
                }
                if data.len() > limits.max_image_bytes {
                    return Err(StockMetaError::PayloadTooLarge {
                        kind: "Image",
                        size: data.len(),
                        limit: limits.max_image_bytes,
                    });
                }
                if !kind.supports_images() {
                    return Err(StockMetaError::Unsupported {
                        provider: kind,
                        capability: "image",
                    });
                }
            }
            AssetContent::Video(data) => {
                if data.is_empty() {
                    return Err(StockMetaError::InvalidInput("Empty video data".into()));
                }
                if data.len() > limits.max_video_bytes {
                    return Err(StockMetaError::PayloadTooLarge {
                        kind: "Video file",
                        size: data.len(),
                        limit: limits.max_video_bytes,
                    });
                }
                if !kind.supports_native_video() && !kind.supports_images() {
                    return Err(StockMetaError::Unsupported {
                        provider: kind,
                        capability: "video",
                    });
                }
            }
            AssetContent::Frames(frames) => {
                if frames.is_empty() {
                    return Err(StockMetaError::InvalidInput("No frames to analyze".into()));
                }
                if let Some(frame) = frames.iter().find(|f| f.len() > limits.max_image_bytes) {
                    return Err(StockMetaError::PayloadTooLarge {
                        kind: "Frame",
                        size: frame.len(),
                        limit: limits.max_image_bytes,
                    });
                }
                if !kind.supports_images() {
                    return Err(StockMetaError::Unsupported {
                        provider: kind,
                        capability: "video",
                    });
                }
            }
            AssetContent::Text(text) => {
                if text.trim().is_empty() {
                    return Err(StockMetaError::InvalidInput("Empty text content".into()));
                }
            }
        }

        Ok(())
    }

    /// Analyzes one request with `provider`. Never fails; errors become data.
    ///
    /// Images and text are retried per the retry policy. Videos go to the
    /// provider whole when it accepts video, otherwise through frame
    /// sampling.
    pub async fn analyze(
        &self,
        provider: &dyn MetadataProvider,
        mut request: MetadataRequest,
    ) -> MetadataResult {
        let start = Instant::now();
        let kind = provider.kind();
        request.provider = kind;

        if let Err(e) = self.validate(&request) {
            tracing::warn!(provider = %kind, filename = %request.filename, error = %e, "request rejected");
            return e.into();
        }

        request.additional_context = request
            .additional_context
            .as_deref()
            .map(sanitize_input)
            .filter(|c| !c.trim().is_empty());

        let result = match &request.content {
            AssetContent::Video(_) if kind.supports_native_video() => {
                video::analyze_native(provider, &request, &self.retry).await
            }
            AssetContent::Video(data) => {
                video::analyze_sampled(provider, &request, data, &self.extractor).await
            }
            AssetContent::Frames(frames) => {
                video::analyze_frames(provider, &request, frames, &request.system_prompt).await
            }
            AssetContent::Image(_) | AssetContent::Text(_) => {
                provider.generate_with_retries(&request, &self.retry).await
            }
        };

        tracing::info!(
            provider = %kind,
            filename = %request.filename,
            content = request.content.kind(),
            success = result.success,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "analysis finished"
        );
        result
    }
}
