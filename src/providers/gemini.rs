//! Google Gemini provider.
//!
//! The only provider that accepts a whole video inline; images and text go
//! through the same `generateContent` call.

use crate::error::{sanitize_error_message, Result, StockMetaError};
use crate::prompt::user_prompt;
use crate::provider::MetadataProvider;
use crate::types::{AssetContent, MetadataRequest, ProviderKind};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_VIDEO_TIMEOUT: Duration = Duration::from_secs(120);
const TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 2000;

/// Builder for GeminiProvider.
#[derive(Debug, Clone)]
pub struct GeminiProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Duration,
    video_timeout: Duration,
}

impl Default for GeminiProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
            video_timeout: DEFAULT_VIDEO_TIMEOUT,
        }
    }
}

impl GeminiProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `GEMINI_API_KEY` / `GOOGLE_API_KEY`.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the timeout for image and text requests.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the timeout for native video requests.
    pub fn video_timeout(mut self, timeout: Duration) -> Self {
        self.video_timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<GeminiProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                ProviderKind::Gemini
                    .api_key_env_vars()
                    .iter()
                    .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            })
            .ok_or(StockMetaError::NotConfigured(ProviderKind::Gemini))?;

        Ok(GeminiProvider {
            client: reqwest::Client::new(),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: self.timeout,
            video_timeout: self.video_timeout,
        })
    }
}

/// Gemini `generateContent` provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
    video_timeout: Duration,
}

impl GeminiProvider {
    /// Creates a new `GeminiProviderBuilder`.
    pub fn builder() -> GeminiProviderBuilder {
        GeminiProviderBuilder::new()
    }

    fn parse_error(&self, status: u16, text: &str) -> StockMetaError {
        let detail = serde_json::from_str::<GeminiErrorEnvelope>(text)
            .ok()
            .and_then(|e| e.error);

        if let Some(detail) = &detail {
            let message = detail.message.as_deref().unwrap_or_default();
            match detail.status.as_deref() {
                Some("INVALID_ARGUMENT") if message.to_lowercase().contains("api key") => {
                    return StockMetaError::InvalidApiKey(ProviderKind::Gemini)
                }
                Some("UNAUTHENTICATED") => return StockMetaError::InvalidApiKey(ProviderKind::Gemini),
                Some("PERMISSION_DENIED") => {
                    return StockMetaError::PermissionDenied(ProviderKind::Gemini)
                }
                Some("RESOURCE_EXHAUSTED") => {
                    return StockMetaError::QuotaExceeded(ProviderKind::Gemini)
                }
                _ => {}
            }
        }

        match status {
            401 => return StockMetaError::InvalidApiKey(ProviderKind::Gemini),
            403 => return StockMetaError::PermissionDenied(ProviderKind::Gemini),
            429 => return StockMetaError::QuotaExceeded(ProviderKind::Gemini),
            _ => {}
        }

        StockMetaError::Api {
            provider: ProviderKind::Gemini,
            status,
            message: detail
                .and_then(|d| d.message)
                .map(|m| sanitize_error_message(&m))
                .unwrap_or_else(|| sanitize_error_message(text)),
        }
    }

    fn timeout_for(&self, request: &MetadataRequest) -> Duration {
        match request.content {
            AssetContent::Video(_) => self.video_timeout,
            _ => self.timeout,
        }
    }
}

impl GeminiRequest {
    fn from_metadata_request(request: &MetadataRequest) -> Result<Self> {
        let prompt = format!("{}\n\n{}", request.system_prompt, user_prompt(request));
        let mut parts = vec![GeminiPart::Text { text: prompt }];

        match &request.content {
            AssetContent::Text(_) => {}
            AssetContent::Image(data) => {
                parts.push(GeminiPart::inline(AssetContent::image_mime_type(data), data))
            }
            AssetContent::Video(data) => parts.push(GeminiPart::inline("video/mp4", data)),
            AssetContent::Frames(_) => {
                return Err(StockMetaError::InvalidInput(
                    "frames must be sent one request at a time".into(),
                ))
            }
        }

        Ok(Self {
            contents: vec![GeminiContent { parts }],
            generation_config: GeminiConfig {
                temperature: TEMPERATURE,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: Some("application/json".into()),
            },
        })
    }
}

#[async_trait]
impl MetadataProvider for GeminiProvider {
    async fn generate(&self, request: &MetadataRequest) -> Result<String> {
        let body = GeminiRequest::from_metadata_request(request)?;
        let timeout = self.timeout_for(request);
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            request.effective_model()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Gemini, timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text));
        }

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Gemini, timeout, e))?;

        let candidate = gemini_response
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| {
                StockMetaError::UnexpectedResponse("No candidates in Gemini response".into())
            })?;

        if candidate.finish_reason.as_deref() == Some("MAX_TOKENS") {
            tracing::warn!(filename = %request.filename, "Gemini response hit MAX_TOKENS");
            return Err(StockMetaError::UnexpectedResponse(
                "Response truncated due to token limit. Try with a shorter prompt or increase maxOutputTokens."
                    .into(),
            ));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(StockMetaError::UnexpectedResponse(
                "Invalid Gemini response structure".into(),
            ));
        }
        Ok(text)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url,
            ProviderKind::Gemini.default_model()
        );
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": "ping"}]}],
            "generationConfig": {"maxOutputTokens": 1},
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Gemini, self.timeout, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    generation_config: GeminiConfig,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: GeminiInlineData,
    },
}

impl GeminiPart {
    fn inline(mime_type: &str, data: &[u8]) -> Self {
        Self::Inline {
            inline_data: GeminiInlineData {
                mime_type: mime_type.to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(data),
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContentResponse>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiContentResponse {
    #[serde(default)]
    parts: Vec<GeminiPartResponse>,
}

#[derive(Debug, Deserialize)]
struct GeminiPartResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorEnvelope {
    #[serde(default)]
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}
