//! Cohere chat provider.

use crate::error::{sanitize_error_message, Result, StockMetaError};
use crate::prompt::user_prompt;
use crate::provider::MetadataProvider;
use crate::types::{AssetContent, MetadataRequest, ProviderKind};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://api.cohere.ai/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Builder for CohereProvider.
#[derive(Debug, Clone)]
pub struct CohereProviderBuilder {
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Duration,
}

impl Default for CohereProviderBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl CohereProviderBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `COHERE_API_KEY` env var.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Overrides the API base URL.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider, resolving the API key.
    pub fn build(self) -> Result<CohereProvider> {
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("COHERE_API_KEY").ok().filter(|v| !v.trim().is_empty()))
            .ok_or(StockMetaError::NotConfigured(ProviderKind::Cohere))?;

        Ok(CohereProvider {
            client: reqwest::Client::new(),
            api_key,
            base_url: self
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: self.timeout,
        })
    }
}

/// Cohere chat provider with image attachments.
pub struct CohereProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl CohereProvider {
    /// Creates a new `CohereProviderBuilder`.
    pub fn builder() -> CohereProviderBuilder {
        CohereProviderBuilder::new()
    }

    fn parse_error(&self, status: u16, text: &str) -> StockMetaError {
        let message = serde_json::from_str::<CohereError>(text)
            .ok()
            .and_then(|e| e.message);

        if let Some(message) = &message {
            let lower = message.to_lowercase();
            if lower.contains("invalid api key") || lower.contains("invalid api token") {
                return StockMetaError::InvalidApiKey(ProviderKind::Cohere);
            }
            if lower.contains("quota") || lower.contains("rate limit") || lower.contains("trial key") {
                return StockMetaError::QuotaExceeded(ProviderKind::Cohere);
            }
        }

        match status {
            401 => return StockMetaError::InvalidApiKey(ProviderKind::Cohere),
            403 => return StockMetaError::PermissionDenied(ProviderKind::Cohere),
            429 => return StockMetaError::QuotaExceeded(ProviderKind::Cohere),
            _ => {}
        }

        StockMetaError::Api {
            provider: ProviderKind::Cohere,
            status,
            message: match message {
                Some(m) => sanitize_error_message(&m),
                None => sanitize_error_message(text),
            },
        }
    }
}

impl CohereRequest {
    fn from_metadata_request(request: &MetadataRequest) -> Result<Self> {
        let attachments = match &request.content {
            AssetContent::Text(_) => Vec::new(),
            AssetContent::Image(data) => vec![CohereAttachment {
                kind: "image".into(),
                data: format!(
                    "data:{};base64,{}",
                    AssetContent::image_mime_type(data),
                    base64::engine::general_purpose::STANDARD.encode(data)
                ),
            }],
            AssetContent::Video(_) | AssetContent::Frames(_) => {
                return Err(StockMetaError::Unsupported {
                    provider: ProviderKind::Cohere,
                    capability: "native video",
                })
            }
        };

        Ok(Self {
            model: request.effective_model().to_string(),
            message: format!("{}\n\n{}", request.system_prompt, user_prompt(request)),
            attachments,
            max_tokens: 2000,
            temperature: 0.7,
        })
    }
}

#[async_trait]
impl MetadataProvider for CohereProvider {
    async fn generate(&self, request: &MetadataRequest) -> Result<String> {
        let body = CohereRequest::from_metadata_request(request)?;

        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Cohere, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text));
        }

        let chat: CohereResponse = response
            .json()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Cohere, self.timeout, e))?;

        chat.text.ok_or_else(|| {
            StockMetaError::UnexpectedResponse("No text in Cohere response".into())
        })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Cohere
    }

    async fn health_check(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(ProviderKind::Cohere, self.timeout, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text))
    }
}

#[derive(Debug, Serialize)]
struct CohereRequest {
    model: String,
    message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<CohereAttachment>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct CohereAttachment {
    #[serde(rename = "type")]
    kind: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct CohereResponse {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CohereError {
    #[serde(default)]
    message: Option<String>,
}
