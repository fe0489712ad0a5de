//! Metadata provider trait and utilities.

use crate::error::{Result, StockMetaError};
use crate::normalize::normalize;
use crate::retry::RetryPolicy;
use crate::types::{MetadataRequest, MetadataResult, ProviderKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Trait for AI providers that describe an asset.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Sends one generation call and returns the model's raw text.
    async fn generate(&self, request: &MetadataRequest) -> Result<String>;

    /// Returns the kind of this provider.
    fn kind(&self) -> ProviderKind;

    /// Returns the name of this provider for display.
    fn name(&self) -> &str {
        match self.kind() {
            ProviderKind::OpenAi => "OpenAI (GPT vision)",
            ProviderKind::Gemini => "Gemini (Google)",
            ProviderKind::Groq => "Groq (Llama 4 vision)",
            ProviderKind::Grok => "Grok (xAI)",
            ProviderKind::Llama => "Llama API (Meta)",
            ProviderKind::Cohere => "Cohere (Command)",
            ProviderKind::DeepSeek => "DeepSeek (text only)",
        }
    }

    /// Checks if the provider is reachable and accepts the key.
    async fn health_check(&self) -> Result<()>;
}

/// Outcome of a credential check against a live provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub service: ProviderKind,
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub message: String,
}

impl ValidationReport {
    /// Builds a report from a health check outcome.
    pub fn from_health(service: ProviderKind, outcome: Result<()>) -> Self {
        match outcome {
            Ok(()) => Self {
                service,
                valid: true,
                status_code: Some(200),
                message: "API key is valid".into(),
            },
            Err(e) => {
                let status_code = match &e {
                    StockMetaError::InvalidApiKey(_) => Some(401),
                    StockMetaError::PermissionDenied(_) => Some(403),
                    StockMetaError::QuotaExceeded(_) => Some(429),
                    StockMetaError::Api { status, .. } => Some(*status),
                    _ => None,
                };
                Self {
                    service,
                    valid: false,
                    status_code,
                    message: e.to_string(),
                }
            }
        }
    }
}

/// Extension trait adding normalization and retries.
#[async_trait]
pub trait MetadataProviderExt: MetadataProvider {
    /// Makes one attempt and normalizes the provider's text.
    async fn generate_metadata(&self, request: &MetadataRequest) -> Result<MetadataResult> {
        let start = Instant::now();
        let raw = self.generate(request).await?;
        let result = normalize(&raw);
        tracing::debug!(
            provider = %self.kind(),
            filename = %request.filename,
            elapsed_ms = start.elapsed().as_millis() as u64,
            success = result.success,
            repaired = result.repaired,
            "generation finished"
        );
        Ok(result)
    }

    /// Generates with retries per `policy`. Never fails; errors become data.
    async fn generate_with_retries(
        &self,
        request: &MetadataRequest,
        policy: &RetryPolicy,
    ) -> MetadataResult {
        let label = format!("{}/{}", request.filename, self.kind().as_str());
        policy
            .run(&label, |_| self.generate_metadata(request))
            .await
    }

    /// Runs the health check and reports the outcome as data.
    async fn validate(&self) -> ValidationReport {
        ValidationReport::from_health(self.kind(), self.health_check().await)
    }
}

impl<T: MetadataProvider + ?Sized> MetadataProviderExt for T {}
