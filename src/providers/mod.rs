//! Metadata providers.

mod cohere;
mod gemini;
mod openai;

pub use cohere::{CohereProvider, CohereProviderBuilder};
pub use gemini::{GeminiProvider, GeminiProviderBuilder};
pub use openai::{default_base_url, OpenAiProvider, OpenAiProviderBuilder};

use crate::config::PipelineConfig;
use crate::credentials::ProviderCredential;
use crate::error::Result;
use crate::provider::MetadataProvider;
use crate::types::ProviderKind;
use std::sync::Arc;

/// Builds the adapter for a credential, honoring configured timeouts and
/// base URL overrides.
///
/// The credential's shape is checked first so a malformed key never reaches
/// the network.
pub fn build_provider(
    credential: &ProviderCredential,
    config: &PipelineConfig,
) -> Result<Arc<dyn MetadataProvider>> {
    credential.validate()?;

    let kind = credential.provider();
    let timeout = config.request_timeout(kind);
    let endpoint = config.endpoint(kind);

    let provider: Arc<dyn MetadataProvider> = match kind {
        ProviderKind::Gemini => {
            let mut builder = GeminiProvider::builder()
                .api_key(credential.api_key())
                .timeout(timeout)
                .video_timeout(config.video_timeout());
            if let Some(url) = endpoint {
                builder = builder.base_url(url);
            }
            Arc::new(builder.build()?)
        }
        ProviderKind::Cohere => {
            let mut builder = CohereProvider::builder()
                .api_key(credential.api_key())
                .timeout(timeout);
            if let Some(url) = endpoint {
                builder = builder.base_url(url);
            }
            Arc::new(builder.build()?)
        }
        ProviderKind::OpenAi
        | ProviderKind::Groq
        | ProviderKind::Grok
        | ProviderKind::Llama
        | ProviderKind::DeepSeek => {
            let mut builder = OpenAiProvider::builder(kind)
                .api_key(credential.api_key())
                .timeout(timeout);
            if let Some(url) = endpoint {
                builder = builder.base_url(url);
            }
            Arc::new(builder.build()?)
        }
    };

    Ok(provider)
}
