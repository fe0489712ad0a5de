//! StockMeta - stock-photo metadata generation across AI providers.
//!
//! This crate turns images, videos and text concepts into stock submission
//! metadata (title, keywords, category, releases) using one of several AI
//! providers, and runs batches of assets × providers on a bounded worker pool.
//!
//! # Quick Start - Single Asset
//!
//! ```no_run
//! use stockmeta::{
//!     AssetContent, MetadataProviderExt, MetadataRequest, OpenAiProvider, ProviderKind,
//!     RetryPolicy,
//! };
//!
//! #[tokio::main]
//! async fn main() -> stockmeta::Result<()> {
//!     let provider = OpenAiProvider::builder(ProviderKind::OpenAi).build()?;
//!     let image = std::fs::read("sunset.jpg")?;
//!     let request = MetadataRequest::new("sunset.jpg", AssetContent::Image(image), ProviderKind::OpenAi);
//!     let result = provider.generate_with_retries(&request, &RetryPolicy::default()).await;
//!     println!("{} {:?}", result.title, result.keywords);
//!     Ok(())
//! }
//! ```
//!
//! # Quick Start - Batch
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockmeta::{BatchRunner, BatchSubmission, EnvCredentialStore, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> stockmeta::Result<()> {
//!     let submission = BatchSubmission::from_json(&std::fs::read_to_string("batch.json")?)?;
//!     let runner = BatchRunner::new(Arc::new(EnvCredentialStore::from_env()), PipelineConfig::load(None)?);
//!     let outcome = runner.run(submission).await?;
//!     println!("{} of {} analyses succeeded", outcome.succeeded(), outcome.total_analyses);
//!     Ok(())
//! }
//! ```
//!
//! # Providers
//!
//! - `openai`, `groq`, `grok`, `llama`, `deepseek`: OpenAI-compatible chat
//!   completions (DeepSeek is text only)
//! - `gemini`: Google Gemini, the only provider that takes video natively
//! - `cohere`: Cohere chat with image attachments
//!
//! Videos for every other provider are sampled into frames with ffmpeg,
//! analyzed frame by frame and aggregated.

mod error;

pub mod batch;
pub mod config;
pub mod credentials;
pub mod normalize;
pub mod pipeline;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod retry;
pub mod types;
pub mod video;

// Re-export error types at crate root
pub use error::{sanitize_error_message, Result, StockMetaError};

pub use batch::{BatchAsset, BatchOutcome, BatchRunner, BatchSubmission, Pacing, WorkerPool};
pub use config::PipelineConfig;
pub use credentials::{
    mask_api_key, CredentialStore, EnvCredentialStore, ProviderCredential, StaticCredentialStore,
};
pub use normalize::normalize;
pub use pipeline::Pipeline;
pub use prompt::PromptContext;
pub use provider::{MetadataProvider, MetadataProviderExt, ValidationReport};
pub use providers::{
    build_provider, CohereProvider, CohereProviderBuilder, GeminiProvider, GeminiProviderBuilder,
    OpenAiProvider, OpenAiProviderBuilder,
};
pub use retry::RetryPolicy;
pub use types::{
    AnalysisMethod, AssetContent, Category, MediaType, MetadataRequest, MetadataResult,
    ProviderKind, Releases, TaskResult, VideoAnalysis,
};
pub use video::{FrameExtractor, PLACEHOLDER_NOTE};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::batch::{BatchRunner, BatchSubmission};
    pub use crate::error::{Result, StockMetaError};
    pub use crate::provider::{MetadataProvider, MetadataProviderExt};
    pub use crate::types::{AssetContent, MetadataRequest, MetadataResult, ProviderKind};
}
