//! Error types for metadata generation.

use crate::types::ProviderKind;
use std::time::Duration;

/// Maximum length of a provider error body embedded in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Errors that can occur while generating metadata.
#[derive(Debug, thiserror::Error)]
pub enum StockMetaError {
    /// No credential configured for the provider.
    #[error("{0} API key not configured. Please add your API key in settings.")]
    NotConfigured(ProviderKind),

    /// Credential present but fails the shape check.
    #[error("Invalid API key format for {0}")]
    InvalidCredential(ProviderKind),

    /// Provider rejected the API key.
    #[error("Invalid {0} API key. Please check your API key in settings.")]
    InvalidApiKey(ProviderKind),

    /// Provider reports exhausted quota or rate limit.
    #[error("{0} API quota exceeded. Please check your account usage.")]
    QuotaExceeded(ProviderKind),

    /// Provider denied access to the model or endpoint.
    #[error("{0} API access denied. Please check your API key permissions.")]
    PermissionDenied(ProviderKind),

    /// Any other non-2xx response.
    #[error("{provider} API error: {status} - {message}")]
    Api {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    /// Request exceeded its timeout.
    #[error("{provider} API request timed out after {}s. Please try again.", .after.as_secs())]
    Timeout {
        provider: ProviderKind,
        after: Duration,
    },

    /// Could not reach the provider.
    #[error("Unable to connect to {0} API. Please check your internet connection.")]
    Connection(ProviderKind),

    /// Provider cannot process this kind of content.
    #[error("{provider} does not support {capability} analysis")]
    Unsupported {
        provider: ProviderKind,
        capability: &'static str,
    },

    /// Malformed or empty input payload.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Payload exceeds the configured ceiling.
    #[error("{kind} too large: {:.1}MB (max: {}MB)", megabytes(.size), whole_megabytes(.limit))]
    PayloadTooLarge {
        kind: &'static str,
        size: usize,
        limit: usize,
    },

    /// Provider answered 2xx but the body did not have the expected shape.
    #[error("{0}")]
    UnexpectedResponse(String),

    /// Frame extraction failed before any analysis could run.
    #[error("Frame extraction failed: {0}")]
    FrameExtraction(String),

    /// Invalid configuration value or file.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or HTTP error not classified above.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error (temp files, subprocesses).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StockMetaError {
    /// Returns true for failures detected before any generation call.
    ///
    /// These are never retried.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::NotConfigured(_)
                | Self::InvalidCredential(_)
                | Self::InvalidInput(_)
                | Self::PayloadTooLarge { .. }
                | Self::Unsupported { .. }
                | Self::FrameExtraction(_)
                | Self::Config(_)
        )
    }

    /// Returns true if the generation attempt should be retried.
    ///
    /// Provider semantic errors (invalid key, quota) are retried the same
    /// way as transient transport errors.
    pub fn is_retryable(&self) -> bool {
        !self.is_preflight()
    }

    /// Returns true for errors without a provider-specific description.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Json(_) | Self::Io(_))
    }

    /// Maps a reqwest transport error to a provider-tagged error.
    pub fn from_transport(provider: ProviderKind, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider,
                after: timeout,
            }
        } else if err.is_connect() {
            Self::Connection(provider)
        } else {
            Self::Network(err)
        }
    }
}

fn megabytes(bytes: &usize) -> f64 {
    *bytes as f64 / 1_048_576.0
}

fn whole_megabytes(bytes: &usize) -> usize {
    *bytes / 1_048_576
}

/// Collapses whitespace and caps the length of a provider error body.
pub fn sanitize_error_message(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    format!("{truncated}...")
}

/// Result type alias for metadata operations.
pub type Result<T> = std::result::Result<T, StockMetaError>;
