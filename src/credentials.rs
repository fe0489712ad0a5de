//! Provider credentials and where they come from.

use crate::error::{Result, StockMetaError};
use crate::types::ProviderKind;
use std::collections::HashMap;

/// An API key and model selection for one provider.
#[derive(Clone, PartialEq, Eq)]
pub struct ProviderCredential {
    provider: ProviderKind,
    api_key: String,
    model: String,
}

impl ProviderCredential {
    /// Creates a credential. An empty model selects the provider default.
    pub fn new(provider: ProviderKind, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        let model = model.into();
        let model = if model.trim().is_empty() {
            provider.default_model().to_string()
        } else {
            model.trim().to_string()
        };
        Self {
            provider,
            api_key: api_key.into().trim().to_string(),
            model,
        }
    }

    /// Provider this credential belongs to.
    pub fn provider(&self) -> ProviderKind {
        self.provider
    }

    /// The raw API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Selected model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// The key with its middle masked, for display.
    pub fn masked_key(&self) -> String {
        mask_api_key(&self.api_key)
    }

    /// Cheap shape check; does not contact the provider.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(StockMetaError::NotConfigured(self.provider));
        }
        let len = self.api_key.chars().count();
        if len < 5 || len <= min_key_length(self.provider) {
            return Err(StockMetaError::InvalidCredential(self.provider));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredential")
            .field("provider", &self.provider)
            .field("api_key", &self.masked_key())
            .field("model", &self.model)
            .finish()
    }
}

/// Keys must be strictly longer than this.
fn min_key_length(provider: ProviderKind) -> usize {
    match provider {
        ProviderKind::OpenAi | ProviderKind::Groq => 20,
        _ => 10,
    }
}

/// Masks an API key as `abcd****wxyz`. Short keys are fully masked.
pub fn mask_api_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// Source of provider credentials.
pub trait CredentialStore: Send + Sync {
    /// Returns the credential for `provider`, if one is configured.
    fn credential(&self, provider: ProviderKind) -> Option<ProviderCredential>;

    /// Providers with a non-empty key, in display order.
    fn configured(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.credential(*kind).is_some())
            .collect()
    }
}

/// Credentials read from environment variables.
///
/// Keys come from `OPENAI_API_KEY`, `GEMINI_API_KEY`/`GOOGLE_API_KEY`,
/// `GROQ_API_KEY`, `XAI_API_KEY`, `LLAMA_API_KEY`, `COHERE_API_KEY` and
/// `DEEPSEEK_API_KEY`; models from the matching `*_MODEL` variables.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentialStore {
    credentials: HashMap<ProviderKind, ProviderCredential>,
}

impl EnvCredentialStore {
    /// Snapshots the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the store from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut credentials = HashMap::new();
        for kind in ProviderKind::ALL {
            let key = kind
                .api_key_env_vars()
                .iter()
                .filter_map(|name| lookup(name))
                .find(|value| !value.trim().is_empty());
            let Some(key) = key else {
                continue;
            };
            let model = lookup(kind.model_env_var()).unwrap_or_default();
            credentials.insert(kind, ProviderCredential::new(kind, key, model));
        }
        tracing::debug!(configured = credentials.len(), "loaded credentials from environment");
        Self { credentials }
    }
}

impl CredentialStore for EnvCredentialStore {
    fn credential(&self, provider: ProviderKind) -> Option<ProviderCredential> {
        self.credentials.get(&provider).cloned()
    }
}

/// In-memory credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialStore {
    credentials: HashMap<ProviderKind, ProviderCredential>,
}

impl StaticCredentialStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key using the provider's default model.
    pub fn with_key(self, provider: ProviderKind, api_key: impl Into<String>) -> Self {
        self.with_credential(ProviderCredential::new(provider, api_key, ""))
    }

    /// Adds a full credential, replacing any previous one for the provider.
    pub fn with_credential(mut self, credential: ProviderCredential) -> Self {
        self.credentials.insert(credential.provider(), credential);
        self
    }
}

impl CredentialStore for StaticCredentialStore {
    fn credential(&self, provider: ProviderKind) -> Option<ProviderCredential> {
        self.credentials
            .get(&provider)
            .filter(|c| !c.api_key().is_empty())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-abcdefghijklmnop"), "sk-a****mnop");
        assert_eq!(mask_api_key("short"), "*****");
        assert_eq!(mask_api_key(""), "");
    }

    #[test]
    fn test_debug_masks_key() {
        let cred = ProviderCredential::new(ProviderKind::OpenAi, "sk-secret-value-1234567890", "");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("secret-value"));
        assert!(debug.contains("sk-s****7890"));
    }

    #[test]
    fn test_default_model() {
        let cred = ProviderCredential::new(ProviderKind::Gemini, "key", "  ");
        assert_eq!(cred.model(), ProviderKind::Gemini.default_model());
        let cred = ProviderCredential::new(ProviderKind::Gemini, "key", "gemini-2.5-flash");
        assert_eq!(cred.model(), "gemini-2.5-flash");
    }

    #[test]
    fn test_validate_shape() {
        let empty = ProviderCredential::new(ProviderKind::Groq, "   ", "");
        assert!(matches!(empty.validate(), Err(StockMetaError::NotConfigured(_))));

        let short = ProviderCredential::new(ProviderKind::OpenAi, "sk-1234567890", "");
        assert!(matches!(short.validate(), Err(StockMetaError::InvalidCredential(_))));

        let ok = ProviderCredential::new(ProviderKind::Cohere, "co-12345678901", "");
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_env_store_lookup() {
        let store = EnvCredentialStore::from_lookup(|name| match name {
            "GOOGLE_API_KEY" => Some("google-key-123456".into()),
            "GROQ_API_KEY" => Some("  ".into()),
            "COHERE_API_KEY" => Some("cohere-key-123456".into()),
            "COHERE_MODEL" => Some("command-r".into()),
            _ => None,
        });

        assert_eq!(
            store.credential(ProviderKind::Gemini).map(|c| c.api_key().to_string()),
            Some("google-key-123456".into())
        );
        assert!(store.credential(ProviderKind::Groq).is_none());
        assert_eq!(
            store.credential(ProviderKind::Cohere).map(|c| c.model().to_string()),
            Some("command-r".into())
        );
        assert_eq!(
            store.configured(),
            vec![ProviderKind::Gemini, ProviderKind::Cohere]
        );
    }

    #[test]
    fn test_static_store() {
        let store = StaticCredentialStore::new()
            .with_key(ProviderKind::OpenAi, "sk-test")
            .with_key(ProviderKind::Grok, "");
        assert!(store.credential(ProviderKind::OpenAi).is_some());
        assert!(store.credential(ProviderKind::Grok).is_none());
        assert!(store.credential(ProviderKind::Llama).is_none());
    }
}
