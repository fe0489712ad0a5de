//! OpenAI-compatible chat completions provider.
//!
//! OpenAI, Groq, xAI Grok, Llama API and DeepSeek all accept the same
//! `chat/completions` request shape and differ only in base URL, accepted
//! options and error envelope details.

use crate::error::{sanitize_error_message, Result, StockMetaError};
use crate::prompt::user_prompt;
use crate::provider::MetadataProvider;
use crate::types::{AssetContent, MetadataRequest, ProviderKind};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// Default API base URL for an OpenAI-compatible provider.
pub fn default_base_url(kind: ProviderKind) -> Option<&'static str> {
    match kind {
        ProviderKind::OpenAi => Some("https://api.openai.com/v1"),
        ProviderKind::Groq => Some("https://api.groq.com/openai/v1"),
        ProviderKind::Grok => Some("https://api.x.ai/v1"),
        ProviderKind::Llama => Some("https://api.llama-api.com"),
        ProviderKind::DeepSeek => Some("https://api.deepseek.com/v1"),
        ProviderKind::Gemini | ProviderKind::Cohere => None,
    }
}

/// Builder for OpenAiProvider.
#[derive(Debug, Clone)]
pub struct OpenAiProviderBuilder {
    kind: ProviderKind,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout: Duration,
}

impl OpenAiProviderBuilder {
    /// Creates a new builder for the given provider kind.
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            api_key: None,
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Sets the API key. Falls back to the provider's key env var.
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
    pub fn build(self) -> Result<OpenAiProvider> {
        let default_url = default_base_url(self.kind).ok_or_else(|| {
            StockMetaError::Config(format!("{} is not an OpenAI-compatible provider", self.kind))
        })?;

        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                self.kind
                    .api_key_env_vars()
                    .iter()
                    .find_map(|name| std::env::var(name).ok().filter(|v| !v.trim().is_empty()))
            })
            .ok_or(StockMetaError::NotConfigured(self.kind))?;

        let base_url = self
            .base_url
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(OpenAiProvider {
            client: reqwest::Client::new(),
            kind: self.kind,
            api_key,
            base_url,
            timeout: self.timeout,
        })
    }
}

/// Chat completions provider for OpenAI and compatible APIs.
pub struct OpenAiProvider {
    client: reqwest::Client,
    kind: ProviderKind,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Creates a new `OpenAiProviderBuilder`.
    pub fn builder(kind: ProviderKind) -> OpenAiProviderBuilder {
        OpenAiProviderBuilder::new(kind)
    }

    fn parse_error(&self, status: u16, text: &str) -> StockMetaError {
        let envelope = serde_json::from_str::<ErrorEnvelope>(text)
            .ok()
            .and_then(|e| e.error);

        if let Some(detail) = &envelope {
            match detail.code.as_deref() {
                Some("invalid_api_key") => return StockMetaError::InvalidApiKey(self.kind),
                Some("insufficient_quota") | Some("rate_limit_exceeded") => {
                    return StockMetaError::QuotaExceeded(self.kind)
                }
                _ => {}
            }
        }

        match status {
            401 => return StockMetaError::InvalidApiKey(self.kind),
            403 => return StockMetaError::PermissionDenied(self.kind),
            429 => return StockMetaError::QuotaExceeded(self.kind),
            _ => {}
        }

        let message = match envelope.and_then(|e| e.message) {
            Some(msg) => sanitize_error_message(&msg),
            None => sanitize_error_message(text),
        };
        StockMetaError::Api {
            provider: self.kind,
            status,
            message,
        }
    }

    fn build_request(&self, request: &MetadataRequest) -> Result<ChatRequest> {
        let prompt = user_prompt(request);
        let user_content = match &request.content {
            AssetContent::Text(_) => UserContent::Text(prompt),
            AssetContent::Image(data) => {
                if !self.kind.supports_images() {
                    return Err(StockMetaError::Unsupported {
                        provider: self.kind,
                        capability: "image",
                    });
                }
                UserContent::Parts(vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::image(data),
                ])
            }
            AssetContent::Frames(_) | AssetContent::Video(_) => {
                return Err(StockMetaError::Unsupported {
                    provider: self.kind,
                    capability: "native video",
                });
            }
        };

        // Llama API and DeepSeek reject the json_object response format.
        let response_format = matches!(
            self.kind,
            ProviderKind::OpenAi | ProviderKind::Groq | ProviderKind::Grok
        )
        .then(|| ResponseFormat {
            kind: "json_object".into(),
        });

        Ok(ChatRequest {
            model: request.effective_model().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: UserContent::Text(request.system_prompt.clone()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user_content,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
            response_format,
        })
    }
}

#[async_trait]
impl MetadataProvider for OpenAiProvider {
    async fn generate(&self, request: &MetadataRequest) -> Result<String> {
        let body = self.build_request(request)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(self.kind, self.timeout, e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| StockMetaError::from_transport(self.kind, self.timeout, e))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                StockMetaError::UnexpectedResponse(format!("No choices in {} response", self.kind))
            })
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn health_check(&self) -> Result<()> {
        // Llama API has no models listing; a one-token completion stands in.
        let request = if self.kind == ProviderKind::Llama {
            self.client
                .post(format!("{}/chat/completions", self.base_url))
                .json(&serde_json::json!({
                    "model": self.kind.default_model(),
                    "messages": [{"role": "user", "content": "ping"}],
                    "max_tokens": 1,
                }))
        } else {
            self.client.get(format!("{}/models", self.base_url))
        };

        let response = request
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StockMetaError::from_transport(self.kind, self.timeout, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let text = response.text().await.unwrap_or_default();
        Err(self.parse_error(status.as_u16(), &text))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: UserContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    fn image(data: &[u8]) -> Self {
        let mime = AssetContent::image_mime_type(data);
        let b64 = base64::engine::general_purpose::STANDARD.encode(data);
        Self::ImageUrl {
            image_url: ImageUrl {
                url: format!("data:{mime};base64,{b64}"),
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(kind: ProviderKind, base_url: &str) -> OpenAiProvider {
        OpenAiProvider::builder(kind)
            .api_key("test-key-123456789012345")
            .base_url(base_url)
            .build()
            .unwrap()
    }

    fn image_request(kind: ProviderKind) -> MetadataRequest {
        MetadataRequest::new("beach.jpg", AssetContent::Image(vec![0xFF, 0xD8, 0xFF]), kind)
    }

    #[test]
    fn test_builder_rejects_non_chat_kind() {
        let err = OpenAiProvider::builder(ProviderKind::Gemini)
            .api_key("k")
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, StockMetaError::Config(_)));
    }

    #[test]
    fn test_builder_trims_base_url() {
        let p = provider(ProviderKind::Groq, "http://localhost:1234/");
        assert_eq!(p.base_url, "http://localhost:1234");
    }

    #[test]
    fn test_request_construction_image() {
        let p = provider(ProviderKind::OpenAi, "http://unused");
        let body = serde_json::to_value(p.build_request(&image_request(ProviderKind::OpenAi)).unwrap())
            .unwrap();

        assert_eq!(body["model"], ProviderKind::OpenAi.default_model());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"][0]["type"], "text");
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert!(body["messages"][1]["content"][1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/jpeg;base64,"));
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["max_tokens"], 2000);
    }

    #[test]
    fn test_request_construction_text_deepseek() {
        let p = provider(ProviderKind::DeepSeek, "http://unused");
        let req = MetadataRequest::new(
            "idea.txt",
            AssetContent::Text("a lighthouse".into()),
            ProviderKind::DeepSeek,
        );
        let body = serde_json::to_value(p.build_request(&req).unwrap()).unwrap();
        assert!(body["messages"][1]["content"].is_string());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_deepseek_rejects_images() {
        let p = provider(ProviderKind::DeepSeek, "http://unused");
        let err = p.build_request(&image_request(ProviderKind::DeepSeek)).unwrap_err();
        assert!(err.is_preflight());
        assert_eq!(err.to_string(), "DeepSeek does not support image analysis");
    }

    #[test]
    fn test_parse_error_envelopes() {
        let p = provider(ProviderKind::OpenAi, "http://unused");
        let err = p.parse_error(
            401,
            r#"{"error":{"message":"Incorrect API key provided.","code":"invalid_api_key"}}"#,
        );
        assert!(matches!(err, StockMetaError::InvalidApiKey(ProviderKind::OpenAi)));

        let err = p.parse_error(400, r#"{"error":{"code":"insufficient_quota"}}"#);
        assert!(matches!(err, StockMetaError::QuotaExceeded(_)));

        let err = p.parse_error(
            400,
            r#"{"error":{"message":"Invalid image. Please retry.","code":null}}"#,
        );
        assert_eq!(err.to_string(), "OpenAI API error: 400 - Invalid image. Please retry.");

        let err = p.parse_error(
            404,
            r#"{"error":{"message":"The model gpt-4.1 does not exist.","code":"model_not_found"}}"#,
        );
        assert_eq!(
            err.to_string(),
            "OpenAI API error: 404 - The model gpt-4.1 does not exist."
        );

        let err = p.parse_error(502, "<html>Bad gateway</html>");
        assert_eq!(err.to_string(), "OpenAI API error: 502 - <html>Bad gateway</html>");
    }

    #[tokio::test]
    async fn test_generate_against_mock() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("test-key-123456789012345"))
            .and(body_partial_json(serde_json::json!({"model": ProviderKind::Groq.default_model()})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "{\"title\":\"Beach\"}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(ProviderKind::Groq, &server.uri());
        let text = p.generate(&image_request(ProviderKind::Groq)).await.unwrap();
        assert_eq!(text, "{\"title\":\"Beach\"}");
    }

    #[tokio::test]
    async fn test_generate_maps_http_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::Grok, &server.uri());
        let err = p.generate(&image_request(ProviderKind::Grok)).await.unwrap_err();
        assert!(matches!(err, StockMetaError::QuotaExceeded(ProviderKind::Grok)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::Llama, &server.uri());
        let err = p.generate(&image_request(ProviderKind::Llama)).await.unwrap_err();
        assert_eq!(err.to_string(), "No choices in Llama response");
    }

    #[tokio::test]
    async fn test_health_check_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::OpenAi, &server.uri());
        assert!(p.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let p = provider(ProviderKind::OpenAi, "http://127.0.0.1:1");
        let err = p.generate(&image_request(ProviderKind::OpenAi)).await.unwrap_err();
        assert!(matches!(err, StockMetaError::Connection(ProviderKind::OpenAi)));
    }
}
