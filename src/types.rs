//! Core types for metadata generation.

use crate::error::{Result, StockMetaError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// AI provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (GPT vision models).
    OpenAi,
    /// Google Gemini (the only provider with native video input).
    Gemini,
    /// Groq OpenAI-compatible endpoint.
    Groq,
    /// xAI Grok.
    Grok,
    /// Llama API.
    Llama,
    /// Cohere chat with attachments.
    Cohere,
    /// DeepSeek chat (text only).
    DeepSeek,
}

impl ProviderKind {
    /// Every provider, in display order.
    pub const ALL: [ProviderKind; 7] = [
        Self::OpenAi,
        Self::Gemini,
        Self::Groq,
        Self::Grok,
        Self::Llama,
        Self::Cohere,
        Self::DeepSeek,
    ];

    /// Returns the provider identifier used on the wire and in results.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Groq => "groq",
            Self::Grok => "grok",
            Self::Llama => "llama",
            Self::Cohere => "cohere",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Returns the human-readable provider name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Gemini => "Gemini",
            Self::Groq => "Groq",
            Self::Grok => "Grok",
            Self::Llama => "Llama",
            Self::Cohere => "Cohere",
            Self::DeepSeek => "DeepSeek",
        }
    }

    /// Model used when the credential store does not select one.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-5",
            Self::Gemini => "gemini-2.5-pro",
            Self::Groq => "meta-llama/llama-4-maverick-17b-128e-instruct",
            Self::Grok => "grok-4",
            Self::Llama => "llama-4-maverick-17b-128e",
            Self::Cohere => "command-r-plus",
            Self::DeepSeek => "deepseek-vl-7b-chat",
        }
    }

    /// Environment variables checked for this provider's API key, in order.
    pub fn api_key_env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
            Self::Groq => &["GROQ_API_KEY"],
            Self::Grok => &["XAI_API_KEY", "GROK_API_KEY"],
            Self::Llama => &["LLAMA_API_KEY"],
            Self::Cohere => &["COHERE_API_KEY"],
            Self::DeepSeek => &["DEEPSEEK_API_KEY"],
        }
    }

    /// Environment variable overriding the selected model.
    pub fn model_env_var(&self) -> &'static str {
        match self {
            Self::OpenAi => "OPENAI_MODEL",
            Self::Gemini => "GEMINI_MODEL",
            Self::Groq => "GROQ_MODEL",
            Self::Grok => "GROK_MODEL",
            Self::Llama => "LLAMA_MODEL",
            Self::Cohere => "COHERE_MODEL",
            Self::DeepSeek => "DEEPSEEK_MODEL",
        }
    }

    /// Whether the provider accepts image input.
    pub fn supports_images(&self) -> bool {
        !matches!(self, Self::DeepSeek)
    }

    /// Whether the provider accepts a whole video inline.
    pub fn supports_native_video(&self) -> bool {
        matches!(self, Self::Gemini)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for ProviderKind {
    type Err = StockMetaError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == needle)
            .ok_or_else(|| StockMetaError::Config(format!("Unsupported service: {s}")))
    }
}

/// Stock category, one of 21 fixed labels with codes 1–21.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Animals,
    #[serde(rename = "Buildings and Architecture")]
    BuildingsAndArchitecture,
    Business,
    Drinks,
    #[serde(rename = "The Environment")]
    TheEnvironment,
    #[serde(rename = "States of Mind")]
    StatesOfMind,
    Food,
    #[serde(rename = "Graphic Resources")]
    GraphicResources,
    #[serde(rename = "Hobbies and Leisure")]
    HobbiesAndLeisure,
    Industry,
    #[default]
    Landscape,
    Lifestyle,
    People,
    #[serde(rename = "Plants and Flowers")]
    PlantsAndFlowers,
    #[serde(rename = "Culture and Religion")]
    CultureAndReligion,
    Science,
    #[serde(rename = "Social Issues")]
    SocialIssues,
    Sports,
    Technology,
    Transport,
    Travel,
}

impl Category {
    /// Every category, indexed by `code - 1`.
    pub const ALL: [Category; 21] = [
        Self::Animals,
        Self::BuildingsAndArchitecture,
        Self::Business,
        Self::Drinks,
        Self::TheEnvironment,
        Self::StatesOfMind,
        Self::Food,
        Self::GraphicResources,
        Self::HobbiesAndLeisure,
        Self::Industry,
        Self::Landscape,
        Self::Lifestyle,
        Self::People,
        Self::PlantsAndFlowers,
        Self::CultureAndReligion,
        Self::Science,
        Self::SocialIssues,
        Self::Sports,
        Self::Technology,
        Self::Transport,
        Self::Travel,
    ];

    /// Returns the numeric code (1–21).
    pub fn code(&self) -> u8 {
        Self::ALL
            .iter()
            .position(|c| c == self)
            .map(|idx| idx as u8 + 1)
            .unwrap_or(11)
    }

    /// Looks up a category by code. Codes outside 1–21 return `None`.
    pub fn from_code(code: i64) -> Option<Self> {
        if (1..=21).contains(&code) {
            Some(Self::ALL[(code - 1) as usize])
        } else {
            None
        }
    }

    /// Returns the category label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Animals => "Animals",
            Self::BuildingsAndArchitecture => "Buildings and Architecture",
            Self::Business => "Business",
            Self::Drinks => "Drinks",
            Self::TheEnvironment => "The Environment",
            Self::StatesOfMind => "States of Mind",
            Self::Food => "Food",
            Self::GraphicResources => "Graphic Resources",
            Self::HobbiesAndLeisure => "Hobbies and Leisure",
            Self::Industry => "Industry",
            Self::Landscape => "Landscape",
            Self::Lifestyle => "Lifestyle",
            Self::People => "People",
            Self::PlantsAndFlowers => "Plants and Flowers",
            Self::CultureAndReligion => "Culture and Religion",
            Self::Science => "Science",
            Self::SocialIssues => "Social Issues",
            Self::Sports => "Sports",
            Self::Technology => "Technology",
            Self::Transport => "Transport",
            Self::Travel => "Travel",
        }
    }

    /// Looks up a category by label, case-insensitively.
    ///
    /// Short legacy labels ("Buildings", "Plants", ...) are accepted too.
    pub fn from_name(name: &str) -> Option<Self> {
        let needle = name.trim();
        if let Some(found) = Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(needle))
        {
            return Some(found);
        }
        let legacy = match needle.to_ascii_lowercase().as_str() {
            "buildings" | "architecture" => Self::BuildingsAndArchitecture,
            "environment" => Self::TheEnvironment,
            "graphics" => Self::GraphicResources,
            "hobbies" | "leisure" => Self::HobbiesAndLeisure,
            "plants" | "flowers" => Self::PlantsAndFlowers,
            "culture" | "religion" => Self::CultureAndReligion,
            _ => return None,
        };
        Some(legacy)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Usage-release classification of an asset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Releases {
    #[default]
    None,
    Model,
    Property,
    #[serde(rename = "Model and Property")]
    ModelAndProperty,
}

impl Releases {
    /// Returns the release label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Model => "Model",
            Self::Property => "Property",
            Self::ModelAndProperty => "Model and Property",
        }
    }

    /// Parses one of the four exact labels.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "None" => Some(Self::None),
            "Model" => Some(Self::Model),
            "Property" => Some(Self::Property),
            "Model and Property" => Some(Self::ModelAndProperty),
            _ => Option::None,
        }
    }
}

impl std::fmt::Display for Releases {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared media type of a submitted asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Text,
}

/// Content payload of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum AssetContent {
    /// Encoded image bytes (JPEG, PNG, WebP).
    Image(Vec<u8>),
    /// Plain text describing a concept.
    Text(String),
    /// Encoded video bytes.
    Video(Vec<u8>),
    /// Ordered still frames sampled from a video.
    Frames(Vec<Vec<u8>>),
}

impl AssetContent {
    /// Returns a short label for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Image(_) => "image",
            Self::Text(_) => "text",
            Self::Video(_) => "video",
            Self::Frames(_) => "frames",
        }
    }

    /// Decodes submitted content.
    ///
    /// `content` is a data URL, bare base64, or plain text when `media_type`
    /// is [`MediaType::Text`]. Without a declared type, the data URL prefix
    /// decides; bare base64 is treated as an image.
    pub fn decode(content: &str, media_type: Option<MediaType>) -> Result<Self> {
        let sniffed = if content.starts_with("data:video/") {
            Some(MediaType::Video)
        } else if content.starts_with("data:image/") {
            Some(MediaType::Image)
        } else {
            None
        };

        match media_type.or(sniffed).unwrap_or(MediaType::Image) {
            MediaType::Text => Ok(Self::Text(content.to_string())),
            MediaType::Image => Ok(Self::Image(decode_base64_lenient(content)?)),
            MediaType::Video => Ok(Self::Video(decode_base64_lenient(content)?)),
        }
    }

    /// Guesses the MIME type of image bytes from their magic number.
    pub fn image_mime_type(data: &[u8]) -> &'static str {
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            "image/png"
        } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            "image/webp"
        } else {
            "image/jpeg"
        }
    }
}

/// Decodes base64 that may carry a data URL prefix, whitespace or missing padding.
pub(crate) fn decode_base64_lenient(input: &str) -> Result<Vec<u8>> {
    use base64::Engine;

    let b64 = match input.find(";base64,") {
        Some(pos) => &input[pos + 8..],
        None => input,
    };

    let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(StockMetaError::InvalidInput("empty base64 payload".into()));
    }

    if let Ok(data) = base64::engine::general_purpose::STANDARD.decode(&cleaned) {
        return Ok(data);
    }

    base64::engine::general_purpose::STANDARD_NO_PAD
        .decode(cleaned.trim_end_matches('='))
        .map_err(|e| StockMetaError::InvalidInput(format!("invalid base64: {e}")))
}

/// A single metadata generation request.
#[derive(Debug, Clone)]
pub struct MetadataRequest {
    /// Asset identifier.
    pub filename: String,
    /// What to analyze.
    pub content: AssetContent,
    /// Target provider.
    pub provider: ProviderKind,
    /// Provider model identifier. Empty means the provider default.
    pub model: String,
    /// System prompt text.
    pub system_prompt: String,
    /// Optional user-added context appended to the prompt.
    pub additional_context: Option<String>,
}

impl MetadataRequest {
    /// Creates a request using the provider's default model and prompt.
    pub fn new(filename: impl Into<String>, content: AssetContent, provider: ProviderKind) -> Self {
        Self {
            filename: filename.into(),
            content,
            provider,
            model: provider.default_model().to_string(),
            system_prompt: crate::prompt::DEFAULT_SYSTEM_PROMPT.to_string(),
            additional_context: None,
        }
    }

    /// Sets the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Sets the system prompt.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Sets additional context. Blank context is dropped.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.additional_context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    /// Returns the model, falling back to the provider default when unset.
    pub fn effective_model(&self) -> &str {
        if self.model.trim().is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }
}

/// How a video-level result was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    /// Whole video sent to a provider with native video input.
    Native,
    /// Sampled frames analyzed one by one and aggregated.
    FrameSampling,
}

/// Video-specific details attached to a result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    /// Analysis path taken.
    pub method: AnalysisMethod,
    /// Frames sent for analysis.
    pub frames_total: usize,
    /// Frames whose analysis succeeded.
    pub frames_analyzed: usize,
    /// Probed (or assumed) duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Set when placeholder frames stood in for real ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Canonical metadata produced for one (asset, provider) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataResult {
    pub success: bool,
    pub title: String,
    pub keywords: Vec<String>,
    pub category: Category,
    pub releases: Releases,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub raw_response: String,
    /// True when the JSON had to be repaired before parsing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub repaired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoAnalysis>,
}

impl MetadataResult {
    /// Creates a successful result.
    pub fn success(
        title: impl Into<String>,
        keywords: Vec<String>,
        category: Category,
        releases: Releases,
    ) -> Self {
        Self {
            success: true,
            title: title.into(),
            keywords,
            category,
            releases,
            error: String::new(),
            raw_response: String::new(),
            repaired: false,
            video: None,
        }
    }

    /// Creates a failed result with the given error text.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            title: String::new(),
            keywords: Vec::new(),
            category: Category::default(),
            releases: Releases::default(),
            error: error.into(),
            raw_response: String::new(),
            repaired: false,
            video: None,
        }
    }

    /// Attaches the provider's raw text.
    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = raw.into();
        self
    }

    /// Attaches video analysis details.
    pub fn with_video(mut self, video: VideoAnalysis) -> Self {
        self.video = Some(video);
        self
    }
}

impl From<StockMetaError> for MetadataResult {
    fn from(err: StockMetaError) -> Self {
        Self::failure(err.to_string())
    }
}

/// A result tagged with the asset and provider it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub filename: String,
    pub service: ProviderKind,
    #[serde(flatten)]
    pub result: MetadataResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("mistral".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_provider_kind_serde() {
        let json = serde_json::to_string(&ProviderKind::DeepSeek).unwrap();
        assert_eq!(json, "\"deepseek\"");
        let kind: ProviderKind = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_capabilities() {
        assert!(ProviderKind::Gemini.supports_native_video());
        assert!(!ProviderKind::Groq.supports_native_video());
        assert!(!ProviderKind::DeepSeek.supports_images());
        assert!(ProviderKind::Cohere.supports_images());
    }

    #[test]
    fn test_category_code_round_trip() {
        for code in 1..=21 {
            let category = Category::from_code(code).unwrap();
            assert_eq!(i64::from(category.code()), code);
            assert_eq!(Category::from_name(category.name()), Some(category));
        }
    }

    #[test]
    fn test_category_unknown() {
        assert_eq!(Category::from_code(0), None);
        assert_eq!(Category::from_code(22), None);
        assert_eq!(Category::from_name("Cars"), None);
        assert_eq!(Category::default().code(), 11);
    }

    #[test]
    fn test_category_legacy_names() {
        assert_eq!(
            Category::from_name("Buildings"),
            Some(Category::BuildingsAndArchitecture)
        );
        assert_eq!(Category::from_name("plants"), Some(Category::PlantsAndFlowers));
        assert_eq!(Category::from_name(" travel "), Some(Category::Travel));
    }

    #[test]
    fn test_category_serde_uses_label() {
        let json = serde_json::to_string(&Category::StatesOfMind).unwrap();
        assert_eq!(json, "\"States of Mind\"");
    }

    #[test]
    fn test_releases_labels() {
        assert_eq!(Releases::from_label("Model and Property"), Some(Releases::ModelAndProperty));
        assert_eq!(Releases::from_label("Editorial"), Option::None);
        assert_eq!(Releases::default(), Releases::None);
        let json = serde_json::to_string(&Releases::ModelAndProperty).unwrap();
        assert_eq!(json, "\"Model and Property\"");
    }

    #[test]
    fn test_failure_invariants() {
        let result = MetadataResult::failure("boom");
        assert!(!result.success);
        assert!(result.title.is_empty());
        assert!(result.keywords.is_empty());
        assert_eq!(result.error, "boom");
    }

    #[test]
    fn test_result_serialization_omits_empty_error() {
        let result = MetadataResult::success("t", vec!["a".into()], Category::Food, Releases::None);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("error").is_none());
        assert!(json.get("repaired").is_none());
        assert_eq!(json["category"], "Food");
    }

    #[test]
    fn test_task_result_flattens() {
        let task = TaskResult {
            filename: "a.jpg".into(),
            service: ProviderKind::Groq,
            result: MetadataResult::failure("nope"),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["filename"], "a.jpg");
        assert_eq!(json["service"], "groq");
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "nope");
    }

    #[test]
    fn test_decode_data_url() {
        let content = AssetContent::decode("data:image/png;base64,AQID", None).unwrap();
        assert_eq!(content, AssetContent::Image(vec![1, 2, 3]));

        let content = AssetContent::decode("data:video/mp4;base64,AQID", None).unwrap();
        assert_eq!(content, AssetContent::Video(vec![1, 2, 3]));
    }

    #[test]
    fn test_decode_lenient_padding_and_whitespace() {
        assert_eq!(decode_base64_lenient("AQ\nID").unwrap(), vec![1, 2, 3]);
        assert_eq!(decode_base64_lenient("AQI").unwrap(), vec![1, 2]);
        assert!(decode_base64_lenient("   ").is_err());
    }

    #[test]
    fn test_decode_text() {
        let content = AssetContent::decode("a quiet lake", Some(MediaType::Text)).unwrap();
        assert_eq!(content, AssetContent::Text("a quiet lake".into()));
    }

    #[test]
    fn test_image_mime_type() {
        assert_eq!(AssetContent::image_mime_type(&[0x89, 0x50, 0x4E, 0x47]), "image/png");
        assert_eq!(AssetContent::image_mime_type(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
    }

    #[test]
    fn test_request_with_blank_context() {
        let req = MetadataRequest::new("a.jpg", AssetContent::Text("x".into()), ProviderKind::Groq)
            .with_context("   ");
        assert!(req.additional_context.is_none());
        let req = req.with_model("");
        assert_eq!(req.effective_model(), ProviderKind::Groq.default_model());
    }
}
