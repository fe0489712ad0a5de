//! Prompt text sent to providers.

use crate::types::{AssetContent, MetadataRequest};
use serde::{Deserialize, Serialize};

/// Maximum length of user-supplied context and filenames after sanitizing.
pub const MAX_INPUT_CHARS: usize = 1000;

/// System prompt asking for a single JSON object with stock metadata.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You generate Adobe Stock metadata.

Respond with ONE valid JSON object and nothing else:
- no explanations, no Markdown, no code fences
- start with { and end with }
- double quotes for every string
- "keywords" is an array of strings, never a comma-separated string

Format:
{
  "title": "Descriptive title, 170-200 characters",
  "keywords": ["keyword1", "keyword2", "keyword3"],
  "category": 11,
  "releases": "None"
}

Keywords: up to 50 search terms a buyer would type. Cover subject, colors,
mood, concepts, use cases and technical terms. Single words or short phrases.

Category: exactly one number.
1 Animals | 2 Buildings and Architecture | 3 Business | 4 Drinks | 5 The Environment | 6 States of Mind | 7 Food | 8 Graphic Resources | 9 Hobbies and Leisure | 10 Industry | 11 Landscape | 12 Lifestyle | 13 People | 14 Plants and Flowers | 15 Culture and Religion | 16 Science | 17 Social Issues | 18 Sports | 19 Technology | 20 Transport | 21 Travel

Releases: one of None, Model, Property, Model and Property.

Example:
{"title": "Golden sunset over a mountain valley with dramatic clouds and warm light across the peaks", "keywords": ["sunset", "mountain", "valley", "golden hour", "dramatic sky", "clouds", "landscape", "nature", "scenic", "travel"], "category": 11, "releases": "None"}"#;

/// Removes markup and control characters from user input and caps its length.
pub fn sanitize_input(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '<' | '>' | '"' | '\'' | '&' | '\0' | '\r' | '\n'))
        .take(MAX_INPUT_CHARS)
        .collect()
}

/// System prompt plus optional user context applied to every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptContext {
    pub system_prompt: String,
    pub additional_context: Option<String>,
}

impl Default for PromptContext {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            additional_context: None,
        }
    }
}

impl PromptContext {
    /// Creates a context with the built-in system prompt.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the system prompt. A blank prompt keeps the default.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        if !prompt.trim().is_empty() {
            self.system_prompt = prompt;
        }
        self
    }

    /// Sets the additional context, sanitized.
    pub fn with_context(mut self, context: impl AsRef<str>) -> Self {
        let context = sanitize_input(context.as_ref());
        self.additional_context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    /// Applies this context to a request.
    pub fn apply(&self, request: MetadataRequest) -> MetadataRequest {
        let request = request.with_system_prompt(self.system_prompt.clone());
        match &self.additional_context {
            Some(context) => request.with_context(context.clone()),
            None => request,
        }
    }
}

/// Builds the user prompt for a request.
pub fn user_prompt(request: &MetadataRequest) -> String {
    let filename = sanitize_input(&request.filename);
    let mut prompt = match &request.content {
        AssetContent::Text(text) => format!(
            "Analyze this text for Adobe Stock submission concept. Filename: {filename}\n\nText: {text}"
        ),
        AssetContent::Video(_) => {
            format!("Analyze this video for Adobe Stock submission. Filename: {filename}")
        }
        AssetContent::Image(_) | AssetContent::Frames(_) => {
            format!("Analyze this image for Adobe Stock submission. Filename: {filename}")
        }
    };

    if let Some(context) = &request.additional_context {
        prompt.push_str("\n\nAdditional context: ");
        prompt.push_str(context);
    }
    prompt
}

/// Extends a system prompt with what is known about the sampled video.
pub fn frame_system_prompt(
    base: &str,
    duration_secs: f64,
    total_frames: u64,
    sampled_frames: usize,
) -> String {
    format!(
        "{base}\n\nNote: You are analyzing key frames extracted from a video. \
         The video is {duration_secs:.1} seconds long with {total_frames} total frames. \
         Please provide insights based on these {sampled_frames} representative frames."
    )
}

/// Name given to the `index`-th (0-based) frame of `filename`.
pub fn frame_filename(filename: &str, index: usize) -> String {
    format!("{filename}_frame_{}", index + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProviderKind;

    #[test]
    fn test_sanitize_input() {
        assert_eq!(sanitize_input("<b>\"hi\" & 'bye'</b>\r\n"), "bhi  bye/b");
        assert_eq!(sanitize_input(&"a".repeat(1500)).len(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_user_prompt_image_with_context() {
        let req = MetadataRequest::new("beach.jpg", AssetContent::Image(vec![1]), ProviderKind::OpenAi)
            .with_context("summer campaign");
        assert_eq!(
            user_prompt(&req),
            "Analyze this image for Adobe Stock submission. Filename: beach.jpg\n\nAdditional context: summer campaign"
        );
    }

    #[test]
    fn test_user_prompt_text() {
        let req = MetadataRequest::new(
            "idea.txt",
            AssetContent::Text("A calm lake at dawn".into()),
            ProviderKind::Groq,
        );
        let prompt = user_prompt(&req);
        assert!(prompt.starts_with("Analyze this text for Adobe Stock submission concept."));
        assert!(prompt.ends_with("Text: A calm lake at dawn"));
    }

    #[test]
    fn test_context_apply() {
        let ctx = PromptContext::new()
            .with_system_prompt("custom")
            .with_context("<script>");
        let req = ctx.apply(MetadataRequest::new(
            "a.jpg",
            AssetContent::Image(vec![1]),
            ProviderKind::Gemini,
        ));
        assert_eq!(req.system_prompt, "custom");
        assert_eq!(req.additional_context.as_deref(), Some("script"));

        let ctx = PromptContext::new().with_system_prompt("   ");
        assert_eq!(ctx.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_frame_system_prompt() {
        let prompt = frame_system_prompt("base", 12.345, 300, 5);
        assert!(prompt.starts_with("base\n\nNote:"));
        assert!(prompt.contains("12.3 seconds long with 300 total frames"));
        assert!(prompt.contains("these 5 representative frames"));
        assert_eq!(frame_filename("clip.mp4", 0), "clip.mp4_frame_1");
    }
}
