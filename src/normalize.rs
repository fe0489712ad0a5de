//! Turns raw provider text into a canonical [`MetadataResult`].
//!
//! Providers answer with JSON that may be wrapped in Markdown fences,
//! surrounded by prose, or cut off mid-way when the model hits its token
//! limit. The normalizer isolates the first JSON object, repairs obvious
//! truncation, and coerces the fields into their canonical types.

use crate::types::{Category, MetadataResult, Releases};
use serde_json::Value;
use std::collections::HashSet;

/// Maximum number of keywords kept on a result.
pub const MAX_KEYWORDS: usize = 50;

/// Normalizes a raw provider response.
///
/// Never fails: unparseable text yields an unsuccessful result that keeps the
/// raw text. `raw_response` is always the untouched input, so normalizing it
/// again gives the same result.
pub fn normalize(raw: &str) -> MetadataResult {
    match parse_metadata(raw) {
        Ok(result) => result.with_raw_response(raw),
        Err(e) => {
            MetadataResult::failure(format!("Failed to parse AI response: {e}")).with_raw_response(raw)
        }
    }
}

fn parse_metadata(raw: &str) -> Result<MetadataResult, serde_json::Error> {
    let text = strip_code_fence(raw);
    let candidate = extract_json_candidate(text);

    let (value, repaired) = match serde_json::from_str::<Value>(candidate) {
        Ok(value) => (value, false),
        Err(original) => {
            let fixed = repair_truncated(candidate);
            if fixed == candidate {
                return Err(original);
            }
            tracing::debug!(before = candidate.len(), after = fixed.len(), "repaired truncated JSON");
            (serde_json::from_str::<Value>(&fixed)?, true)
        }
    };

    let Value::Object(map) = value else {
        return Err(serde::de::Error::custom("expected a JSON object"));
    };

    let title = map
        .get("title")
        .and_then(Value::as_str)
        .map(|t| t.trim().to_string())
        .unwrap_or_default();
    let keywords = map.get("keywords").map(parse_keywords).unwrap_or_default();
    let category = map.get("category").map(parse_category).unwrap_or_default();
    let releases = map.get("releases").map(parse_releases).unwrap_or_default();

    let mut result = MetadataResult::success(title, keywords, category, releases);
    result.repaired = repaired;
    Ok(result)
}

/// Removes a surrounding Markdown code fence, if the text starts with one.
pub(crate) fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }

    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed.trim_start_matches('`'),
    };
    body.trim_end().trim_end_matches("```").trim()
}

/// Returns the first balanced `{...}` in `text`, or everything from the first
/// `{` when it never balances. Text without `{` is returned as is.
fn extract_json_candidate(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[start..start + offset + 1];
                }
            }
            _ => {}
        }
    }

    &text[start..]
}

/// Result of a string-aware pass over a JSON fragment.
struct Scan {
    /// Unclosed `{` and `[`, innermost last.
    open: Vec<char>,
    /// Unescaped double quotes seen.
    quotes: usize,
    /// Byte offset of the opening quote of the last string literal.
    last_string_start: Option<usize>,
}

fn scan(text: &str) -> Scan {
    let mut open = Vec::new();
    let mut quotes = 0;
    let mut last_string_start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    in_string = false;
                    quotes += 1;
                }
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                quotes += 1;
                last_string_start = Some(idx);
            }
            '{' | '[' => open.push(ch),
            '}' | ']' => {
                open.pop();
            }
            _ => {}
        }
    }

    Scan {
        open,
        quotes,
        last_string_start,
    }
}

/// Best-effort repair of JSON cut off mid-stream.
///
/// An unterminated string is cut back to the last complete `"...",` entry,
/// which may drop a valid trailing value. Dangling commas and keys are
/// removed and open arrays/objects closed.
fn repair_truncated(candidate: &str) -> String {
    let mut text = candidate.trim_end().to_string();

    let first = scan(&text);
    if first.quotes % 2 == 1 {
        match text.rfind("\",") {
            Some(pos) => text.truncate(pos + 1),
            None => {
                if let Some(start) = first.last_string_start {
                    text.truncate(start);
                }
            }
        }
    }

    loop {
        let len = text.trim_end().len();
        text.truncate(len);

        if text.ends_with(',') || text.ends_with(':') {
            text.pop();
            continue;
        }

        // A key with no value: `{"a":1,"b"`.
        if text.ends_with('"') {
            let state = scan(&text);
            if state.open.last() == Some(&'{') {
                if let Some(start) = state.last_string_start {
                    let before = text[..start].trim_end();
                    if before.ends_with('{') || before.ends_with(',') {
                        text.truncate(start);
                        continue;
                    }
                }
            }
        }
        break;
    }

    for open in scan(&text).open.iter().rev() {
        text.push(if *open == '{' { '}' } else { ']' });
    }
    text
}

fn parse_keywords(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => dedup_keywords(items.iter().filter_map(|item| match item {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })),
        Value::String(s) => dedup_keywords(s.split(',')),
        _ => Vec::new(),
    }
}

/// Trims keywords, drops empty ones and case-insensitive duplicates (first
/// spelling wins), and keeps at most [`MAX_KEYWORDS`].
pub fn dedup_keywords<I, S>(keywords: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for keyword in keywords {
        let keyword = keyword.as_ref().trim();
        if keyword.is_empty() || !seen.insert(keyword.to_lowercase()) {
            continue;
        }
        out.push(keyword.to_string());
        if out.len() == MAX_KEYWORDS {
            break;
        }
    }
    out
}

fn parse_category(value: &Value) -> Category {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .and_then(Category::from_code),
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(code) => Category::from_code(code),
            Err(_) => Category::from_name(s),
        },
        _ => None,
    };
    parsed.unwrap_or_default()
}

fn parse_releases(value: &Value) -> Releases {
    value
        .as_str()
        .and_then(Releases::from_label)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let raw = r#"{"title":"Sunset over lake","keywords":["sunset","lake"],"category":11,"releases":"None"}"#;
        let result = normalize(raw);
        assert!(result.success);
        assert_eq!(result.title, "Sunset over lake");
        assert_eq!(result.keywords, vec!["sunset", "lake"]);
        assert_eq!(result.category, Category::Landscape);
        assert_eq!(result.releases, Releases::None);
        assert!(!result.repaired);
        assert_eq!(result.raw_response, raw);
    }

    #[test]
    fn test_fenced_json_with_prose() {
        let raw = "```json\n{\"title\": \"Cat\", \"keywords\": [\"cat\"], \"category\": \"Animals\"}\n```";
        let result = normalize(raw);
        assert!(result.success);
        assert_eq!(result.title, "Cat");
        assert_eq!(result.category, Category::Animals);

        let raw = "Here you go: {\"title\": \"Dog {big}\", \"keywords\": []} hope it helps";
        let result = normalize(raw);
        assert!(result.success);
        assert_eq!(result.title, "Dog {big}");
    }

    #[test]
    fn test_comma_separated_keywords() {
        let result = normalize(r#"{"title":"t","keywords":"a, b, ,c"}"#);
        assert_eq!(result.keywords, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_keywords_deduplicated_and_capped() {
        let keywords: Vec<String> = (0..60).map(|i| format!("kw{i}")).collect();
        let raw = serde_json::json!({ "title": "t", "keywords": keywords }).to_string();
        let result = normalize(&raw);
        assert_eq!(result.keywords.len(), MAX_KEYWORDS);
        assert_eq!(result.keywords[0], "kw0");
        assert_eq!(result.keywords[49], "kw49");

        let result = normalize(r#"{"title":"t","keywords":["Sky","sky"," SKY ","blue"]}"#);
        assert_eq!(result.keywords, vec!["Sky", "blue"]);
    }

    #[test]
    fn test_category_forms() {
        let cases = [
            (r#"{"category": 2}"#, Category::BuildingsAndArchitecture),
            (r#"{"category": "7"}"#, Category::Food),
            (r#"{"category": "Travel"}"#, Category::Travel),
            (r#"{"category": "Plants"}"#, Category::PlantsAndFlowers),
            (r#"{"category": 42}"#, Category::Landscape),
            (r#"{"category": "Cars"}"#, Category::Landscape),
            (r#"{"category": null}"#, Category::Landscape),
        ];
        for (raw, expected) in cases {
            assert_eq!(normalize(raw).category, expected, "{raw}");
        }
    }

    #[test]
    fn test_releases_exact() {
        assert_eq!(
            normalize(r#"{"releases":"Model and Property"}"#).releases,
            Releases::ModelAndProperty
        );
        assert_eq!(normalize(r#"{"releases":"model"}"#).releases, Releases::None);
    }

    #[test]
    fn test_repair_unclosed_array() {
        let result = normalize(r#"{"title":"X","keywords":["a","b""#);
        assert!(result.success);
        assert!(result.repaired);
        assert_eq!(result.title, "X");
        assert_eq!(result.keywords, vec!["a", "b"]);
    }

    #[test]
    fn test_repair_unterminated_string() {
        let result = normalize(r#"{"title":"Hello, world","keywords":["a","b","c"#);
        assert!(result.success);
        assert!(result.repaired);
        assert_eq!(result.title, "Hello, world");
        assert_eq!(result.keywords, vec!["a", "b"]);
    }

    #[test]
    fn test_repair_dangling_key() {
        let result = normalize(r#"{"title":"X","keywords":["a"],"category""#);
        assert!(result.repaired);
        assert_eq!(result.keywords, vec!["a"]);
        assert_eq!(result.category, Category::Landscape);

        let result = normalize(r#"{"title":"X","category":"#);
        assert!(result.success);
        assert_eq!(result.title, "X");
    }

    #[test]
    fn test_unparseable() {
        let result = normalize("I cannot help with that.");
        assert!(!result.success);
        assert!(result.error.starts_with("Failed to parse AI response:"));
        assert_eq!(result.raw_response, "I cannot help with that.");
        assert!(result.keywords.is_empty());

        let result = normalize("[1, 2, 3]");
        assert!(!result.success);
    }

    #[test]
    fn test_renormalize_is_idempotent() {
        let inputs = [
            r#"{"title":"X","keywords":["a","b""#,
            "```json\n{\"title\":\"Y\",\"keywords\":\"p, q\"}\n```",
            "garbage",
        ];
        for raw in inputs {
            let first = normalize(raw);
            let second = normalize(&first.raw_response);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("```json\n{}"), "{}");
        assert_eq!(strip_code_fence("  {}  "), "{}");
    }
}
