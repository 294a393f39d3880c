pub mod extractor;
pub mod gemini;
pub mod groq;
pub mod ollama;
pub mod resolver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Decoding knobs passed to the remote model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CompletionParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 200,
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, prompt: &str, params: &CompletionParams) -> anyhow::Result<String>;
}

/// Removes a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let inner = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Best-effort JSON decoding of a model reply: as-is, without fences, then the
/// outermost `{...}` span.
pub fn parse_json_reply<T: serde::de::DeserializeOwned>(response: &str) -> Option<T> {
    if let Ok(value) = serde_json::from_str(response) {
        return Some(value);
    }

    let cleaned = strip_code_fence(response);
    if let Ok(value) = serde_json::from_str(cleaned) {
        return Some(value);
    }

    let start = cleaned.find('{')?;
    let end = cleaned.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&cleaned[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Probe {
        ok: bool,
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fence("  {} "), "{}");
    }

    #[test]
    fn test_parse_json_reply_variants() {
        assert!(parse_json_reply::<Probe>(r#"{"ok":true}"#).unwrap().ok);
        assert!(parse_json_reply::<Probe>("```json\n{\"ok\":true}\n```").unwrap().ok);
        assert!(parse_json_reply::<Probe>("Claro! {\"ok\":true} Espero ter ajudado").unwrap().ok);
        assert!(parse_json_reply::<Probe>("sem json aqui").is_none());
    }
}
