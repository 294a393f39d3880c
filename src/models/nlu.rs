use serde::{Deserialize, Serialize};

use super::lenient;

pub const GENERIC_NLU_ERROR: &str =
    "Desculpe, tive um problema ao processar sua resposta. Pode tentar novamente?";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NluIntent {
    ProvideInfo,
    AskQuestion,
}

/// Interpretation of one user message against one target field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NluResult {
    pub intent: NluIntent,
    pub is_valid: bool,
    #[serde(default, alias = "extracted_value", deserialize_with = "lenient::string")]
    pub value: Option<String>,
    #[serde(default, alias = "error_message")]
    pub error: Option<String>,
}

impl NluResult {
    pub fn question() -> Self {
        Self {
            intent: NluIntent::AskQuestion,
            is_valid: true,
            value: None,
            error: None,
        }
    }

    pub fn accepted(value: impl Into<String>) -> Self {
        Self {
            intent: NluIntent::ProvideInfo,
            is_valid: true,
            value: Some(value.into()),
            error: None,
        }
    }

    pub fn rejected(raw: &str, error: impl Into<String>) -> Self {
        Self {
            intent: NluIntent::ProvideInfo,
            is_valid: false,
            value: Some(raw.to_string()),
            error: Some(error.into()),
        }
    }

    /// Result used whenever the remote interpreter cannot be reached or understood.
    pub fn fallback(raw: &str) -> Self {
        Self::rejected(raw, GENERIC_NLU_ERROR)
    }

    /// Forces a remotely produced result back into the shape callers rely on.
    pub fn normalized(mut self, raw: &str) -> Self {
        match self.intent {
            NluIntent::AskQuestion => Self::question(),
            NluIntent::ProvideInfo if !self.is_valid => {
                if self.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
                    self.error = Some(GENERIC_NLU_ERROR.to_string());
                }
                if self.value.is_none() {
                    self.value = Some(raw.to_string());
                }
                self
            }
            NluIntent::ProvideInfo => match self.value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => {
                    self.value = Some(v.to_string());
                    self.error = None;
                    self
                }
                _ => Self::rejected(
                    raw,
                    "Não consegui identificar essa informação na sua resposta. Pode repetir?",
                ),
            },
        }
    }
}
