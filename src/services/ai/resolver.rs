use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::{parse_json_reply, CompletionParams, LlmProvider};
use crate::models::{FieldSpec, NluResult};
use crate::services::cache::ResponseCache;
use crate::services::validators;

const RESOLVE_PROMPT: &str = r#"Você é um assistente de agendamento médico que interpreta a resposta de um paciente a uma pergunta do chatbot.

Pergunta do chatbot: "{question}"
Resposta do paciente: "{message}"
Campo que estamos coletando: {field}
Opções válidas: {options}

Classifique a resposta:
- "ASK_QUESTION" se o paciente está fazendo uma pergunta em vez de responder;
- "PROVIDE_INFO" se o paciente está tentando fornecer a informação pedida.

Se for PROVIDE_INFO, extraia o valor do campo. Se houver opções válidas, o valor deve ser exatamente uma delas.
Se o valor não for aceitável, marque is_valid como false e explique o problema em "error", em português, de forma educada.

Responda APENAS com JSON válido (sem markdown, sem explicações), exatamente neste formato:
{"intent": "PROVIDE_INFO" ou "ASK_QUESTION", "is_valid": true ou false, "value": "valor extraído ou null", "error": "mensagem de erro ou null"}
"#;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NluStats {
    pub cache_size: usize,
    pub cache_hits: u64,
    pub api_calls: u64,
    pub hit_ratio: f64,
}

/// Interprets a user message for one field: cache, then local validators, then
/// the remote model. Never fails; remote problems become an invalid result.
pub struct NluResolver {
    llm: Arc<dyn LlmProvider>,
    cache: ResponseCache,
    params: CompletionParams,
    timeout: Duration,
    requests: AtomicU64,
    cache_hits: AtomicU64,
    api_calls: AtomicU64,
}

impl NluResolver {
    pub fn new(llm: Arc<dyn LlmProvider>, params: CompletionParams, timeout: Duration) -> Self {
        Self {
            llm,
            cache: ResponseCache::new(),
            params,
            timeout,
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            api_calls: AtomicU64::new(0),
        }
    }

    pub async fn resolve(
        &self,
        prompt_context: &str,
        message: &str,
        field: &FieldSpec,
        options: &[String],
    ) -> NluResult {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let field_name = field.path.to_string();
        let key = ResponseCache::key(message, &field_name, options);

        if let Some(cached) = self.cache.get(&key) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(field = %field_name, "nlu cache hit");
            return cached;
        }

        if let Some(local) = validators::validate(field.kind, message, options) {
            tracing::debug!(field = %field_name, valid = local.is_valid, "resolved locally");
            self.cache.put(key, local.clone());
            return local;
        }

        let result = self
            .resolve_remote(prompt_context, message, &field_name, options)
            .await;
        self.cache.put(key, result.clone());
        result
    }

    async fn resolve_remote(
        &self,
        prompt_context: &str,
        message: &str,
        field_name: &str,
        options: &[String],
    ) -> NluResult {
        let options_text = if options.is_empty() {
            "nenhuma validação específica".to_string()
        } else {
            options.join(", ")
        };
        let prompt = RESOLVE_PROMPT
            .replace("{question}", prompt_context)
            .replace("{message}", message)
            .replace("{field}", field_name)
            .replace("{options}", &options_text);

        self.api_calls.fetch_add(1, Ordering::Relaxed);
        tracing::info!(field = %field_name, "calling remote NLU");

        let response =
            match tokio::time::timeout(self.timeout, self.llm.complete(&prompt, &self.params)).await
            {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, field = %field_name, "remote NLU call failed");
                    return NluResult::fallback(message);
                }
                Err(_) => {
                    tracing::warn!(
                        field = %field_name,
                        timeout_secs = self.timeout.as_secs_f32(),
                        "remote NLU call timed out"
                    );
                    return NluResult::fallback(message);
                }
            };

        match parse_json_reply::<NluResult>(&response) {
            Some(result) => result.normalized(message),
            None => {
                tracing::warn!(field = %field_name, "failed to parse remote NLU reply, using fallback");
                NluResult::fallback(message)
            }
        }
    }

    pub fn stats(&self) -> NluStats {
        let requests = self.requests.load(Ordering::Relaxed);
        let cache_hits = self.cache_hits.load(Ordering::Relaxed);
        NluStats {
            cache_size: self.cache.len(),
            cache_hits,
            api_calls: self.api_calls.load(Ordering::Relaxed),
            hit_ratio: if requests == 0 {
                0.0
            } else {
                cache_hits as f64 / requests as f64
            },
        }
    }
}
