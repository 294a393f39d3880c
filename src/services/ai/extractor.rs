use std::time::Duration;

use super::{parse_json_reply, CompletionParams, LlmProvider};
use crate::models::ExtractedRecord;
use crate::services::merger;

const EXTRACTION_PROMPT: &str = r#"Você é um assistente médico especializado em extrair informações para agendamento de consultas e exames.

Analise a mensagem do paciente e extraia APENAS as informações fornecidas explicitamente.
Não invente nem suponha dados que não foram mencionados.

Responda APENAS com JSON válido, exatamente neste formato:
{
  "paciente": {
    "nome": "nome completo ou null",
    "cpf": "apenas números ou null",
    "data_nascimento": "DD/MM/AAAA ou null",
    "sexo": "M, F, O ou null"
  },
  "agendamento_info": {
    "tipo_agendamento": "consulta, exame ou null",
    "tipo_consulta": "Primeira Consulta, Retorno, Telemedicina ou null",
    "nome_exame": "nome do exame ou null",
    "especialidade": "especialidade médica ou null",
    "tem_convenio": true, false ou null,
    "nome_convenio": "nome do convênio ou null"
  },
  "preferencias": {
    "data_preferencia": "DD/MM/AAAA ou null",
    "horario_preferencia": "HH:MM ou null",
    "periodo_preferencia": "manha, tarde, noite ou null",
    "local_preferencia": "local desejado ou null",
    "observacoes": "sintomas e observações ou null"
  }
}

Mensagem do paciente: "{message}"
"#;

const ALL_SET: &str = "Perfeito! Tenho todas as informações necessárias para o agendamento.";
const NEED_MORE: &str =
    "Para continuar com o agendamento, preciso de mais algumas informações. Pode me ajudar?";

fn extraction_params() -> CompletionParams {
    CompletionParams {
        temperature: 0.1,
        max_tokens: 600,
    }
}

async fn complete_within(
    llm: &dyn LlmProvider,
    prompt: &str,
    params: &CompletionParams,
    timeout: Duration,
    what: &str,
) -> Option<String> {
    match tokio::time::timeout(timeout, llm.complete(prompt, params)).await {
        Ok(Ok(text)) => Some(text),
        Ok(Err(e)) => {
            tracing::error!(error = %e, call = what, "remote call failed");
            None
        }
        Err(_) => {
            tracing::warn!(
                call = what,
                timeout_secs = timeout.as_secs_f32(),
                "remote call timed out"
            );
            None
        }
    }
}

/// One-shot extraction of every field mentioned in `message`. Any failure,
/// including a reply slower than `timeout`, yields the empty record.
pub async fn extract_record(
    llm: &dyn LlmProvider,
    message: &str,
    timeout: Duration,
) -> ExtractedRecord {
    let prompt = EXTRACTION_PROMPT.replace("{message}", message);

    let Some(response) =
        complete_within(llm, &prompt, &extraction_params(), timeout, "extraction").await
    else {
        return ExtractedRecord::empty();
    };

    match parse_json_reply::<ExtractedRecord>(&response) {
        Some(mut record) => {
            merger::refresh_field_lists(&mut record);
            tracing::info!(fields = record.fields_present.len(), "extracted fields from message");
            record
        }
        None => {
            tracing::warn!("failed to parse extraction reply as JSON, using empty record");
            ExtractedRecord::empty()
        }
    }
}

/// Friendly follow-up asking for what is still missing, essentials first.
pub async fn missing_data_question(
    llm: &dyn LlmProvider,
    record: &ExtractedRecord,
    timeout: Duration,
) -> String {
    if record.fields_missing.is_empty() {
        return ALL_SET.to_string();
    }

    let collected = serde_json::to_string_pretty(record).unwrap_or_default();
    let prompt = format!(
        "Você é um assistente médico que precisa coletar informações faltantes para um agendamento.\n\n\
         Dados já coletados: {collected}\n\n\
         Campos faltantes: {missing}\n\n\
         Gere perguntas amigáveis e profissionais para coletar APENAS os dados faltantes mais importantes.\n\
         Priorize: nome, tipo de agendamento (consulta/exame), especialidade, data preferencial.\n\
         Seja cordial e específico. Não pergunte tudo de uma vez.",
        missing = record.fields_missing.join(", "),
    );

    let params = CompletionParams {
        temperature: 0.4,
        max_tokens: 200,
    };
    complete_within(llm, &prompt, &params, timeout, "follow-up question")
        .await
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| NEED_MORE.to_string())
}
