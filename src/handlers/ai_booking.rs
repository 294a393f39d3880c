use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{BookingRequest, ExtractedRecord, Session};
use crate::services::ai::extractor::{extract_record, missing_data_question};
use crate::services::booking;
use crate::services::merger::{merge_records, refresh_field_lists, validate_essential, EssentialCheck};
use crate::state::AppState;

// POST /api/v1/ai-booking/process-message
#[derive(Deserialize)]
pub struct ProcessMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ProcessResponse {
    pub session_id: String,
    pub extracted_data: ExtractedRecord,
    pub validation: EssentialCheck,
    pub can_proceed: bool,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_question: Option<String>,
}

pub async fn process_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ProcessMessage>,
) -> Result<Json<ProcessResponse>, AppError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }
    let session_id = payload
        .session_id
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let timeout = Duration::from_secs(state.config.nlu_timeout_secs);
    let extracted = extract_record(state.llm.as_ref(), message, timeout).await;

    let sessions = state.engine.sessions();
    let mut session = sessions
        .get(&session_id)?
        .unwrap_or_else(|| Session::new(&session_id, &state.engine.flow().initial_state));
    session.extracted = merge_records(&session.extracted, &extracted);
    session.touch();
    sessions.put(&session)?;

    let validation = validate_essential(&session.extracted);
    let next_question = if validation.is_valid {
        None
    } else {
        Some(missing_data_question(state.llm.as_ref(), &session.extracted, timeout).await)
    };

    Ok(Json(ProcessResponse {
        session_id,
        can_proceed: validation.is_valid,
        status: if validation.is_valid {
            "ready_to_book"
        } else {
            "need_more_info"
        },
        extracted_data: session.extracted,
        validation,
        next_question,
    }))
}

// POST /api/v1/ai-booking/create-from-ai
#[derive(Deserialize)]
pub struct CreateFromAi {
    pub extracted_data: ExtractedRecord,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Serialize)]
pub struct CreateResponse {
    pub appointment_id: String,
    pub patient_id: String,
    pub starts_at: String,
}

pub async fn create_from_ai(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateFromAi>,
) -> Result<Json<CreateResponse>, AppError> {
    let mut record = payload.extracted_data;
    refresh_field_lists(&mut record);

    let validation = validate_essential(&record);
    if !validation.is_valid {
        return Err(AppError::InsufficientData(validation.missing_essential));
    }

    let request = BookingRequest {
        record,
        phone: payload.phone,
        email: payload.email,
    };
    let appointment = {
        let conn = state
            .db
            .lock()
            .map_err(|_| anyhow::anyhow!("database mutex poisoned"))?;
        booking::create_appointment(&conn, &request, state.clock.today())?
    };

    Ok(Json(CreateResponse {
        appointment_id: appointment.id,
        patient_id: appointment.patient_id,
        starts_at: appointment.starts_at.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }))
}
