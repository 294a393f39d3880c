use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::BookingRequest;
use crate::services::ai::resolver::NluStats;
use crate::services::booking;
use crate::services::conversation::TurnReply;
use crate::state::AppState;

fn session_id_or_new(id: Option<String>) -> String {
    id.map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

// POST /api/v1/chat/start
#[derive(Deserialize, Default)]
pub struct StartChat {
    #[serde(default)]
    pub session_id: Option<String>,
}

pub async fn start_chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartChat>,
) -> Result<Json<TurnReply>, AppError> {
    let session_id = session_id_or_new(payload.session_id);
    let reply = state.engine.start_session(&session_id)?;
    Ok(Json(reply))
}

// POST /api/v1/chat/message
#[derive(Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Serialize)]
pub struct ChatResponse {
    #[serde(flatten)]
    pub reply: TurnReply,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
}

pub async fn send_message(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatMessage>,
) -> Result<Json<ChatResponse>, AppError> {
    let message = payload.message.trim();
    if message.is_empty() {
        return Err(AppError::BadRequest("message is required".to_string()));
    }
    let session_id = session_id_or_new(payload.session_id);

    let reply = state.engine.process_message(&session_id, message).await?;
    let appointment_id = match &reply.completed {
        Some(request) => hand_off(&state, &session_id, request),
        None => None,
    };

    Ok(Json(ChatResponse {
        reply,
        appointment_id,
    }))
}

/// Persists a finished conversation. Failures are logged; the patient already
/// got their confirmation message.
fn hand_off(state: &AppState, session_id: &str, request: &BookingRequest) -> Option<String> {
    let result = state
        .db
        .lock()
        .map_err(|_| anyhow::anyhow!("database mutex poisoned"))
        .and_then(|conn| booking::create_appointment(&conn, request, state.clock.today()));

    match result {
        Ok(appointment) => {
            tracing::info!(session = %session_id, appointment = %appointment.id, "booking handed off");
            Some(appointment.id)
        }
        Err(e) => {
            tracing::error!(session = %session_id, error = %e, "failed to persist booking");
            None
        }
    }
}

// GET /api/v1/chat/stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<NluStats> {
    Json(state.engine.resolver_stats())
}
