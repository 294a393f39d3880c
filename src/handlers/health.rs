use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::state::AppState;

// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, AppError> {
    let sessions = state.engine.sessions().count()?;
    Ok(Json(json!({ "status": "ok", "sessions": sessions })))
}
