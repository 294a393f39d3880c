use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub cpf: Option<String>,
    pub birth_date: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub kind: String,
    pub specialty: Option<String>,
    pub exam: Option<String>,
    pub location: Option<String>,
    pub starts_at: NaiveDateTime,
    pub preferred_time: Option<String>,
    pub insurance: Option<String>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Status written for every appointment created by the chat flows.
pub const STATUS_SCHEDULED: &str = "scheduled";
