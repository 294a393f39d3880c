use chrono::{Duration, NaiveDate, NaiveTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::queries;
use crate::models::{Appointment, BookingRequest, Patient, STATUS_SCHEDULED};
use crate::services::text::{digits, fold};

const DEFAULT_HOUR: u32 = 9;

/// Finds or registers the patient and stores the appointment described by `request`.
pub fn create_appointment(
    conn: &Connection,
    request: &BookingRequest,
    today: NaiveDate,
) -> anyhow::Result<Appointment> {
    let patient = find_or_create_patient(conn, request)?;
    let record = &request.record;
    let prefs = &record.preferences;

    let date = prefs
        .date
        .as_deref()
        .and_then(parse_booking_date)
        .unwrap_or(today + Duration::days(1));
    let time = prefs
        .time
        .as_deref()
        .and_then(parse_booking_time)
        .unwrap_or_else(default_time);

    let kind = record
        .appointment
        .appointment_type
        .as_deref()
        .map(fold)
        .filter(|t| t.contains("exame"))
        .map_or("consulta", |_| "exame");

    let insurance = match (record.appointment.has_insurance, &record.appointment.insurance_name) {
        (Some(true), Some(name)) => Some(name.clone()),
        (Some(false), _) => Some("Particular".to_string()),
        (_, name) => name.clone(),
    };

    let appointment = Appointment {
        id: Uuid::new_v4().to_string(),
        patient_id: patient.id.clone(),
        kind: kind.to_string(),
        specialty: record.appointment.specialty.clone(),
        exam: record.appointment.exam_name.clone(),
        location: prefs.location.clone(),
        starts_at: date.and_time(time),
        preferred_time: prefs.time.clone(),
        insurance,
        status: STATUS_SCHEDULED.to_string(),
        notes: prefs.notes.clone(),
        created_at: Utc::now().naive_utc(),
    };
    queries::create_appointment(conn, &appointment)?;

    tracing::info!(
        appointment = %appointment.id,
        patient = %patient.id,
        starts_at = %appointment.starts_at,
        "appointment created"
    );
    Ok(appointment)
}

fn find_or_create_patient(conn: &Connection, request: &BookingRequest) -> anyhow::Result<Patient> {
    let section = &request.record.patient;
    let cpf = section
        .cpf
        .as_deref()
        .map(digits)
        .filter(|d| !d.is_empty());

    if let Some(cpf) = cpf.as_deref() {
        if let Some(existing) = queries::find_patient_by_cpf(conn, cpf)? {
            return Ok(existing);
        }
    }

    let name = section
        .name
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("patient name is required to book an appointment"))?;
    if let Some(existing) = queries::find_patient_by_name(conn, name)? {
        return Ok(existing);
    }

    let patient = Patient {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        cpf,
        birth_date: section.birth_date.clone(),
        gender: section.gender.clone(),
        phone: request.phone.clone(),
        email: request.email.clone(),
        created_at: Utc::now().naive_utc(),
    };
    queries::create_patient(conn, &patient)?;
    tracing::info!(patient = %patient.id, "registered new patient");
    Ok(patient)
}

fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(DEFAULT_HOUR, 0, 0).unwrap_or(NaiveTime::MIN)
}

/// Accepts `YYYY-MM-DD` (what the flow stores) and `DD/MM/YYYY` (what extraction returns).
fn parse_booking_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
}

fn parse_booking_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim().to_lowercase();
    NaiveTime::parse_from_str(&raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(&raw, "%Hh%M"))
        .ok()
        .or_else(|| {
            let hour: u32 = raw.strip_suffix('h')?.parse().ok()?;
            NaiveTime::from_hms_opt(hour, 0, 0)
        })
}
