use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{
    Appointment, CollectedData, ExtractedRecord, Location, Patient, Session,
};

const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn format_ts(ts: &NaiveDateTime) -> String {
    ts.format(TS_FORMAT).to_string()
}

fn parse_ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, TS_FORMAT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Sessions ──

pub fn get_session(conn: &Connection, id: &str) -> anyhow::Result<Option<Session>> {
    let now = format_ts(&Utc::now().naive_utc());
    let row = conn
        .query_row(
            "SELECT id, state, data, last_activity FROM sessions WHERE id = ?1 AND expires_at > ?2",
            params![id, now],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((id, state, data_json, last_activity)) = row else {
        return Ok(None);
    };

    let data: serde_json::Value =
        serde_json::from_str(&data_json).unwrap_or(serde_json::json!({}));
    let collected: CollectedData = data
        .get("collected")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    let extracted: ExtractedRecord = data
        .get("extracted")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_else(ExtractedRecord::empty);

    Ok(Some(Session {
        id,
        current_state: state,
        collected,
        extracted,
        last_activity: parse_ts(&last_activity),
    }))
}

pub fn save_session(
    conn: &Connection,
    session: &Session,
    expires_at: &NaiveDateTime,
) -> anyhow::Result<()> {
    let data = serde_json::json!({
        "collected": session.collected,
        "extracted": session.extracted,
    });
    conn.execute(
        "INSERT INTO sessions (id, state, data, last_activity, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
            state = excluded.state,
            data = excluded.data,
            last_activity = excluded.last_activity,
            expires_at = excluded.expires_at",
        params![
            session.id,
            session.current_state,
            serde_json::to_string(&data)?,
            format_ts(&session.last_activity),
            format_ts(expires_at),
        ],
    )?;
    Ok(())
}

pub fn expire_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let now = format_ts(&Utc::now().naive_utc());
    let count = conn.execute("DELETE FROM sessions WHERE expires_at <= ?1", [now])?;
    Ok(count)
}

pub fn count_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
    Ok(count as usize)
}

// ── Catalog ──

fn row_to_location(row: &Row) -> rusqlite::Result<Location> {
    Ok(Location {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
    })
}

fn collect_names(conn: &Connection, sql: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let names = stmt
        .query_map([], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn list_specialties(conn: &Connection) -> anyhow::Result<Vec<String>> {
    collect_names(conn, "SELECT name FROM specialties ORDER BY id")
}

pub fn list_exams(conn: &Connection) -> anyhow::Result<Vec<String>> {
    collect_names(conn, "SELECT name FROM exams ORDER BY id")
}

pub fn list_locations(conn: &Connection) -> anyhow::Result<Vec<Location>> {
    let mut stmt = conn.prepare("SELECT id, name, address FROM locations ORDER BY id")?;
    let locations = stmt
        .query_map([], row_to_location)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(locations)
}

pub fn list_locations_for_specialty(
    conn: &Connection,
    specialty: &str,
) -> anyhow::Result<Vec<Location>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.name, l.address FROM locations l
         JOIN location_specialties ls ON ls.location_id = l.id
         JOIN specialties s ON s.id = ls.specialty_id
         WHERE s.name = ?1 COLLATE NOCASE
         ORDER BY l.id",
    )?;
    let locations = stmt
        .query_map([specialty], row_to_location)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(locations)
}

pub fn list_locations_for_exam(conn: &Connection, exam: &str) -> anyhow::Result<Vec<Location>> {
    let mut stmt = conn.prepare(
        "SELECT l.id, l.name, l.address FROM locations l
         JOIN exam_locations el ON el.location_id = l.id
         JOIN exams e ON e.id = el.exam_id
         WHERE e.name = ?1 COLLATE NOCASE
         ORDER BY l.id",
    )?;
    let locations = stmt
        .query_map([exam], row_to_location)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(locations)
}

// ── Patients ──

const PATIENT_COLUMNS: &str = "id, name, cpf, birth_date, gender, phone, email, created_at";

fn row_to_patient(row: &Row) -> rusqlite::Result<Patient> {
    let created_at: String = row.get(7)?;
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        cpf: row.get(2)?,
        birth_date: row.get(3)?,
        gender: row.get(4)?,
        phone: row.get(5)?,
        email: row.get(6)?,
        created_at: parse_ts(&created_at),
    })
}

pub fn find_patient_by_cpf(conn: &Connection, cpf: &str) -> anyhow::Result<Option<Patient>> {
    let sql = format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE cpf = ?1 LIMIT 1");
    Ok(conn.query_row(&sql, [cpf], row_to_patient).optional()?)
}

pub fn find_patient_by_name(conn: &Connection, name: &str) -> anyhow::Result<Option<Patient>> {
    let sql = format!(
        "SELECT {PATIENT_COLUMNS} FROM patients WHERE name = ?1 COLLATE NOCASE ORDER BY created_at LIMIT 1"
    );
    Ok(conn.query_row(&sql, [name], row_to_patient).optional()?)
}

pub fn create_patient(conn: &Connection, patient: &Patient) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO patients (id, name, cpf, birth_date, gender, phone, email, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            patient.id,
            patient.name,
            patient.cpf,
            patient.birth_date,
            patient.gender,
            patient.phone,
            patient.email,
            format_ts(&patient.created_at),
        ],
    )?;
    Ok(())
}

// ── Appointments ──

const APPOINTMENT_COLUMNS: &str = "id, patient_id, kind, specialty, exam, location, starts_at, \
     preferred_time, insurance, status, notes, created_at";

fn row_to_appointment(row: &Row) -> rusqlite::Result<Appointment> {
    let starts_at: String = row.get(6)?;
    let created_at: String = row.get(11)?;
    Ok(Appointment {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        kind: row.get(2)?,
        specialty: row.get(3)?,
        exam: row.get(4)?,
        location: row.get(5)?,
        starts_at: parse_ts(&starts_at),
        preferred_time: row.get(7)?,
        insurance: row.get(8)?,
        status: row.get(9)?,
        notes: row.get(10)?,
        created_at: parse_ts(&created_at),
    })
}

pub fn create_appointment(conn: &Connection, appointment: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, patient_id, kind, specialty, exam, location, starts_at,
            preferred_time, insurance, status, notes, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            appointment.id,
            appointment.patient_id,
            appointment.kind,
            appointment.specialty,
            appointment.exam,
            appointment.location,
            format_ts(&appointment.starts_at),
            appointment.preferred_time,
            appointment.insurance,
            appointment.status,
            appointment.notes,
            format_ts(&appointment.created_at),
        ],
    )?;
    Ok(())
}

pub fn get_appointment(conn: &Connection, id: &str) -> anyhow::Result<Option<Appointment>> {
    let sql = format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1");
    Ok(conn.query_row(&sql, [id], row_to_appointment).optional()?)
}

pub fn list_appointments_for_patient(
    conn: &Connection,
    patient_id: &str,
) -> anyhow::Result<Vec<Appointment>> {
    let sql = format!(
        "SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE patient_id = ?1 ORDER BY starts_at"
    );
    let mut stmt = conn.prepare(&sql)?;
    let appointments = stmt
        .query_map([patient_id], row_to_appointment)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(appointments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use chrono::Duration;

    #[test]
    fn test_session_roundtrip_and_expiry() {
        let conn = init_db(":memory:").unwrap();
        let mut session = Session::new("abc", "GREETING");
        session.current_state = "GET_NAME".to_string();

        let later = Utc::now().naive_utc() + Duration::minutes(30);
        save_session(&conn, &session, &later).unwrap();
        let loaded = get_session(&conn, "abc").unwrap().unwrap();
        assert_eq!(loaded.current_state, "GET_NAME");

        let earlier = Utc::now().naive_utc() - Duration::minutes(1);
        save_session(&conn, &session, &earlier).unwrap();
        assert!(get_session(&conn, "abc").unwrap().is_none());
        assert_eq!(expire_sessions(&conn).unwrap(), 1);
        assert_eq!(count_sessions(&conn).unwrap(), 0);
    }

    #[test]
    fn test_catalog_joins() {
        let conn = init_db(":memory:").unwrap();
        let cardio: Vec<String> = list_locations_for_specialty(&conn, "cardiologia")
            .unwrap()
            .into_iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(
            cardio,
            vec!["Hospital São Paulo", "Clínica CardioVida", "Centro Médico Central"]
        );
        assert!(list_locations_for_exam(&conn, "Mamografia")
            .unwrap()
            .iter()
            .any(|l| l.name == "Clínica da Mulher"));
        assert!(list_locations_for_specialty(&conn, "Astrologia")
            .unwrap()
            .is_empty());
    }
}
