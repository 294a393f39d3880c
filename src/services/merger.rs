use serde::Serialize;

use crate::models::record::{AppointmentSection, PatientSection, PreferenceSection};
use crate::models::ExtractedRecord;

/// Fields whose absence blocks booking.
pub const ESSENTIAL_FIELDS: &[&str] = &[
    "paciente.nome",
    "agendamento.tipo_agendamento",
    "agendamento.especialidade",
];

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EssentialCheck {
    pub is_valid: bool,
    pub missing_essential: Vec<String>,
    pub can_proceed: bool,
    pub completion_percentage: f64,
}

fn pick(old: &Option<String>, new: &Option<String>) -> Option<String> {
    match new {
        Some(v) if !v.trim().is_empty() => Some(v.clone()),
        _ => old.clone(),
    }
}

fn pick_flag(old: Option<bool>, new: Option<bool>) -> Option<bool> {
    new.or(old)
}

/// Field-by-field merge where a later turn's silence never erases a known value.
pub fn merge_records(previous: &ExtractedRecord, new: &ExtractedRecord) -> ExtractedRecord {
    let (op, np) = (&previous.patient, &new.patient);
    let (oa, na) = (&previous.appointment, &new.appointment);
    let (of, nf) = (&previous.preferences, &new.preferences);

    let mut merged = ExtractedRecord {
        patient: PatientSection {
            name: pick(&op.name, &np.name),
            cpf: pick(&op.cpf, &np.cpf),
            birth_date: pick(&op.birth_date, &np.birth_date),
            gender: pick(&op.gender, &np.gender),
        },
        appointment: AppointmentSection {
            appointment_type: pick(&oa.appointment_type, &na.appointment_type),
            consultation_type: pick(&oa.consultation_type, &na.consultation_type),
            exam_name: pick(&oa.exam_name, &na.exam_name),
            specialty: pick(&oa.specialty, &na.specialty),
            has_insurance: pick_flag(oa.has_insurance, na.has_insurance),
            insurance_name: pick(&oa.insurance_name, &na.insurance_name),
        },
        preferences: PreferenceSection {
            date: pick(&of.date, &nf.date),
            time: pick(&of.time, &nf.time),
            period: pick(&of.period, &nf.period),
            location: pick(&of.location, &nf.location),
            notes: pick(&of.notes, &nf.notes),
        },
        fields_present: Vec::new(),
        fields_missing: Vec::new(),
    };
    refresh_field_lists(&mut merged);
    merged
}

/// Rebuilds `fields_present` / `fields_missing` from the record's values.
pub fn refresh_field_lists(record: &mut ExtractedRecord) {
    let (present, missing): (Vec<_>, Vec<_>) = record
        .field_presence()
        .into_iter()
        .partition(|(_, present)| *present);
    record.fields_present = present.into_iter().map(|(p, _)| p.to_string()).collect();
    record.fields_missing = missing.into_iter().map(|(p, _)| p.to_string()).collect();
}

/// `can_proceed` tolerates exactly one missing essential field so the
/// conversation is not blocked on a single gap.
pub fn validate_essential(record: &ExtractedRecord) -> EssentialCheck {
    let missing_essential: Vec<String> = ESSENTIAL_FIELDS
        .iter()
        .filter(|path| !record.is_present(path))
        .map(|path| path.to_string())
        .collect();

    let total = ESSENTIAL_FIELDS.len();
    let present = total - missing_essential.len();
    EssentialCheck {
        is_valid: missing_essential.is_empty(),
        can_proceed: missing_essential.len() <= 1,
        completion_percentage: present as f64 / total as f64 * 100.0,
        missing_essential,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn full_record() -> ExtractedRecord {
        let mut record = ExtractedRecord {
            patient: PatientSection {
                name: s("Ana Souza"),
                cpf: s("12345678909"),
                birth_date: s("01/02/1990"),
                gender: s("F"),
            },
            appointment: AppointmentSection {
                appointment_type: s("consulta"),
                consultation_type: s("Retorno"),
                exam_name: s("Eletrocardiograma"),
                specialty: s("Cardiologia"),
                has_insurance: Some(true),
                insurance_name: s("Unimed"),
            },
            preferences: PreferenceSection {
                date: s("15/03/2026"),
                time: s("14:00"),
                period: s("tarde"),
                location: s("Hospital São Paulo"),
                notes: s("dor no peito"),
            },
            fields_present: vec![],
            fields_missing: vec![],
        };
        refresh_field_lists(&mut record);
        record
    }

    #[test]
    fn test_silence_never_erases_known_values() {
        let previous = full_record();
        let merged = merge_records(&previous, &ExtractedRecord::empty());
        assert_eq!(merged, previous);
        assert!(merged.fields_missing.is_empty());
        assert_eq!(merged.fields_present.len(), 15);
    }

    #[test]
    fn test_new_values_overwrite_and_blanks_do_not() {
        let previous = full_record();
        let mut update = ExtractedRecord::empty();
        update.patient.name = s("Ana Paula Souza");
        update.preferences.time = s("   ");
        update.appointment.has_insurance = Some(false);

        let merged = merge_records(&previous, &update);
        assert_eq!(merged.patient.name.as_deref(), Some("Ana Paula Souza"));
        assert_eq!(merged.preferences.time.as_deref(), Some("14:00"));
        assert_eq!(merged.appointment.has_insurance, Some(false));
    }

    #[test]
    fn test_every_path_in_exactly_one_list() {
        let mut partial = ExtractedRecord::empty();
        partial.patient.name = s("Ana");
        partial.appointment.has_insurance = Some(false);
        let merged = merge_records(&ExtractedRecord::empty(), &partial);

        assert_eq!(merged.fields_present, vec!["paciente.nome", "agendamento.tem_convenio"]);
        assert_eq!(merged.fields_present.len() + merged.fields_missing.len(), 15);
        for path in &merged.fields_present {
            assert!(!merged.fields_missing.contains(path));
        }
    }

    #[test]
    fn test_one_missing_essential_can_proceed() {
        let mut record = ExtractedRecord::empty();
        record.patient.name = s("Ana");
        record.appointment.appointment_type = s("consulta");

        let check = validate_essential(&record);
        assert!(!check.is_valid);
        assert_eq!(check.missing_essential, vec!["agendamento.especialidade"]);
        assert!(check.can_proceed);
        assert!((check.completion_percentage - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_missing_essentials_block() {
        let mut record = ExtractedRecord::empty();
        record.patient.name = s("Ana");

        let check = validate_essential(&record);
        assert_eq!(check.missing_essential.len(), 2);
        assert!(!check.can_proceed);
    }

    #[test]
    fn test_complete_essentials() {
        let check = validate_essential(&full_record());
        assert!(check.is_valid);
        assert!(check.can_proceed);
        assert_eq!(check.completion_percentage, 100.0);
    }
}
