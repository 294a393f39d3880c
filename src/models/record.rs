use serde::{Deserialize, Serialize};

use super::lenient;
use super::session::CollectedData;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientSection {
    #[serde(default, rename = "nome", deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub cpf: Option<String>,
    #[serde(default, rename = "data_nascimento", deserialize_with = "lenient::string")]
    pub birth_date: Option<String>,
    #[serde(default, rename = "sexo", deserialize_with = "lenient::string")]
    pub gender: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppointmentSection {
    #[serde(default, rename = "tipo_agendamento", deserialize_with = "lenient::string")]
    pub appointment_type: Option<String>,
    #[serde(default, rename = "tipo_consulta", deserialize_with = "lenient::string")]
    pub consultation_type: Option<String>,
    #[serde(default, rename = "nome_exame", deserialize_with = "lenient::string")]
    pub exam_name: Option<String>,
    #[serde(default, rename = "especialidade", deserialize_with = "lenient::string")]
    pub specialty: Option<String>,
    #[serde(default, rename = "tem_convenio", deserialize_with = "lenient::flag")]
    pub has_insurance: Option<bool>,
    #[serde(default, rename = "nome_convenio", deserialize_with = "lenient::string")]
    pub insurance_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PreferenceSection {
    #[serde(default, rename = "data_preferencia", deserialize_with = "lenient::string")]
    pub date: Option<String>,
    #[serde(default, rename = "horario_preferencia", deserialize_with = "lenient::string")]
    pub time: Option<String>,
    #[serde(default, rename = "periodo_preferencia", deserialize_with = "lenient::string")]
    pub period: Option<String>,
    #[serde(default, rename = "local_preferencia", deserialize_with = "lenient::string")]
    pub location: Option<String>,
    #[serde(default, rename = "observacoes", deserialize_with = "lenient::string")]
    pub notes: Option<String>,
}

/// Structured snapshot of everything recognised in one message, or accumulated
/// across a conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExtractedRecord {
    #[serde(default, rename = "paciente")]
    pub patient: PatientSection,
    #[serde(default, rename = "agendamento_info")]
    pub appointment: AppointmentSection,
    #[serde(default, rename = "preferencias")]
    pub preferences: PreferenceSection,
    #[serde(default)]
    pub fields_present: Vec<String>,
    #[serde(default)]
    pub fields_missing: Vec<String>,
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

impl ExtractedRecord {
    /// All fields null; every known path listed as missing.
    pub fn empty() -> Self {
        let mut record = Self::default();
        record.fields_missing = record
            .field_presence()
            .into_iter()
            .map(|(path, _)| path.to_string())
            .collect();
        record
    }

    /// Every known dotted path with whether it currently holds a value.
    pub fn field_presence(&self) -> Vec<(&'static str, bool)> {
        let p = &self.patient;
        let a = &self.appointment;
        let f = &self.preferences;
        vec![
            ("paciente.nome", filled(&p.name)),
            ("paciente.cpf", filled(&p.cpf)),
            ("paciente.data_nascimento", filled(&p.birth_date)),
            ("paciente.sexo", filled(&p.gender)),
            ("agendamento.tipo_agendamento", filled(&a.appointment_type)),
            ("agendamento.tipo_consulta", filled(&a.consultation_type)),
            ("agendamento.nome_exame", filled(&a.exam_name)),
            ("agendamento.especialidade", filled(&a.specialty)),
            ("agendamento.tem_convenio", a.has_insurance.is_some()),
            ("agendamento.nome_convenio", filled(&a.insurance_name)),
            ("preferencias.data_preferencia", filled(&f.date)),
            ("preferencias.horario_preferencia", filled(&f.time)),
            ("preferencias.periodo_preferencia", filled(&f.period)),
            ("preferencias.local_preferencia", filled(&f.location)),
            ("preferencias.observacoes", filled(&f.notes)),
        ]
    }

    pub fn is_present(&self, path: &str) -> bool {
        self.field_presence()
            .into_iter()
            .any(|(known, present)| known == path && present)
    }
}

/// What the conversation hands to the appointment persistence layer once the
/// flow reaches its terminal state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub record: ExtractedRecord,
    pub phone: Option<String>,
    pub email: Option<String>,
}

pub const NOT_INFORMED: &str = "Não informado";
pub const PRIVATE_PAY: &str = "Particular";

impl BookingRequest {
    pub fn from_collected(data: &CollectedData) -> Self {
        let text = |section: &str, field: &str| -> Option<String> {
            data.get(section, field)
                .map(str::trim)
                .filter(|v| !v.is_empty() && *v != NOT_INFORMED)
                .map(str::to_string)
        };

        let insurance = text("agendamento_info", "convenio");
        let has_insurance = insurance.as_deref().map(|c| c != PRIVATE_PAY);

        let mut record = ExtractedRecord {
            patient: PatientSection {
                name: text("paciente", "nome"),
                cpf: text("paciente", "cpf"),
                birth_date: text("paciente", "data_nascimento"),
                gender: text("paciente", "sexo"),
            },
            appointment: AppointmentSection {
                appointment_type: text("agendamento_info", "tipo"),
                consultation_type: None,
                exam_name: text("agendamento_info", "nome_exame"),
                specialty: text("agendamento_info", "especialidade"),
                has_insurance,
                insurance_name: insurance.filter(|c| c != PRIVATE_PAY),
            },
            preferences: PreferenceSection {
                date: text("preferencias", "data_preferencia"),
                time: text("preferencias", "horario_preferencia"),
                period: None,
                location: text("agendamento_info", "local"),
                notes: text("preferencias", "observacoes"),
            },
            fields_present: Vec::new(),
            fields_missing: Vec::new(),
        };
        crate::services::merger::refresh_field_lists(&mut record);

        Self {
            record,
            phone: text("contato", "telefone"),
            email: text("contato", "email"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::flow::FieldPath;

    #[test]
    fn test_empty_record_lists_every_path_as_missing() {
        let record = ExtractedRecord::empty();
        assert!(record.fields_present.is_empty());
        assert_eq!(record.fields_missing.len(), 15);
    }

    #[test]
    fn test_parse_lenient_llm_output() {
        let json = r#"{
            "paciente": {"nome": "Ana", "cpf": null, "data_nascimento": "null", "sexo": "F"},
            "agendamento_info": {"tipo_agendamento": "consulta", "tem_convenio": "sim"},
            "preferencias": {}
        }"#;
        let record: ExtractedRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.patient.name.as_deref(), Some("Ana"));
        assert_eq!(record.patient.birth_date, None);
        assert_eq!(record.appointment.has_insurance, Some(true));
        assert!(record.is_present("agendamento.tipo_agendamento"));
        assert!(!record.is_present("agendamento.especialidade"));
    }

    #[test]
    fn test_booking_request_from_collected() {
        let mut data = CollectedData::default();
        let set = |d: &mut CollectedData, p: &str, v: &str| d.set(&FieldPath::parse(p).unwrap(), v);
        set(&mut data, "paciente.nome", "João Silva");
        set(&mut data, "agendamento_info.tipo", "Consulta");
        set(&mut data, "agendamento_info.especialidade", "Cardiologia");
        set(&mut data, "agendamento_info.convenio", "Particular");
        set(&mut data, "agendamento_info.local", "Hospital São Paulo");
        set(&mut data, "contato.telefone", "11987654321");
        set(&mut data, "contato.email", "Não informado");

        let request = BookingRequest::from_collected(&data);
        assert_eq!(request.record.patient.name.as_deref(), Some("João Silva"));
        assert_eq!(request.record.appointment.has_insurance, Some(false));
        assert_eq!(request.record.appointment.insurance_name, None);
        assert_eq!(request.record.preferences.location.as_deref(), Some("Hospital São Paulo"));
        assert_eq!(request.phone.as_deref(), Some("11987654321"));
        assert_eq!(request.email, None);
        assert!(request.record.fields_present.contains(&"agendamento.especialidade".to_string()));
    }
}
