use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use super::flow::FieldPath;
use super::record::ExtractedRecord;

/// Values gathered so far, keyed by section then field (`paciente` -> `nome`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct CollectedData(BTreeMap<String, BTreeMap<String, String>>);

impl CollectedData {
    pub fn get(&self, section: &str, field: &str) -> Option<&str> {
        self.0
            .get(section)
            .and_then(|s| s.get(field))
            .map(String::as_str)
    }

    pub fn get_path(&self, path: &FieldPath) -> Option<&str> {
        self.get(&path.section, &path.field)
    }

    pub fn set(&mut self, path: &FieldPath, value: impl Into<String>) {
        self.0
            .entry(path.section.clone())
            .or_default()
            .insert(path.field.clone(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.values().all(BTreeMap::is_empty)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub current_state: String,
    pub collected: CollectedData,
    /// Accumulated result of full-message extractions for this session.
    #[serde(default)]
    pub extracted: ExtractedRecord,
    pub last_activity: NaiveDateTime,
}

impl Session {
    pub fn new(id: &str, initial_state: &str) -> Self {
        Self {
            id: id.to_string(),
            current_state: initial_state.to_string(),
            collected: CollectedData::default(),
            extracted: ExtractedRecord::empty(),
            last_activity: Utc::now().naive_utc(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now().naive_utc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_nested_values() {
        let mut data = CollectedData::default();
        assert!(data.is_empty());
        data.set(&FieldPath::parse("paciente.nome").unwrap(), "Maria");
        assert_eq!(data.get("paciente", "nome"), Some("Maria"));
        assert_eq!(data.get("paciente", "cpf"), None);

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["paciente"]["nome"], "Maria");
    }
}
