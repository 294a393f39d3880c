use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("failed to read flow definition: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid flow definition: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("initial state '{0}' is not defined")]
    UnknownInitialState(String),

    #[error("state '{state}' points to undefined state '{target}'")]
    UnknownTarget { state: String, target: String },

    #[error("state '{state}' has an invalid extract path '{path}' (expected section.field)")]
    InvalidFieldPath { state: String, path: String },

    #[error("state '{0}' has neither a next_state nor any transitions")]
    DeadEnd(String),

    #[error("no transition out of state '{0}' matched the message")]
    NoTransition(String),
}

/// Dotted location of a value inside the collected data (`paciente.nome`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub section: String,
    pub field: String,
}

impl FieldPath {
    pub fn parse(path: &str) -> Option<Self> {
        let (section, field) = path.split_once('.')?;
        if section.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some(Self {
            section: section.to_string(),
            field: field.to_string(),
        })
    }
}

impl std::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.section, self.field)
    }
}

/// What kind of value a state collects. Decides which local validator and which
/// option list apply to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    PatientName,
    Cpf,
    BirthDate,
    Gender,
    Phone,
    Email,
    Insurance,
    AppointmentType,
    Specialty,
    ExamName,
    Location,
    PreferredDate,
    PreferredTime,
    Confirmation,
    Other,
}

impl FieldKind {
    pub fn from_field_name(name: &str) -> Self {
        match name {
            "nome" => FieldKind::PatientName,
            "cpf" => FieldKind::Cpf,
            "data_nascimento" => FieldKind::BirthDate,
            "sexo" => FieldKind::Gender,
            "telefone" => FieldKind::Phone,
            "email" => FieldKind::Email,
            "convenio" => FieldKind::Insurance,
            "tipo" | "tipo_agendamento" => FieldKind::AppointmentType,
            "especialidade" => FieldKind::Specialty,
            "nome_exame" | "exame" => FieldKind::ExamName,
            "local" => FieldKind::Location,
            "data_preferencia" => FieldKind::PreferredDate,
            "horario_preferencia" => FieldKind::PreferredTime,
            "confirmado" | "confirmacao" => FieldKind::Confirmation,
            _ => FieldKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub path: FieldPath,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Transition {
    pub keyword: String,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct StateDef {
    pub id: String,
    pub message: String,
    pub field: Option<FieldSpec>,
    pub next_state: Option<String>,
    pub transitions: Vec<Transition>,
    pub terminal: bool,
}

impl StateDef {
    pub fn kind(&self) -> FieldKind {
        self.field.as_ref().map_or(FieldKind::Other, |f| f.kind)
    }

    /// Default next state, overridden by the first keyword found in the message.
    pub fn next_for(&self, message: &str) -> Option<&str> {
        let lower = message.to_lowercase();
        self.transitions
            .iter()
            .find(|t| lower.contains(&t.keyword.to_lowercase()))
            .map(|t| t.target.as_str())
            .or(self.next_state.as_deref())
    }
}

#[derive(Deserialize)]
struct RawFlow {
    initial_state: String,
    states: HashMap<String, RawState>,
}

#[derive(Deserialize)]
struct RawState {
    message: String,
    #[serde(default)]
    extract: Option<String>,
    #[serde(default)]
    kind: Option<FieldKind>,
    #[serde(default)]
    next_state: Option<String>,
    #[serde(default)]
    transitions: Vec<Transition>,
    #[serde(default)]
    terminal: bool,
}

/// Immutable conversation graph, validated once when loaded.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub initial_state: String,
    states: HashMap<String, StateDef>,
}

impl FlowDefinition {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FlowError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(json: &str) -> Result<Self, FlowError> {
        let raw: RawFlow = serde_json::from_str(json)?;

        let mut states = HashMap::with_capacity(raw.states.len());
        for (id, state) in raw.states {
            let field = match state.extract.as_deref().filter(|p| *p != "none") {
                Some(p) => {
                    let path = FieldPath::parse(p).ok_or_else(|| FlowError::InvalidFieldPath {
                        state: id.clone(),
                        path: p.to_string(),
                    })?;
                    let kind = state
                        .kind
                        .unwrap_or_else(|| FieldKind::from_field_name(&path.field));
                    Some(FieldSpec { path, kind })
                }
                None => None,
            };
            states.insert(
                id.clone(),
                StateDef {
                    id,
                    message: state.message,
                    field,
                    next_state: state.next_state,
                    transitions: state.transitions,
                    terminal: state.terminal,
                },
            );
        }

        let flow = Self {
            initial_state: raw.initial_state,
            states,
        };
        flow.validate()?;
        Ok(flow)
    }

    fn validate(&self) -> Result<(), FlowError> {
        if !self.states.contains_key(&self.initial_state) {
            return Err(FlowError::UnknownInitialState(self.initial_state.clone()));
        }

        for state in self.states.values() {
            let targets = state
                .next_state
                .iter()
                .chain(state.transitions.iter().map(|t| &t.target));
            for target in targets {
                if !self.states.contains_key(target) {
                    return Err(FlowError::UnknownTarget {
                        state: state.id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }

        let reachable = self.reachable();
        for id in &reachable {
            let state = &self.states[id];
            if !state.terminal && state.next_state.is_none() && state.transitions.is_empty() {
                return Err(FlowError::DeadEnd(id.clone()));
            }
        }

        for id in self.states.keys().filter(|id| !reachable.contains(*id)) {
            tracing::warn!(state = %id, "flow state is unreachable from the initial state");
        }

        Ok(())
    }

    fn reachable(&self) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([self.initial_state.clone()]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id.clone()) {
                continue;
            }
            if let Some(state) = self.states.get(&id) {
                queue.extend(state.next_state.iter().cloned());
                queue.extend(state.transitions.iter().map(|t| t.target.clone()));
            }
        }
        seen
    }

    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.states.get(id)
    }

    pub fn initial(&self) -> &StateDef {
        // validate() guarantees the initial state exists
        &self.states[&self.initial_state]
    }

    /// Every field path some state collects.
    pub fn field_paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.states
            .values()
            .filter_map(|s| s.field.as_ref().map(|f| &f.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUNDLED: &str = include_str!("../../flows/booking_flow.json");

    #[test]
    fn test_bundled_flow_is_valid() {
        let flow = FlowDefinition::from_json(BUNDLED).unwrap();
        assert_eq!(flow.initial_state, "GREETING");
        let date = flow.state("GET_PREFERRED_DATE").unwrap();
        assert_eq!(date.kind(), FieldKind::PreferredDate);
        assert!(flow.state("END").unwrap().terminal);
        assert_eq!(
            flow.state("GET_SPECIALTY").unwrap().kind(),
            FieldKind::Specialty
        );
    }

    #[test]
    fn test_keyword_transition_overrides_default() {
        let flow = FlowDefinition::from_json(BUNDLED).unwrap();
        let greeting = flow.initial();
        assert_eq!(greeting.next_for("quero marcar um EXAME"), Some("GET_EXAM_TYPE"));
        assert_eq!(greeting.next_for("uma consulta"), Some("GET_SPECIALTY"));
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let json = r#"{"initial_state":"A","states":{
            "A":{"message":"a","extract":"x.y","next_state":"B"}}}"#;
        let err = FlowDefinition::from_json(json).unwrap_err();
        assert!(matches!(err, FlowError::UnknownTarget { .. }));
    }

    #[test]
    fn test_dead_end_is_rejected() {
        let json = r#"{"initial_state":"A","states":{
            "A":{"message":"a","extract":"x.y","next_state":"B"},
            "B":{"message":"b","extract":"x.z"}}}"#;
        let err = FlowDefinition::from_json(json).unwrap_err();
        assert!(matches!(err, FlowError::DeadEnd(ref s) if s == "B"));
    }

    #[test]
    fn test_unreachable_dead_end_is_tolerated() {
        let json = r#"{"initial_state":"A","states":{
            "A":{"message":"a","next_state":"END"},
            "END":{"message":"fim","terminal":true},
            "ORPHAN":{"message":"o"}}}"#;
        assert!(FlowDefinition::from_json(json).is_ok());
    }

    #[test]
    fn test_bad_extract_path_is_rejected() {
        let json = r#"{"initial_state":"A","states":{
            "A":{"message":"a","extract":"semponto","terminal":true}}}"#;
        let err = FlowDefinition::from_json(json).unwrap_err();
        assert!(matches!(err, FlowError::InvalidFieldPath { .. }));
    }

    #[test]
    fn test_explicit_kind_wins_over_field_name() {
        let json = r#"{"initial_state":"A","states":{
            "A":{"message":"a","extract":"extra.observacao","kind":"preferred_time","next_state":"END"},
            "END":{"message":"fim","terminal":true}}}"#;
        let flow = FlowDefinition::from_json(json).unwrap();
        assert_eq!(flow.initial().kind(), FieldKind::PreferredTime);
    }
}
