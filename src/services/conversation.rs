use std::sync::Arc;

use serde::Serialize;

use crate::models::record::NOT_INFORMED;
use crate::models::{
    BookingRequest, CollectedData, FieldKind, FieldPath, FlowDefinition, FlowError, NluIntent,
    Session, StateDef,
};
use crate::services::ai::resolver::{NluResolver, NluStats};
use crate::services::catalog::{self, MedicalCatalog};
use crate::services::dates::{validate_appointment_date, Clock};
use crate::services::sessions::SessionStore;
use crate::services::template;
use crate::services::text::fold;

const NOT_UNDERSTOOD: &str = "Desculpe, não entendi. Pode repetir?";
const CONFIRMATION_FALLBACK: &str =
    "Por favor, confira se os dados informados estão corretos. Está tudo certo? (sim/não)";
const CLOSING_FALLBACK: &str = "Agendamento confirmado! Obrigado por usar nosso sistema!";

/// What one turn produced for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct TurnReply {
    pub session_id: String,
    pub next_question: String,
    pub current_state: String,
    pub conversation_data: CollectedData,
    /// Set on the turn that reaches the terminal state.
    #[serde(skip)]
    pub completed: Option<BookingRequest>,
}

struct Turn {
    message: String,
    completed: Option<BookingRequest>,
}

impl Turn {
    fn stay(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            completed: None,
        }
    }
}

/// Drives sessions through the flow graph, one message at a time.
pub struct ConversationEngine {
    flow: FlowDefinition,
    resolver: NluResolver,
    catalog: Arc<dyn MedicalCatalog>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
}

impl ConversationEngine {
    pub fn new(
        flow: FlowDefinition,
        resolver: NluResolver,
        catalog: Arc<dyn MedicalCatalog>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            flow,
            resolver,
            catalog,
            sessions,
            clock,
        }
    }

    pub fn flow(&self) -> &FlowDefinition {
        &self.flow
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn resolver_stats(&self) -> NluStats {
        self.resolver.stats()
    }

    /// Creates (or resets) a session and returns the opening prompt.
    pub fn start_session(&self, session_id: &str) -> anyhow::Result<TurnReply> {
        let session = Session::new(session_id, &self.flow.initial_state);
        self.sessions.put(&session)?;
        tracing::info!(session = %session_id, "session started");
        let greeting = self.prompt_for(self.flow.initial(), &session.collected);
        Ok(Self::reply(&session, greeting, None))
    }

    pub async fn process_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> anyhow::Result<TurnReply> {
        let Some(mut session) = self.sessions.get(session_id)? else {
            return self.start_session(session_id);
        };

        let state = match self.flow.state(&session.current_state) {
            Some(state) if !state.terminal => state,
            Some(_) => {
                tracing::info!(session = %session_id, "message after completion, restarting flow");
                return self.start_session(session_id);
            }
            None => {
                tracing::warn!(
                    session = %session_id,
                    state = %session.current_state,
                    "session points at an unknown state, restarting flow"
                );
                return self.start_session(session_id);
            }
        };

        let turn = self.advance(state, &mut session, message).await;
        session.touch();
        self.sessions.put(&session)?;

        Ok(Self::reply(&session, turn.message, turn.completed))
    }

    fn reply(session: &Session, message: String, completed: Option<BookingRequest>) -> TurnReply {
        TurnReply {
            session_id: session.id.clone(),
            next_question: message,
            current_state: session.current_state.clone(),
            conversation_data: session.collected.clone(),
            completed,
        }
    }

    async fn advance(&self, state: &StateDef, session: &mut Session, message: &str) -> Turn {
        let Some(field) = state.field.as_ref() else {
            return self.follow(state, session, message);
        };

        if field.kind == FieldKind::PreferredDate {
            return match validate_appointment_date(message, self.clock.today()) {
                Ok(date) => match state.next_state.as_deref() {
                    Some(next) => {
                        session
                            .collected
                            .set(&field.path, date.format("%Y-%m-%d").to_string());
                        self.enter(session, next)
                    }
                    None => self.no_transition(state),
                },
                Err(rejection) => {
                    tracing::debug!(session = %session.id, %rejection, "appointment date rejected");
                    Turn::stay(rejection.to_string())
                }
            };
        }

        let options = catalog::options_for(field.kind, self.catalog.as_ref(), &session.collected);
        let result = self
            .resolver
            .resolve(&state.message, message, field, &options)
            .await;

        if result.intent == NluIntent::AskQuestion {
            return Turn::stay(self.help_for(state, &session.collected));
        }
        if !result.is_valid {
            return Turn::stay(
                result
                    .error
                    .unwrap_or_else(|| NOT_UNDERSTOOD.to_string()),
            );
        }

        let value = result.value.unwrap_or_else(|| message.trim().to_string());
        // A confirmation is routed by what it was understood as, not by its wording.
        let route = if field.kind == FieldKind::Confirmation {
            value.as_str()
        } else {
            message
        };
        let Some(next) = state.next_for(route) else {
            return self.no_transition(state);
        };
        session.collected.set(&field.path, value);
        self.enter(session, next)
    }

    fn follow(&self, state: &StateDef, session: &mut Session, message: &str) -> Turn {
        match state.next_for(message) {
            Some(next) => self.enter(session, next),
            None => self.no_transition(state),
        }
    }

    fn no_transition(&self, state: &StateDef) -> Turn {
        let err = FlowError::NoTransition(state.id.clone());
        tracing::error!(error = %err, "flow configuration defect");
        Turn::stay(NOT_UNDERSTOOD)
    }

    fn enter(&self, session: &mut Session, next: &str) -> Turn {
        let Some(state) = self.flow.state(next) else {
            // Targets are checked when the flow loads.
            tracing::error!(state = %next, "transition to undefined state");
            return Turn::stay(NOT_UNDERSTOOD);
        };

        tracing::info!(
            session = %session.id,
            from = %session.current_state,
            to = %state.id,
            "flow transition"
        );
        session.current_state = state.id.clone();

        let message = self.prompt_for(state, &session.collected);
        let completed = state
            .terminal
            .then(|| BookingRequest::from_collected(&session.collected));
        Turn { message, completed }
    }

    /// The state's prompt, with live catalog lists appended or collected values
    /// filled in.
    fn prompt_for(&self, state: &StateDef, collected: &CollectedData) -> String {
        if state.message.contains('{') {
            return self.render_summary(state, collected);
        }

        match state.kind() {
            FieldKind::Specialty => format!(
                "{}\n\nEspecialidades disponíveis:\n{}",
                state.message,
                bullet_list(&self.catalog.list_specialties())
            ),
            FieldKind::ExamName => format!(
                "{}\n\nExames disponíveis:\n{}",
                state.message,
                bullet_list(&self.catalog.list_exams())
            ),
            FieldKind::Location => format!(
                "{}\n\nLocais disponíveis:\n{}",
                state.message,
                self.location_lines(collected)
            ),
            _ => state.message.clone(),
        }
    }

    fn help_for(&self, state: &StateDef, collected: &CollectedData) -> String {
        match state.kind() {
            FieldKind::Specialty => format!(
                "Temos as seguintes especialidades disponíveis:\n{}\n\nQual você prefere?",
                bullet_list(&self.catalog.list_specialties())
            ),
            FieldKind::ExamName => format!(
                "Estes são os exames que realizamos:\n{}\n\nQual você precisa fazer?",
                bullet_list(&self.catalog.list_exams())
            ),
            FieldKind::Location => {
                let scope = collected
                    .get("agendamento_info", "especialidade")
                    .map(|s| format!(" para {s}"))
                    .unwrap_or_default();
                format!(
                    "Locais disponíveis{scope}:\n{}\n\nQual você prefere?",
                    self.location_lines(collected)
                )
            }
            FieldKind::AppointmentType => format!(
                "Você pode agendar uma consulta com um especialista ou um exame.\n{}",
                state.message
            ),
            FieldKind::Gender => {
                "Você pode responder masculino, feminino ou outro.".to_string()
            }
            _ => format!("Claro, posso ajudar. {}", state.message),
        }
    }

    fn location_lines(&self, collected: &CollectedData) -> String {
        let names: Vec<String> = catalog::locations_for(self.catalog.as_ref(), collected)
            .into_iter()
            .map(|l| match l.address {
                Some(address) => format!("{} ({address})", l.name),
                None => l.name,
            })
            .collect();
        bullet_list(&names)
    }

    fn render_summary(&self, state: &StateDef, collected: &CollectedData) -> String {
        let known: Vec<&FieldPath> = self.flow.field_paths().collect();
        let lookup = |name: &str| -> Option<String> {
            if let Some(path) = FieldPath::parse(name).filter(|p| known.contains(&p)) {
                return Some(display_value(collected.get_path(&path)));
            }
            derived_value(name, collected)
        };

        match template::render(&state.message, lookup) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(state = %state.id, error = %e, "failed to render state message");
                if state.terminal {
                    CLOSING_FALLBACK.to_string()
                } else {
                    CONFIRMATION_FALLBACK.to_string()
                }
            }
        }
    }
}

fn display_value(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(NOT_INFORMED)
        .to_string()
}

/// Placeholders computed from several collected values.
fn derived_value(name: &str, collected: &CollectedData) -> Option<String> {
    let is_exam = collected
        .get("agendamento_info", "tipo")
        .is_some_and(|t| fold(t).contains("exame"));
    match name {
        "especialidade_ou_exame" => {
            let label = if is_exam { "Exame" } else { "Especialidade" };
            Some(label.to_string())
        }
        "servico" => {
            let field = if is_exam { "nome_exame" } else { "especialidade" };
            Some(display_value(collected.get("agendamento_info", field)))
        }
        "email_confirmation" => Some(
            collected
                .get("contato", "email")
                .map(str::trim)
                .filter(|e| !e.is_empty() && *e != NOT_INFORMED)
                .map(|e| format!(" e no e-mail {e}"))
                .unwrap_or_default(),
        ),
        _ => None,
    }
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("• {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}
