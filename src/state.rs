use std::sync::{Arc, Mutex};
use std::time::Duration;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::models::FlowDefinition;
use crate::services::ai::resolver::NluResolver;
use crate::services::ai::{CompletionParams, LlmProvider};
use crate::services::catalog::SqliteCatalog;
use crate::services::conversation::ConversationEngine;
use crate::services::dates::Clock;
use crate::services::sessions::{InMemorySessionStore, SessionStore, SqliteSessionStore};

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub llm: Arc<dyn LlmProvider>,
    pub engine: ConversationEngine,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        conn: Connection,
        llm: Arc<dyn LlmProvider>,
        flow: FlowDefinition,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let db = Arc::new(Mutex::new(conn));
        let idle = chrono::Duration::minutes(config.session_idle_minutes);

        let sessions: Arc<dyn SessionStore> = match config.session_store.as_str() {
            "sqlite" => Arc::new(SqliteSessionStore::new(db.clone(), idle)),
            _ => Arc::new(InMemorySessionStore::new(config.max_sessions)),
        };
        let resolver = NluResolver::new(
            llm.clone(),
            CompletionParams {
                temperature: config.nlu_temperature,
                max_tokens: config.nlu_max_tokens,
            },
            Duration::from_secs(config.nlu_timeout_secs),
        );
        let engine = ConversationEngine::new(
            flow,
            resolver,
            Arc::new(SqliteCatalog::new(db.clone())),
            sessions,
            clock.clone(),
        );

        Self {
            db,
            config,
            llm,
            engine,
            clock,
        }
    }
}
