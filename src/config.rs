use std::env;
use std::str::FromStr;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub flow_path: String,
    pub llm_provider: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub nlu_timeout_secs: u64,
    pub nlu_temperature: f32,
    pub nlu_max_tokens: u32,
    pub session_store: String,
    pub session_idle_minutes: i64,
    pub max_sessions: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            database_url: "medbook.db".to_string(),
            flow_path: "flows/booking_flow.json".to_string(),
            llm_provider: "gemini".to_string(),
            gemini_api_key: String::new(),
            gemini_model: "gemini-1.5-flash".to_string(),
            groq_api_key: String::new(),
            groq_model: "llama-3.1-8b-instant".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            ollama_model: "llama3.2".to_string(),
            nlu_timeout_secs: 5,
            nlu_temperature: 0.1,
            nlu_max_tokens: 200,
            session_store: "memory".to_string(),
            session_idle_minutes: 60,
            max_sessions: 10_000,
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn string(key: &str, default: String) -> String {
    env::var(key).unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            port: parsed("PORT", d.port),
            database_url: string("DATABASE_URL", d.database_url),
            flow_path: string("FLOW_PATH", d.flow_path),
            llm_provider: string("LLM_PROVIDER", d.llm_provider).to_lowercase(),
            gemini_api_key: string("GEMINI_API_KEY", d.gemini_api_key),
            gemini_model: string("GEMINI_MODEL", d.gemini_model),
            groq_api_key: string("GROQ_API_KEY", d.groq_api_key),
            groq_model: string("GROQ_MODEL", d.groq_model),
            ollama_url: string("OLLAMA_URL", d.ollama_url),
            ollama_model: string("OLLAMA_MODEL", d.ollama_model),
            nlu_timeout_secs: parsed("NLU_TIMEOUT_SECS", d.nlu_timeout_secs),
            nlu_temperature: parsed("NLU_TEMPERATURE", d.nlu_temperature),
            nlu_max_tokens: parsed("NLU_MAX_TOKENS", d.nlu_max_tokens),
            session_store: string("SESSION_STORE", d.session_store).to_lowercase(),
            session_idle_minutes: parsed("SESSION_IDLE_MINUTES", d.session_idle_minutes),
            max_sessions: parsed("MAX_SESSIONS", d.max_sessions),
        }
    }
}
