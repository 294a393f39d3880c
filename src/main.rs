use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use medbook::config::AppConfig;
use medbook::db;
use medbook::handlers;
use medbook::models::FlowDefinition;
use medbook::services::ai::gemini::GeminiProvider;
use medbook::services::ai::groq::GroqProvider;
use medbook::services::ai::ollama::OllamaProvider;
use medbook::services::ai::LlmProvider;
use medbook::services::dates::SystemClock;
use medbook::state::AppState;

const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

fn select_llm(config: &AppConfig) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match config.llm_provider.as_str() {
        "groq" => {
            anyhow::ensure!(!config.groq_api_key.is_empty(), "GROQ_API_KEY must be set when LLM_PROVIDER=groq");
            tracing::info!("using Groq LLM provider (model: {})", config.groq_model);
            Arc::new(GroqProvider::new(config.groq_api_key.clone(), config.groq_model.clone()))
        }
        "ollama" => {
            tracing::info!("using Ollama LLM provider (url: {})", config.ollama_url);
            Arc::new(OllamaProvider::new(config.ollama_url.clone(), config.ollama_model.clone()))
        }
        _ => {
            anyhow::ensure!(!config.gemini_api_key.is_empty(), "GEMINI_API_KEY must be set when LLM_PROVIDER=gemini");
            tracing::info!("using Gemini LLM provider (model: {})", config.gemini_model);
            Arc::new(GeminiProvider::new(config.gemini_api_key.clone(), config.gemini_model.clone()))
        }
    };
    Ok(llm)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let flow = FlowDefinition::load(&config.flow_path)?;
    tracing::info!(path = %config.flow_path, "loaded conversation flow");

    let conn = db::init_db(&config.database_url)?;
    let llm = select_llm(&config)?;

    let state = Arc::new(AppState::new(config.clone(), conn, llm, flow, Arc::new(SystemClock)));

    let sweeper = state.clone();
    tokio::spawn(async move {
        let idle = chrono::Duration::minutes(sweeper.config.session_idle_minutes);
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            match sweeper.engine.sessions().expire(idle) {
                Ok(0) => {}
                Ok(n) => tracing::info!(expired = n, "expired idle sessions"),
                Err(e) => tracing::error!(error = %e, "session expiry sweep failed"),
            }
        }
    });

    let app = Router::new()
        .route("/health", get(handlers::health::health))
        .route("/api/v1/chat/start", post(handlers::chat::start_chat))
        .route("/api/v1/chat/message", post(handlers::chat::send_message))
        .route("/api/v1/chat/stats", get(handlers::chat::stats))
        .route(
            "/api/v1/ai-booking/process-message",
            post(handlers::ai_booking::process_message),
        )
        .route(
            "/api/v1/ai-booking/create-from-ai",
            post(handlers::ai_booking::create_from_ai),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
