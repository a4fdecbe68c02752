use std::sync::Arc;

use axum::http::HeaderValue;
use booking_agent::config::ServiceConfig;
use booking_agent::server::{self, AppState};
use booking_agent::tools::{booking, BookingBackend, ToolExecutor, ToolRegistry};
use booking_agent::{Agent, AgentError, ForecastEngine, OllamaProvider};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("booking_agent=info")),
        )
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "booking agent failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AgentError> {
    let config = ServiceConfig::parse();

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| AgentError::Init(format!("http client: {e}")))?;

    let backend = BookingBackend::new(&config.backend_url)
        .with_client(http.clone())
        .with_timeout(config.backend_timeout());
    let registry = booking::register(ToolRegistry::new(), Arc::new(backend));
    let executor = ToolExecutor::new(registry);

    let provider = Arc::new(
        OllamaProvider::new()
            .with_client(http)
            .with_base_url(&config.ollama_url)
            .with_timeout(config.model_timeout()),
    );

    let agent = Agent::new(provider.clone(), executor, config.agent_config())?;
    let forecaster = ForecastEngine::new(provider, &config.model);

    let cors_origin = HeaderValue::from_str(&config.cors_origin)
        .map_err(|e| AgentError::Init(format!("invalid CORS origin: {e}")))?;

    let sessions = agent.session_store().with_max_sessions(config.max_sessions);
    let state = AppState {
        agent: Arc::new(agent),
        sessions: Arc::new(sessions),
        forecaster: Arc::new(forecaster),
        default_credential: config.default_credential(),
    };
    let router = server::build_router(state, cors_origin);

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        backend = %config.backend_url,
        model = %config.model,
        "booking agent listening"
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("booking agent stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
    }
}
