use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::session::DEFAULT_MAX_SESSIONS;
use crate::tools::Credential;
use crate::AgentConfig;

/// Chat front-end for the equipment booking backend.
#[derive(Debug, Clone, Parser)]
#[command(name = "booking-agent", version, about)]
pub struct ServiceConfig {
    /// Address the HTTP API listens on
    #[arg(long, env = "BOOKING_AGENT_BIND", default_value = "0.0.0.0:8050")]
    pub bind: SocketAddr,

    /// Base URL of the booking backend
    #[arg(long, env = "BOOKING_BACKEND_URL", default_value = "http://127.0.0.1:8000")]
    pub backend_url: String,

    /// Default bearer token used when a chat request carries none
    #[arg(long, env = "BOOKING_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: String,

    /// Ollama server
    #[arg(long, env = "OLLAMA_BASE_URL", default_value = "http://localhost:11434")]
    pub ollama_url: String,

    #[arg(long, env = "BOOKING_AGENT_MODEL", default_value = "llama3.2")]
    pub model: String,

    /// Frontend origin allowed by CORS
    #[arg(long, env = "BOOKING_AGENT_CORS_ORIGIN", default_value = "http://localhost:8080")]
    pub cors_origin: String,

    #[arg(long, default_value_t = 10)]
    pub backend_timeout_secs: u64,

    #[arg(long, default_value_t = 120)]
    pub model_timeout_secs: u64,

    /// Exchanges remembered per chat session
    #[arg(long, default_value_t = 10)]
    pub max_exchanges: usize,

    /// Chat sessions kept in memory before the idlest is evicted
    #[arg(long, default_value_t = DEFAULT_MAX_SESSIONS)]
    pub max_sessions: usize,
}

impl ServiceConfig {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.model.clone(),
            max_exchanges: self.max_exchanges,
        }
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model_timeout_secs)
    }

    pub fn default_credential(&self) -> Credential {
        Credential::new(self.auth_token.trim())
    }
}
