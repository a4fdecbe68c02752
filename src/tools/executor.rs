use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::extract::ToolCall;
use super::handler::ToolDescriptor;
use super::registry::ToolRegistry;

/// Argument key the trusted credential is injected under.
pub const CREDENTIAL_KEY: &str = "auth_token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const REDACTED: &str = "[REDACTED]";
/// Shorter secrets are left alone: replacing them would mangle ordinary text.
const MIN_REDACT_LEN: usize = 8;

/// Bearer credential for the booking backend. Never shown to the model.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Request-supplied token if present and non-blank, else `default`.
    pub fn resolve(explicit: Option<&str>, default: &Credential) -> Credential {
        match explicit.map(str::trim) {
            Some(token) if !token.is_empty() => Credential::new(token),
            _ => default.clone(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential({REDACTED})")
    }
}

/// What a tool execution produced. Both variants carry display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    Completed(String),
    Failed(String),
}

impl ToolOutcome {
    pub fn text(&self) -> &str {
        match self {
            ToolOutcome::Completed(s) | ToolOutcome::Failed(s) => s,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutcome::Failed(_))
    }
}

/// Runs parsed tool calls against the registry. Never fails: transport
/// errors, backend errors and timeouts all come back as `ToolOutcome::Failed`.
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry) -> Self {
        if registry.is_empty() {
            warn!("tool executor created without tools");
        } else {
            debug!(tools = ?registry.tool_names(), "tool executor ready");
        }
        Self {
            registry,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Capability discovery for the registered tools.
    pub fn discover(&self) -> Vec<ToolDescriptor> {
        self.registry.descriptors()
    }

    pub async fn execute(&self, call: &ToolCall, credential: &Credential) -> ToolOutcome {
        let mut arguments = call.arguments.clone();
        if arguments.contains_key(CREDENTIAL_KEY) {
            warn!(tool = %call.tool_name, "model supplied a credential argument, overriding");
        }
        arguments.insert(
            CREDENTIAL_KEY.to_string(),
            Value::String(credential.expose().to_string()),
        );
        let input = Value::Object(arguments);

        let result = tokio::time::timeout(
            self.timeout,
            self.registry.execute(&call.tool_name, &input),
        )
        .await;

        let outcome = match result {
            Ok(Ok(output)) => ToolOutcome::Completed(redact(output, credential)),
            Ok(Err(e)) => ToolOutcome::Failed(redact(e, credential)),
            Err(_) => ToolOutcome::Failed(format!(
                "Error executing tool: {} timed out after {}s",
                call.tool_name,
                self.timeout.as_secs_f32()
            )),
        };

        info!(
            tool = %call.tool_name,
            is_error = outcome.is_error(),
            bytes = outcome.text().len(),
            "tool executed"
        );
        outcome
    }
}

/// Scrub the live credential from tool output so it cannot reach a prompt.
fn redact(output: String, credential: &Credential) -> String {
    let secret = credential.expose();
    if secret.len() < MIN_REDACT_LEN || !output.contains(secret) {
        return output;
    }
    warn!("redacted credential from tool output");
    output.replace(secret, REDACTED)
}
