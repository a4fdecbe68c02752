pub mod config;
pub mod context;
pub mod error;
pub mod forecast;
pub mod inference;
pub mod server;
pub mod session;
pub mod tools;
pub mod types;

#[cfg(test)]
mod testing;

use tracing::{info, warn};

pub use context::PromptContext;
pub use error::{AgentError, InferenceError};
pub use forecast::{Forecast, ForecastEngine, UsageData};
pub use inference::{InferenceProvider, OllamaProvider};
pub use session::{ConversationHistory, SessionStore};
pub use tools::{Credential, Extraction, ToolCatalog, ToolExecutor, ToolOutcome, ToolRegistry};
pub use types::{ChatMessage, InferenceRequest, InferenceResponse, Usage};

/// Shown when the model tried to call a tool but the call could not be recovered.
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse tool call";

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    /// Exchanges (user + assistant pairs) kept per session.
    pub max_exchanges: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2".into(),
            max_exchanges: 10,
        }
    }
}

/// How a turn ended. Every variant carries the text shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    DirectAnswer(String),
    ParseFailure(String),
    ExecutedResult(String),
    ExecutionError(String),
    ModelFailure(String),
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            TurnOutcome::DirectAnswer(s)
            | TurnOutcome::ParseFailure(s)
            | TurnOutcome::ExecutedResult(s)
            | TurnOutcome::ExecutionError(s)
            | TurnOutcome::ModelFailure(s) => s,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            TurnOutcome::DirectAnswer(s)
            | TurnOutcome::ParseFailure(s)
            | TurnOutcome::ExecutedResult(s)
            | TurnOutcome::ExecutionError(s)
            | TurnOutcome::ModelFailure(s) => s,
        }
    }
}

/// The conversation engine. Immutable after construction; per-session
/// history is owned by the caller and passed into each turn.
pub struct Agent {
    provider: Box<dyn InferenceProvider>,
    executor: ToolExecutor,
    catalog: ToolCatalog,
    context: PromptContext,
    config: AgentConfig,
}

impl Agent {
    /// Discovers the executor's tools and builds the system prompt from them.
    /// Fails if no tools are available.
    pub fn new(
        provider: impl InferenceProvider + 'static,
        executor: ToolExecutor,
        config: AgentConfig,
    ) -> Result<Self, AgentError> {
        let catalog = ToolCatalog::new(executor.discover());
        if catalog.is_empty() {
            return Err(AgentError::Init("tool discovery returned no tools".into()));
        }
        let context = PromptContext::new(&config.model, &catalog);
        info!(
            model = %config.model,
            tools = catalog.len(),
            "agent initialized"
        );

        Ok(Self {
            provider: Box::new(provider),
            executor,
            catalog,
            context,
            config,
        })
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    /// An empty session store sized for this agent's history window.
    pub fn session_store(&self) -> SessionStore {
        SessionStore::new(self.config.max_exchanges)
    }

    /// Run one user turn. Never fails: model errors become
    /// `TurnOutcome::ModelFailure`. The exchange is always recorded.
    pub async fn process_query(
        &self,
        history: &mut ConversationHistory,
        query: &str,
        credential: &Credential,
    ) -> TurnOutcome {
        let outcome = match self.run_turn(history, query, credential).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "turn failed");
                TurnOutcome::ModelFailure(format!("Error processing query: {e}"))
            }
        };

        history.record_exchange(query, outcome.text());
        outcome
    }

    async fn run_turn(
        &self,
        history: &ConversationHistory,
        query: &str,
        credential: &Credential,
    ) -> Result<TurnOutcome, AgentError> {
        let mut usage = Usage::default();

        let request = self.context.build_request(history.messages(), query);
        let response = self.provider.infer(request).await?;
        usage.accumulate(&response.usage);

        let call = match tools::extract(&response.content, &self.catalog) {
            Extraction::None => {
                info!(
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    "direct answer"
                );
                return Ok(TurnOutcome::DirectAnswer(response.content));
            }
            Extraction::Malformed => {
                warn!("tool call detected but not recoverable");
                return Ok(TurnOutcome::ParseFailure(PARSE_FAILURE_MESSAGE.into()));
            }
            Extraction::Call(call) => call,
        };

        info!(tool = %call.tool_name, "executing tool call");
        let outcome = self.executor.execute(&call, credential).await;

        let follow_up = self
            .context
            .build_follow_up(query, &response.content, outcome.text());
        let summary = self.provider.infer(follow_up).await?;
        usage.accumulate(&summary.usage);

        info!(
            tool = %call.tool_name,
            is_error = outcome.is_error(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "turn complete"
        );

        Ok(match outcome {
            ToolOutcome::Completed(_) => TurnOutcome::ExecutedResult(summary.content),
            ToolOutcome::Failed(_) => TurnOutcome::ExecutionError(summary.content),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::*;
    use crate::testing::{reply, MockBackend, MockProvider};
    use crate::tools::{booking, BookingBackend, ToolDescriptor, ToolHandler};
    use crate::types::Role;

    // --- Error Tool ---

    struct ErrorTool;

    #[async_trait]
    impl ToolHandler for ErrorTool {
        async fn call(&self, _input: &Value) -> Result<String, String> {
            Err("Error searching equipment: 503 - backend down".into())
        }
    }

    // --- Helpers ---

    const TOKEN: &str = "session-credential-123";

    async fn make_agent(provider: impl InferenceProvider + 'static) -> (Agent, MockBackend) {
        let mock = MockBackend::spawn().await;
        let registry = booking::register(
            ToolRegistry::new(),
            Arc::new(BookingBackend::new(&mock.base_url)),
        );
        let agent = Agent::new(provider, ToolExecutor::new(registry), AgentConfig::default())
            .unwrap();
        (agent, mock)
    }

    fn shared(provider: MockProvider) -> (MockProvider, Arc<tokio::sync::Mutex<Vec<InferenceRequest>>>) {
        let requests = provider.requests.clone();
        (provider, requests)
    }

    // --- Tests ---

    #[tokio::test]
    async fn empty_registry_is_fatal() {
        let result = Agent::new(
            MockProvider::new(vec![]),
            ToolExecutor::new(ToolRegistry::new()),
            AgentConfig::default(),
        );
        assert!(matches!(result, Err(AgentError::Init(_))));
    }

    #[tokio::test]
    async fn direct_answer_is_returned_and_recorded() {
        let (provider, requests) = shared(MockProvider::new(vec!["Hello! How can I help?"]));
        let (agent, mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "hi", &Credential::new(TOKEN))
            .await;

        assert_eq!(outcome, TurnOutcome::DirectAnswer("Hello! How can I help?".into()));
        assert_eq!(history.len(), 2);
        assert_eq!(requests.lock().await.len(), 1);
        assert!(mock.requests().await.is_empty());
    }

    #[tokio::test]
    async fn tool_call_is_executed_and_summarized() {
        let (provider, requests) = shared(MockProvider::new(vec![
            r#"{"tool_name": "search_equipment", "arguments": {"site_name": "Basel pRED"}}"#,
            "There are two items available at Basel pRED.",
        ]));
        let (agent, mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(
                &mut history,
                "Find equipment at Basel pRED",
                &Credential::new(TOKEN),
            )
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::ExecutedResult("There are two items available at Basel pRED.".into())
        );

        let seen = mock.requests().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].site_name.as_deref(), Some("Basel pRED"));
        assert_eq!(
            seen[0].authorization.as_deref(),
            Some(format!("Bearer {TOKEN}").as_str())
        );

        let requests = requests.lock().await;
        assert_eq!(requests.len(), 2);
        let follow_up = &requests[1];
        assert_eq!(follow_up.messages.len(), 4);
        assert_eq!(follow_up.messages[1].content, "Find equipment at Basel pRED");
        assert_eq!(follow_up.messages[2].role, Role::Assistant);
        assert!(follow_up.messages[3]
            .content
            .contains("Found 2 equipment items at Basel pRED"));
    }

    #[tokio::test]
    async fn credential_never_reaches_the_model() {
        let (provider, requests) = shared(MockProvider::new(vec![
            r#"{"tool_name": "search_equipment", "arguments": {"site_name": "Basel pRED"}}"#,
            "Done.",
            "Anything else?",
        ]));
        let (agent, _mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);
        let credential = Credential::new(TOKEN);

        agent.process_query(&mut history, "search", &credential).await;
        agent.process_query(&mut history, "thanks", &credential).await;

        for request in requests.lock().await.iter() {
            for message in &request.messages {
                assert!(!message.content.contains(TOKEN));
            }
        }
    }

    #[tokio::test]
    async fn malformed_tool_call_stops_after_one_model_call() {
        let (provider, requests) = shared(MockProvider::new(vec![
            r#"I will call "tool_name": search_equipment with "arguments" site"#,
            "never used",
        ]));
        let (agent, mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "find", &Credential::new(TOKEN))
            .await;

        assert_eq!(outcome, TurnOutcome::ParseFailure(PARSE_FAILURE_MESSAGE.into()));
        assert_eq!(requests.lock().await.len(), 1);
        assert!(mock.requests().await.is_empty());
        let recorded: Vec<&str> = history.messages().map(|m| m.content.as_str()).collect();
        assert_eq!(recorded, vec!["find", PARSE_FAILURE_MESSAGE]);
    }

    #[tokio::test]
    async fn unregistered_tool_reply_is_a_direct_answer() {
        let raw = r#"{"tool_name": "cancel_booking", "arguments": {"id": "bk-1"}}"#;
        let (provider, requests) = shared(MockProvider::new(vec![raw]));
        let (agent, mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "cancel bk-1", &Credential::new(TOKEN))
            .await;

        assert_eq!(outcome, TurnOutcome::DirectAnswer(raw.into()));
        assert_eq!(requests.lock().await.len(), 1);
        assert!(mock.requests().await.is_empty());
    }

    #[tokio::test]
    async fn tool_failure_is_still_summarized() {
        let (provider, requests) = shared(MockProvider::new(vec![
            r#"{"tool_name": "search_equipment", "arguments": {"site_name": "Basel pRED"}}"#,
            "The booking system is unavailable right now.",
        ]));
        let registry = ToolRegistry::new().add(
            ToolDescriptor::new("search_equipment", "Search", json!({"type": "object"})),
            ErrorTool,
        );
        let agent = Agent::new(provider, ToolExecutor::new(registry), AgentConfig::default())
            .unwrap();
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "find", &Credential::new(TOKEN))
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::ExecutionError("The booking system is unavailable right now.".into())
        );
        let requests = requests.lock().await;
        assert!(requests[1].messages[3].content.contains("503 - backend down"));
    }

    #[tokio::test]
    async fn model_failure_is_reported_and_recorded() {
        let provider = MockProvider::scripted(vec![Err(InferenceError::ApiError {
            status: 500,
            body: "model not loaded".into(),
        })]);
        let (agent, _mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "hi", &Credential::new(TOKEN))
            .await;

        assert!(matches!(outcome, TurnOutcome::ModelFailure(_)));
        assert!(outcome.text().starts_with("Error processing query: "));
        assert!(outcome.text().contains("500"));
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn failed_summary_call_is_a_model_failure() {
        let provider = MockProvider::scripted(vec![
            Ok(reply(
                r#"{"tool_name": "search_equipment", "arguments": {"site_name": "Basel pRED"}}"#,
            )),
            Err(InferenceError::Request("connection reset".into())),
        ]);
        let (agent, mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);

        let outcome = agent
            .process_query(&mut history, "find", &Credential::new(TOKEN))
            .await;

        assert!(matches!(outcome, TurnOutcome::ModelFailure(_)));
        assert_eq!(mock.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn history_is_sent_on_the_next_turn() {
        let (provider, requests) = shared(MockProvider::new(vec!["first answer", "second answer"]));
        let (agent, _mock) = make_agent(provider).await;
        let mut history = ConversationHistory::new(10);
        let credential = Credential::new(TOKEN);

        agent.process_query(&mut history, "first", &credential).await;
        agent.process_query(&mut history, "second", &credential).await;

        let requests = requests.lock().await;
        let contents: Vec<&str> = requests[1]
            .messages
            .iter()
            .skip(1)
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["first", "first answer", "second"]);
    }

    #[tokio::test]
    async fn session_store_uses_configured_history_window() {
        let mock = MockBackend::spawn().await;
        let registry = booking::register(
            ToolRegistry::new(),
            Arc::new(BookingBackend::new(&mock.base_url)),
        );
        let config = AgentConfig {
            max_exchanges: 2,
            ..AgentConfig::default()
        };
        let agent = Agent::new(MockProvider::new(vec![]), ToolExecutor::new(registry), config)
            .unwrap();

        let store = agent.session_store();
        let history = store.get_or_create("s").await;
        let mut history = history.lock().await;
        for i in 0..5 {
            history.record_exchange(&format!("q{i}"), &format!("a{i}"));
        }
        assert_eq!(history.capacity(), 4);
        assert_eq!(history.messages().next().unwrap().content, "q3");
    }

    #[tokio::test]
    async fn system_prompt_lists_discovered_tools() {
        let (agent, _mock) = make_agent(MockProvider::new(vec![])).await;
        assert!(agent.catalog().contains("search_equipment"));
        assert!(agent.catalog().contains("book_equipment"));
    }
}
