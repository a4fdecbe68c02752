use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use super::InferenceProvider;
use crate::error::InferenceError;
use crate::types::{InferenceRequest, InferenceResponse, Usage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Ollama provider using the native `/api/chat` endpoint, non-streaming.
pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaProvider {
    /// Connect to a local Ollama instance at the default address.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: "http://localhost:11434".into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    /// Upper bound for a single chat call, including reading the body.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    async fn infer(&self, request: InferenceRequest) -> Result<InferenceResponse, InferenceError> {
        let body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
        });

        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "ollama inference request"
        );

        let resp = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| InferenceError::Request(e.to_string()))?;

        if status != 200 {
            return Err(InferenceError::ApiError { status, body: text });
        }

        let parsed: Value =
            serde_json::from_str(&text).map_err(|e| InferenceError::Parse(e.to_string()))?;

        let content = parsed["message"]["content"]
            .as_str()
            .ok_or_else(|| InferenceError::Parse("missing message.content".into()))?
            .to_string();

        // Ollama returns token counts in the response
        let usage = Usage {
            input_tokens: token_count(&parsed["prompt_eval_count"]),
            output_tokens: token_count(&parsed["eval_count"]),
        };

        Ok(InferenceResponse { content, usage })
    }
}

/// Missing counts are zero; counts beyond `u32` saturate.
fn token_count(value: &Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}
