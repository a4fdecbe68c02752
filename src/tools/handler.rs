use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool's execution handler. Consumers implement this for each tool.
///
/// `Err` carries a user-readable failure description, not a Rust error chain.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, input: &Value) -> Result<String, String>;
}

/// What the model is told about a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Argument names in call order: required ones as listed, then the
    /// remaining properties.
    pub fn parameter_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.input_schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        if let Some(props) = self.input_schema["properties"].as_object() {
            for key in props.keys() {
                if !names.contains(&key.as_str()) {
                    names.push(key);
                }
            }
        }

        names
    }
}

/// A tool definition: descriptor for the LLM + handler for execution.
pub struct ToolDef {
    pub descriptor: ToolDescriptor,
    pub(crate) handler: Box<dyn ToolHandler>,
}
