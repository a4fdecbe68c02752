use serde_json::Value;
use tracing::debug;

use super::handler::{ToolDef, ToolDescriptor, ToolHandler};

/// Catalog of executable tools. Stores definitions and looks up handlers
/// by name. Names are unique: registering a name twice replaces the first.
pub struct ToolRegistry {
    tools: Vec<ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    /// Register a tool under `descriptor.name`.
    pub fn add(mut self, descriptor: ToolDescriptor, handler: impl ToolHandler + 'static) -> Self {
        let def = ToolDef {
            descriptor,
            handler: Box::new(handler),
        };
        match self
            .tools
            .iter()
            .position(|t| t.descriptor.name == def.descriptor.name)
        {
            Some(idx) => self.tools[idx] = def,
            None => self.tools.push(def),
        }
        self
    }

    /// Capability discovery: every registered tool's descriptor, in
    /// registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|t| t.descriptor.clone()).collect()
    }

    /// Run a tool's handler by name. Returns Err if the tool is unknown.
    pub async fn execute(&self, name: &str, input: &Value) -> Result<String, String> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.descriptor.name == name)
            .ok_or_else(|| format!("unknown tool: {name}"))?;
        debug!(tool = name, "dispatching tool");
        tool.handler.call(input).await
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.descriptor.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Immutable snapshot of the discovered tools. This is what the prompt
/// lists and what extracted tool calls are validated against.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDescriptor>,
}

impl ToolCatalog {
    /// Build from discovered descriptors. Later duplicates of a name are dropped.
    pub fn new(descriptors: Vec<ToolDescriptor>) -> Self {
        let mut tools: Vec<ToolDescriptor> = Vec::with_capacity(descriptors.len());
        for d in descriptors {
            if !tools.iter().any(|t| t.name == d.name) {
                tools.push(d);
            }
        }
        Self { tools }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.tools.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}
