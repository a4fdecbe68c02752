//! Everything the model sees. Prompt wording and message assembly live here
//! and nowhere else.

use crate::tools::ToolCatalog;
use crate::types::{ChatMessage, InferenceRequest};

const ASSISTANT_INTRO: &str = "You are a helpful equipment booking assistant.";

const TOOL_RULES: &str = "\
IMPORTANT RULES:
- Use only ONE tool call per response
- When you need to use a tool, respond ONLY with the JSON object, no additional text
- If you need to use multiple tools, do them in separate responses

Tool call format:
{\"tool_name\": \"function_name\", \"arguments\": {\"param1\": \"value1\", \"param2\": \"value2\"}}

Examples:
- {\"tool_name\": \"search_equipment\", \"arguments\": {\"site_name\": \"Basel pRED\"}}
- {\"tool_name\": \"book_equipment\", \"arguments\": {\"equipment_ids\": \"45c5a1ee-2929-4b95-8bc9-d36b2b624a1c\", \"date\": \"2025-07-07\", \"time_start\": \"10:30\", \"time_end\": \"12:00\", \"number_of_people\": 1, \"reason\": \"Lab tests\"}}

For booking, use equipment_ids as a simple string (not in brackets): \"id1\" or \"id1,id2\" for multiple.";

const FOLLOW_UP_PROMPT: &str = "\
You are a helpful equipment booking assistant.
You have just executed a tool and received the results. Your job is to provide a clear, \
human-readable summary of the results to the user.

IMPORTANT: Do NOT return JSON. Provide a natural language response that summarizes the \
tool results in a helpful way.";

/// Builds the two kinds of requests a turn can make.
#[derive(Debug, Clone)]
pub struct PromptContext {
    model: String,
    system_prompt: String,
}

impl PromptContext {
    pub fn new(model: impl Into<String>, catalog: &ToolCatalog) -> Self {
        Self {
            model: model.into(),
            system_prompt: system_prompt(catalog),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// System prompt, prior exchanges, then the new query.
    pub fn build_request<'a>(
        &self,
        history: impl Iterator<Item = &'a ChatMessage>,
        query: &str,
    ) -> InferenceRequest {
        let mut messages = vec![ChatMessage::system(&self.system_prompt)];
        messages.extend(history.cloned());
        messages.push(ChatMessage::user(query));

        InferenceRequest {
            model: self.model.clone(),
            messages,
        }
    }

    /// Summarization request after a tool ran. History is deliberately not
    /// included: exactly the query, the raw tool call and the tool result.
    pub fn build_follow_up(&self, query: &str, tool_call_response: &str, tool_result: &str) -> InferenceRequest {
        InferenceRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage::system(FOLLOW_UP_PROMPT),
                ChatMessage::user(query),
                ChatMessage::assistant(tool_call_response),
                ChatMessage::user(format!(
                    "Tool execution completed. Here are the results:\n\n{tool_result}\n\n\
                     Please provide a helpful summary of these results for the user."
                )),
            ],
        }
    }
}

/// Render the tool catalogue into the main system prompt.
pub fn system_prompt(catalog: &ToolCatalog) -> String {
    let tools = catalog
        .iter()
        .enumerate()
        .map(|(i, t)| {
            format!(
                "{}. {}({}) - {}",
                i + 1,
                t.name,
                t.parameter_names().join(", "),
                t.description
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!("{ASSISTANT_INTRO}\nYou have access to the following tools:\n\n{tools}\n\n{TOOL_RULES}")
}
