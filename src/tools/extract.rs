//! Recovering tool calls from free-form model output.
//!
//! The model is asked to answer with a bare `{"tool_name": ..., "arguments": {...}}`
//! object when it wants a tool, but local models routinely wrap that object in
//! prose or markdown fences, or emit it with trailing junk. Extraction runs an
//! ordered list of strategies from strictest to most permissive; the first one
//! that yields a call naming a registered tool wins. A reply that decodes as a
//! complete JSON document is judged on its own: a call to an unregistered tool
//! there is a direct answer, and nothing inside it is scanned.
//!
//! Detection is a superset of parsing. When no strategy decodes a call but the
//! text still contains both `"tool_name"` and `"arguments"`, the text is treated
//! as a *malformed* tool call rather than a direct answer. Prose that merely
//! quotes both words is misreported this way; that is a known limitation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::registry::ToolCatalog;

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
}

/// Result of inspecting one model response.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    /// No tool call intended: the text is a direct answer.
    None,
    /// A well-formed call to a registered tool.
    Call(ToolCall),
    /// Looks like a tool call but nothing usable could be decoded.
    Malformed,
}

/// What a strategy concluded about the text.
#[derive(Debug)]
enum Verdict {
    Call(ToolCall),
    /// The text is a complete JSON document that is not a registered call.
    NotACall,
}

type Strategy = fn(&str, &ToolCatalog) -> Option<Verdict>;

/// Evaluated in order; the first verdict short-circuits.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("whole_text", whole_text),
    ("fenced", fenced),
    ("bounded_scan", bounded_scan),
    ("balanced_scan", balanced_scan),
];

// A single-level object holding "tool_name" then "arguments" with one nested
// single-level object.
static BOUNDED_CALL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*"tool_name"[^{}]*"arguments"[^{}]*\{[^{}]*\}[^{}]*\}"#).unwrap()
});

const CALL_START: &str = r#"{"tool_name""#;

/// Inspect `text` once and classify it.
pub fn extract(text: &str, catalog: &ToolCatalog) -> Extraction {
    let verdict = STRATEGIES.iter().find_map(|(name, strategy)| {
        let verdict = strategy(text, catalog)?;
        debug!(strategy = name, ?verdict, "strategy matched");
        Some(verdict)
    });

    match verdict {
        Some(Verdict::Call(call)) => Extraction::Call(call),
        Some(Verdict::NotACall) => Extraction::None,
        None if has_call_markers(text) => {
            debug!("tool call markers present but nothing decoded");
            Extraction::Malformed
        }
        None => Extraction::None,
    }
}

/// Does `text` encode an intended tool call (well-formed or not)?
pub fn detect(text: &str, catalog: &ToolCatalog) -> bool {
    !matches!(extract(text, catalog), Extraction::None)
}

/// Recover the tool call from `text`, if any strategy can.
pub fn parse(text: &str, catalog: &ToolCatalog) -> Option<ToolCall> {
    match extract(text, catalog) {
        Extraction::Call(call) => Some(call),
        Extraction::None | Extraction::Malformed => None,
    }
}

/// Strip a leading code fence (with optional language tag) and the matching
/// trailing fence. `None` if the text does not start with a fence.
pub(crate) fn strip_fences(text: &str) -> Option<&str> {
    let rest = text.trim().strip_prefix("```")?;
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    let rest = rest.trim_end();
    let inner = rest.strip_suffix("```").unwrap_or(rest);
    Some(inner.trim())
}

fn has_call_markers(text: &str) -> bool {
    text.contains(r#""tool_name""#) && text.contains(r#""arguments""#)
}

/// Accept `value` only if it is a call naming a registered tool.
fn to_call(value: &Value, catalog: &ToolCatalog) -> Option<ToolCall> {
    let obj = value.as_object()?;
    let tool_name = obj.get("tool_name")?.as_str()?;
    let arguments = obj.get("arguments")?.as_object()?;

    if !catalog.contains(tool_name) {
        debug!(tool = tool_name, "decoded call names an unregistered tool");
        return None;
    }

    Some(ToolCall {
        tool_name: tool_name.to_string(),
        arguments: arguments.clone(),
    })
}

fn decode(candidate: &str, catalog: &ToolCatalog) -> Option<ToolCall> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    to_call(&value, catalog)
}

/// A document that decodes as a whole is final: no scanning inside it.
fn whole_text(text: &str, catalog: &ToolCatalog) -> Option<Verdict> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    Some(match to_call(&value, catalog) {
        Some(call) => Verdict::Call(call),
        None => Verdict::NotACall,
    })
}

fn fenced(text: &str, catalog: &ToolCatalog) -> Option<Verdict> {
    whole_text(strip_fences(text)?, catalog)
}

fn bounded_scan(text: &str, catalog: &ToolCatalog) -> Option<Verdict> {
    BOUNDED_CALL_RE
        .find_iter(text)
        .find_map(|m| decode(m.as_str(), catalog))
        .map(Verdict::Call)
}

fn balanced_scan(text: &str, catalog: &ToolCatalog) -> Option<Verdict> {
    let start = text.find(CALL_START)?;
    let mut depth = 0usize;

    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return decode(&text[start..start + i + 1], catalog).map(Verdict::Call);
                }
            }
            _ => {}
        }
    }

    None
}
