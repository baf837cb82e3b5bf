//! Decides whether a model reply is a tool invocation or a final answer.
//!
//! The first `{` or `[` span is taken greedily to the last matching closer in
//! the text, so a reply that wraps a tool call in prose is still a command.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::ToolCall;

static JSON_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\{[\s\S]*\}|\[[\s\S]*\])").expect("JSON span pattern is valid")
});

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    ToolCalls(Vec<ToolCall>),
    /// The reply verbatim, untrimmed.
    FinalAnswer(String),
}

impl Classification {
    pub fn is_final(&self) -> bool {
        matches!(self, Classification::FinalAnswer(_))
    }
}

pub fn classify(text: &str) -> Classification {
    let trimmed = text.trim();
    let candidate = JSON_SPAN
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);

    let parsed: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(e) => {
            debug!("Reply is not a tool call ({})", e);
            return Classification::FinalAnswer(text.to_string());
        }
    };

    let entries = match parsed {
        Value::Array(items) => items,
        other => vec![other],
    };

    let calls: Vec<ToolCall> = entries.iter().filter_map(ToolCall::from_entry).collect();
    if calls.is_empty() {
        Classification::FinalAnswer(text.to_string())
    } else {
        debug!("Classified {} tool call(s)", calls.len());
        Classification::ToolCalls(calls)
    }
}
