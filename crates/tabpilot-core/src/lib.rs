pub mod autosave;
pub mod classifier;
pub mod commands;
pub mod context;
pub mod error;
pub mod feedback;
pub mod history;
pub mod prompts;
pub mod session;
pub mod tool_loop;
pub mod tools;

pub use classifier::{classify, Classification};
pub use error::{ToolError, TurnError};
pub use history::{Conversation, ConversationStore};
pub use prompts::{build_system_instructions, validate_tool_catalogue, TOOL_CATALOGUE};
pub use session::ChatSession;
pub use tool_loop::{ToolLoop, TurnObserver, TurnOutcome, MAX_ITERATIONS};
pub use tools::{ToolExecutor, ToolKind, ToolResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation recovered from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    pub args: Value, // JSON object with the tool-specific arguments
}

impl ToolCall {
    pub fn new(tool: &str, args: Value) -> Self {
        Self {
            tool: tool.to_string(),
            args,
        }
    }

    /// Build a call from one parsed entry such as `{"tool": "close_tab", "query": 3}`.
    ///
    /// Fields of a nested `args` object are merged with the other top-level
    /// fields; top-level fields win on conflict. Entries without a non-empty
    /// string `tool` yield `None`.
    pub fn from_entry(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;
        let tool = object.get("tool")?.as_str()?.trim();
        if tool.is_empty() {
            return None;
        }

        let mut args = Map::new();
        if let Some(Value::Object(nested)) = object.get("args") {
            args.extend(nested.clone());
        }
        for (key, value) in object {
            if key != "tool" && key != "args" {
                args.insert(key.clone(), value.clone());
            }
        }

        Some(Self::new(tool, Value::Object(args)))
    }

    pub fn arg(&self, name: &str) -> Option<&Value> {
        self.args.get(name)
    }
}
