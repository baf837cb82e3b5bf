use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of one tool call. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Structured payload, fed back to the model as JSON
    #[serde(default)]
    pub is_raw_data: bool,
}

impl ToolResult {
    pub fn ok(tool: &str, message: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            result: Some(Value::String(message.into())),
            error: None,
            is_raw_data: false,
        }
    }

    pub fn raw(tool: &str, data: Value) -> Self {
        Self {
            tool: tool.to_string(),
            success: true,
            result: Some(data),
            error: None,
            is_raw_data: true,
        }
    }

    pub fn failed(tool: &str, error: impl Into<String>) -> Self {
        Self {
            tool: tool.to_string(),
            success: false,
            result: None,
            error: Some(error.into()),
            is_raw_data: false,
        }
    }

    /// The success payload as text: JSON for raw data, the message otherwise.
    pub fn result_text(&self) -> String {
        match &self.result {
            None => String::new(),
            Some(Value::String(s)) if !self.is_raw_data => s.clone(),
            Some(value) => value.to_string(),
        }
    }

    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }
}
