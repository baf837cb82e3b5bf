use tabpilot_browser::HostError;
use thiserror::Error;

/// Per-tool failures. These never abort a turn; their text is fed back to the model.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Missing required argument '{arg}' for {tool}")]
    MissingArgument { tool: String, arg: String },

    #[error("Invalid argument '{arg}' for {tool}: {reason}")]
    InvalidArgument {
        tool: String,
        arg: String,
        reason: String,
    },

    #[error("No tab found matching \"{0}\"")]
    NoMatch(String),

    #[error("No tabs found matching \"{0}\"")]
    NoMatches(String),

    #[error(transparent)]
    Host(#[from] HostError),
}

impl ToolError {
    pub fn missing(tool: &str, arg: &str) -> Self {
        ToolError::MissingArgument {
            tool: tool.to_string(),
            arg: arg.to_string(),
        }
    }

    pub fn invalid(tool: &str, arg: &str, reason: impl Into<String>) -> Self {
        ToolError::InvalidArgument {
            tool: tool.to_string(),
            arg: arg.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failures that end a user turn without an answer from the model.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("A response is already being generated")]
    Busy,

    #[error("Cancelled")]
    Cancelled,

    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Provider(String),

    #[error("Message is empty")]
    EmptyInput,

    #[error("No user message to regenerate from")]
    NothingToRegenerate,
}

impl TurnError {
    /// Text shown inline in the chat when the turn fails.
    pub fn user_message(&self) -> String {
        match self {
            TurnError::Provider(message) => format!(
                "Sorry, I encountered an error: {}. Please check your API key in settings.",
                message
            ),
            TurnError::Timeout(_) => format!("Sorry, I encountered an error: {}.", self),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_error_messages() {
        assert_eq!(
            ToolError::missing("open_url", "url").to_string(),
            "Missing required argument 'url' for open_url"
        );
        assert_eq!(ToolError::UnknownTool("fly".into()).to_string(), "Unknown tool: fly");
        assert_eq!(
            ToolError::NoMatches("youtube".into()).to_string(),
            "No tabs found matching \"youtube\""
        );
        assert_eq!(
            ToolError::from(HostError::TabNotFound(9)).to_string(),
            "Tab 9 not found"
        );
    }

    #[test]
    fn test_provider_error_user_message() {
        let err = TurnError::Provider("API key not valid".into());
        assert_eq!(
            err.user_message(),
            "Sorry, I encountered an error: API key not valid. Please check your API key in settings."
        );
    }
}
