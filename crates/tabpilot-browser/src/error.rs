use thiserror::Error;

use crate::host::TabId;

/// Failures reported by a tab host, script executor or content provider.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Tab {0} not found")]
    TabNotFound(TabId),

    #[error("No active tab found")]
    NoActiveTab,

    #[error("Tab groups not supported in this browser")]
    GroupsUnsupported,

    #[error("Script failed: {0}")]
    Script(String),

    #[error("WebDriver error: {0}")]
    WebDriver(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<fantoccini::error::CmdError> for HostError {
    fn from(err: fantoccini::error::CmdError) -> Self {
        HostError::WebDriver(err.to_string())
    }
}

impl From<fantoccini::error::NewSessionError> for HostError {
    fn from(err: fantoccini::error::NewSessionError) -> Self {
        HostError::WebDriver(err.to_string())
    }
}
