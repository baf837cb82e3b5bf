//! The narrow interfaces the tool executor drives.
//!
//! A [`TabHost`] owns tab lifecycle, a [`DomScriptExecutor`] runs small page
//! actions in the active document and a [`PageContentProvider`] scrapes the
//! active page for context. One type usually implements all three.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::page::PageContent;

pub type TabId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: TabId,
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub active: bool,
}

impl TabInfo {
    /// Case-insensitive substring match on title or URL.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.title.to_lowercase().contains(&query) || self.url.to_lowercase().contains(&query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// A micro-action run against the active document.
#[derive(Debug, Clone, PartialEq)]
pub enum PageAction {
    Back,
    Forward,
    Scroll {
        direction: ScrollDirection,
        amount: i64,
    },
    Click {
        selector: String,
    },
    Type {
        selector: String,
        text: String,
    },
    Highlight {
        selector: String,
    },
}

impl PageAction {
    pub fn name(&self) -> &'static str {
        match self {
            PageAction::Back => "back",
            PageAction::Forward => "forward",
            PageAction::Scroll { .. } => "scroll",
            PageAction::Click { .. } => "click",
            PageAction::Type { .. } => "type",
            PageAction::Highlight { .. } => "highlight",
        }
    }
}

#[async_trait]
pub trait TabHost: Send + Sync {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError>;

    async fn get_tab(&self, id: TabId) -> Result<TabInfo, HostError> {
        self.list_tabs()
            .await?
            .into_iter()
            .find(|tab| tab.id == id)
            .ok_or(HostError::TabNotFound(id))
    }

    async fn active_tab(&self) -> Result<TabInfo, HostError>;

    /// Open `url` in a new tab, which becomes active.
    async fn open_tab(&self, url: &str) -> Result<TabInfo, HostError>;

    async fn activate_tab(&self, id: TabId) -> Result<(), HostError>;

    /// Bring the window holding `id` to the front.
    async fn focus_window(&self, id: TabId) -> Result<(), HostError>;

    async fn reload_tab(&self, id: TabId) -> Result<(), HostError>;

    async fn close_tabs(&self, ids: &[TabId]) -> Result<(), HostError>;

    async fn duplicate_tab(&self, id: TabId) -> Result<TabInfo, HostError>;

    fn supports_groups(&self) -> bool {
        false
    }

    async fn group_tabs(&self, _ids: &[TabId], _name: &str) -> Result<(), HostError> {
        Err(HostError::GroupsUnsupported)
    }

    /// PNG bytes of the visible area of the active tab.
    async fn capture_visible(&self) -> Result<Vec<u8>, HostError>;
}

#[async_trait]
pub trait DomScriptExecutor: Send + Sync {
    async fn run_action(&self, action: &PageAction) -> Result<(), HostError>;
}

#[async_trait]
pub trait PageContentProvider: Send + Sync {
    /// Never fails; problems are reported through `PageContent::success`.
    async fn page_content(&self) -> PageContent;
}
