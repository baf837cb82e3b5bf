//! Browser tools the model can call.
//!
//! A [`ToolCall`] is parsed into a typed [`BrowserTool`] before anything
//! touches the browser, so argument problems surface as [`ToolError`]s with
//! the tool's name attached.

pub mod executor;
pub mod result;

pub use executor::ToolExecutor;
pub use result::ToolResult;

use serde_json::Value;
use std::fmt;
use tabpilot_browser::{ScrollDirection, TabId};

use crate::error::ToolError;
use crate::ToolCall;

pub const DEFAULT_SCROLL_AMOUNT: i64 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    OpenUrl,
    CloseCurrentTab,
    ReloadPage,
    ReloadTab,
    GoBack,
    GoForward,
    DuplicateTab,
    ListTabs,
    SwitchTab,
    CloseTab,
    GroupTabs,
    ScrollPage,
    ClickElement,
    TypeInput,
    HighlightElement,
}

impl ToolKind {
    pub const ALL: [ToolKind; 15] = [
        ToolKind::OpenUrl,
        ToolKind::CloseCurrentTab,
        ToolKind::ReloadPage,
        ToolKind::ReloadTab,
        ToolKind::GoBack,
        ToolKind::GoForward,
        ToolKind::DuplicateTab,
        ToolKind::ListTabs,
        ToolKind::SwitchTab,
        ToolKind::CloseTab,
        ToolKind::GroupTabs,
        ToolKind::ScrollPage,
        ToolKind::ClickElement,
        ToolKind::TypeInput,
        ToolKind::HighlightElement,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::OpenUrl => "open_url",
            ToolKind::CloseCurrentTab => "close_current_tab",
            ToolKind::ReloadPage => "reload_page",
            ToolKind::ReloadTab => "reload_tab",
            ToolKind::GoBack => "go_back",
            ToolKind::GoForward => "go_forward",
            ToolKind::DuplicateTab => "duplicate_tab",
            ToolKind::ListTabs => "list_tabs",
            ToolKind::SwitchTab => "switch_tab",
            ToolKind::CloseTab => "close_tab",
            ToolKind::GroupTabs => "group_tabs",
            ToolKind::ScrollPage => "scroll_page",
            ToolKind::ClickElement => "click_element",
            ToolKind::TypeInput => "type_input",
            ToolKind::HighlightElement => "highlight_element",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a tool argument names a tab: a direct id or a title/URL fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabQuery {
    Id(TabId),
    Text(String),
}

impl TabQuery {
    /// `None` for missing, null, boolean or blank values.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => {
                if let Some(id) = n.as_u64() {
                    Some(TabQuery::Id(id))
                } else {
                    match n.as_f64() {
                        Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                            Some(TabQuery::Id(f as u64))
                        }
                        _ => Some(TabQuery::Text(n.to_string())),
                    }
                }
            }
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => match s.trim().parse::<u64>() {
                Ok(id) => Some(TabQuery::Id(id)),
                Err(_) => Some(TabQuery::Text(s.clone())),
            },
            _ => None,
        }
    }
}

impl fmt::Display for TabQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TabQuery::Id(id) => write!(f, "{}", id),
            TabQuery::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserTool {
    OpenUrl { url: String },
    CloseCurrentTab,
    ReloadPage,
    ReloadTab { query: TabQuery },
    GoBack,
    GoForward,
    DuplicateTab,
    ListTabs,
    SwitchTab { query: TabQuery },
    CloseTab { query: TabQuery },
    GroupTabs { tab_ids: Vec<TabId>, name: Option<String> },
    ScrollPage { direction: ScrollDirection, amount: i64 },
    ClickElement { selector: String },
    TypeInput { selector: String, text: String },
    HighlightElement { selector: String },
}

impl BrowserTool {
    pub fn parse(call: &ToolCall) -> Result<Self, ToolError> {
        let kind = ToolKind::from_name(&call.tool)
            .ok_or_else(|| ToolError::UnknownTool(call.tool.clone()))?;
        let args = Args { call, kind };

        let tool = match kind {
            ToolKind::OpenUrl => BrowserTool::OpenUrl {
                url: args.required_str("url")?,
            },
            ToolKind::CloseCurrentTab => BrowserTool::CloseCurrentTab,
            ToolKind::ReloadPage => BrowserTool::ReloadPage,
            ToolKind::ReloadTab => BrowserTool::ReloadTab {
                query: args.query()?,
            },
            ToolKind::GoBack => BrowserTool::GoBack,
            ToolKind::GoForward => BrowserTool::GoForward,
            ToolKind::DuplicateTab => BrowserTool::DuplicateTab,
            ToolKind::ListTabs => BrowserTool::ListTabs,
            ToolKind::SwitchTab => BrowserTool::SwitchTab {
                query: args.query()?,
            },
            ToolKind::CloseTab => BrowserTool::CloseTab {
                query: args.query()?,
            },
            ToolKind::GroupTabs => BrowserTool::GroupTabs {
                tab_ids: args.tab_ids()?,
                name: args.optional_str("name"),
            },
            ToolKind::ScrollPage => BrowserTool::ScrollPage {
                direction: match args.optional_str("direction") {
                    Some(d) if d.eq_ignore_ascii_case("up") => ScrollDirection::Up,
                    _ => ScrollDirection::Down,
                },
                amount: args.amount()?,
            },
            ToolKind::ClickElement => BrowserTool::ClickElement {
                selector: args.required_str("selector")?,
            },
            ToolKind::TypeInput => BrowserTool::TypeInput {
                selector: args.required_str("selector")?,
                text: args.text("text")?,
            },
            ToolKind::HighlightElement => BrowserTool::HighlightElement {
                selector: args.required_str("selector")?,
            },
        };
        Ok(tool)
    }
}

struct Args<'a> {
    call: &'a ToolCall,
    kind: ToolKind,
}

impl Args<'_> {
    fn missing(&self, arg: &str) -> ToolError {
        ToolError::missing(self.kind.name(), arg)
    }

    fn required_str(&self, arg: &str) -> Result<String, ToolError> {
        match self.call.arg(arg) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
            Some(Value::String(_)) | Some(Value::Null) | None => Err(self.missing(arg)),
            Some(other) => Err(ToolError::invalid(
                self.kind.name(),
                arg,
                format!("expected a string, got {}", other),
            )),
        }
    }

    /// Present as a string, possibly empty.
    fn text(&self, arg: &str) -> Result<String, ToolError> {
        match self.call.arg(arg) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(self.missing(arg)),
        }
    }

    fn optional_str(&self, arg: &str) -> Option<String> {
        self.call
            .arg(arg)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// `query`, falling back to `tabId`.
    fn query(&self) -> Result<TabQuery, ToolError> {
        ["query", "tabId"]
            .iter()
            .filter_map(|key| self.call.arg(key))
            .find_map(TabQuery::from_value)
            .ok_or_else(|| self.missing("query"))
    }

    fn tab_ids(&self) -> Result<Vec<TabId>, ToolError> {
        let values = match self.call.arg("tabIds") {
            Some(Value::Array(values)) if !values.is_empty() => values.as_slice(),
            Some(Value::Array(_)) | Some(Value::Null) | None => return Err(self.missing("tabIds")),
            Some(single) => std::slice::from_ref(single),
        };

        values
            .iter()
            .map(|value| match TabQuery::from_value(value) {
                Some(TabQuery::Id(id)) => Ok(id),
                _ => Err(ToolError::invalid(
                    self.kind.name(),
                    "tabIds",
                    format!("{} is not a tab id", value),
                )),
            })
            .collect()
    }

    fn amount(&self) -> Result<i64, ToolError> {
        match self.call.arg("amount") {
            None | Some(Value::Null) => Ok(DEFAULT_SCROLL_AMOUNT),
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.round() as i64))
                .ok_or_else(|| ToolError::invalid(self.kind.name(), "amount", "not a number")),
            Some(Value::String(s)) => s.trim().parse::<i64>().map_err(|_| {
                ToolError::invalid(self.kind.name(), "amount", format!("\"{}\" is not a number", s))
            }),
            Some(other) => Err(ToolError::invalid(
                self.kind.name(),
                "amount",
                format!("{} is not a number", other),
            )),
        }
    }
}
