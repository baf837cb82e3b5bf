//! Runs browser tools against the tab host and the active document.

use serde_json::{json, Value};
use std::sync::Arc;
use tabpilot_browser::{DomScriptExecutor, PageAction, TabHost, TabId, TabInfo};
use tracing::{debug, warn};

use super::{BrowserTool, TabQuery, ToolResult};
use crate::error::ToolError;
use crate::ToolCall;

enum ToolOutput {
    Message(String),
    Data(Value),
}

/// Executes parsed tool calls. [`ToolExecutor::execute`] never fails: every
/// problem becomes a failed [`ToolResult`].
#[derive(Clone)]
pub struct ToolExecutor {
    tabs: Arc<dyn TabHost>,
    dom: Arc<dyn DomScriptExecutor>,
}

impl ToolExecutor {
    pub fn new(tabs: Arc<dyn TabHost>, dom: Arc<dyn DomScriptExecutor>) -> Self {
        Self { tabs, dom }
    }

    pub fn tabs(&self) -> &Arc<dyn TabHost> {
        &self.tabs
    }

    pub async fn execute(&self, call: &ToolCall) -> ToolResult {
        debug!("Executing tool: {} {}", call.tool, call.args);

        let outcome = match BrowserTool::parse(call) {
            Ok(tool) => self.run(tool).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(ToolOutput::Message(message)) => ToolResult::ok(&call.tool, message),
            Ok(ToolOutput::Data(data)) => ToolResult::raw(&call.tool, data),
            Err(e) => {
                warn!("Tool {} failed: {}", call.tool, e);
                ToolResult::failed(&call.tool, e.to_string())
            }
        }
    }

    async fn run(&self, tool: BrowserTool) -> Result<ToolOutput, ToolError> {
        let message = match tool {
            BrowserTool::OpenUrl { url } => {
                self.tabs.open_tab(&url).await?;
                format!("Opened {}", url)
            }
            BrowserTool::CloseCurrentTab => {
                let active = self.tabs.active_tab().await?;
                self.tabs.close_tabs(&[active.id]).await?;
                format!("Closed current tab (ID: {})", active.id)
            }
            BrowserTool::ReloadPage => {
                let active = self.tabs.active_tab().await?;
                self.tabs.reload_tab(active.id).await?;
                format!("Reloaded current tab (ID: {})", active.id)
            }
            BrowserTool::ReloadTab { query } => {
                let tab = self.first_match(&query).await?;
                self.tabs.reload_tab(tab.id).await?;
                format!("Reloaded tab matching \"{}\"", query)
            }
            BrowserTool::GoBack => {
                self.page_action(PageAction::Back).await;
                "Navigated back".to_string()
            }
            BrowserTool::GoForward => {
                self.page_action(PageAction::Forward).await;
                "Navigated forward".to_string()
            }
            BrowserTool::DuplicateTab => {
                let active = self.tabs.active_tab().await?;
                self.tabs.duplicate_tab(active.id).await?;
                "Duplicated current tab".to_string()
            }
            BrowserTool::ListTabs => {
                let listing: Vec<Value> = self
                    .tabs
                    .list_tabs()
                    .await?
                    .into_iter()
                    .map(|tab| json!({"id": tab.id, "title": tab.title, "url": tab.url}))
                    .collect();
                return Ok(ToolOutput::Data(Value::Array(listing)));
            }
            BrowserTool::SwitchTab { query } => {
                let tab = self.first_match(&query).await?;
                if let Err(e) = self.tabs.focus_window(tab.id).await {
                    warn!("Could not focus window of tab {}: {}", tab.id, e);
                }
                self.tabs.activate_tab(tab.id).await?;
                format!("Switched to tab matching \"{}\"", query)
            }
            BrowserTool::CloseTab { query } => {
                let ids = self.all_matches(&query).await?;
                self.tabs.close_tabs(&ids).await?;
                format!("Closed {} tab(s) matching \"{}\"", ids.len(), query)
            }
            BrowserTool::GroupTabs { tab_ids, name } => {
                let name = name.unwrap_or_else(|| "Group".to_string());
                if !self.tabs.supports_groups() {
                    return Err(tabpilot_browser::HostError::GroupsUnsupported.into());
                }
                self.tabs.group_tabs(&tab_ids, &name).await?;
                format!("Grouped tabs into \"{}\"", name)
            }
            BrowserTool::ScrollPage { direction, amount } => {
                self.page_action(PageAction::Scroll { direction, amount }).await;
                format!("Scrolled {}", direction.as_str())
            }
            BrowserTool::ClickElement { selector } => {
                let message = format!("Clicked element \"{}\"", selector);
                self.page_action(PageAction::Click { selector }).await;
                message
            }
            BrowserTool::TypeInput { selector, text } => {
                let message = format!("Typed \"{}\" into \"{}\"", text, selector);
                self.page_action(PageAction::Type { selector, text }).await;
                message
            }
            BrowserTool::HighlightElement { selector } => {
                let message = format!("Highlighted \"{}\"", selector);
                self.page_action(PageAction::Highlight { selector }).await;
                message
            }
        };
        Ok(ToolOutput::Message(message))
    }

    /// DOM actions are fire-and-forget: a failing script is only logged.
    async fn page_action(&self, action: PageAction) {
        if let Err(e) = self.dom.run_action(&action).await {
            warn!("Page action '{}' failed: {}", action.name(), e);
        }
    }

    async fn first_match(&self, query: &TabQuery) -> Result<TabInfo, ToolError> {
        match query {
            TabQuery::Id(id) => Ok(self.tabs.get_tab(*id).await?),
            TabQuery::Text(text) => self
                .tabs
                .list_tabs()
                .await?
                .into_iter()
                .find(|tab| tab.matches(text))
                .ok_or_else(|| ToolError::NoMatch(text.clone())),
        }
    }

    async fn all_matches(&self, query: &TabQuery) -> Result<Vec<TabId>, ToolError> {
        match query {
            TabQuery::Id(id) => Ok(vec![self.tabs.get_tab(*id).await?.id]),
            TabQuery::Text(text) => {
                let ids: Vec<TabId> = self
                    .tabs
                    .list_tabs()
                    .await?
                    .into_iter()
                    .filter(|tab| tab.matches(text))
                    .map(|tab| tab.id)
                    .collect();
                if ids.is_empty() {
                    Err(ToolError::NoMatches(text.clone()))
                } else {
                    Ok(ids)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabpilot_browser::{MemoryHost, ScrollDirection};

    fn executor(host: MemoryHost) -> (ToolExecutor, Arc<MemoryHost>) {
        let host = Arc::new(host);
        (ToolExecutor::new(host.clone(), host.clone()), host)
    }

    fn browser() -> MemoryHost {
        MemoryHost::new()
            .with_tab("Khan Academy - Statistics", "https://khanacademy.org/stats")
            .with_tab("YouTube", "https://youtube.com")
            .with_tab("Khan Academy - Algebra", "https://khanacademy.org/algebra")
    }

    async fn run(executor: &ToolExecutor, tool: &str, args: Value) -> ToolResult {
        executor.execute(&ToolCall::new(tool, args)).await
    }

    #[tokio::test]
    async fn test_close_tab_closes_every_match() {
        let (executor, host) = executor(browser());
        let result = run(&executor, "close_tab", json!({"query": "khan"})).await;

        assert!(result.success);
        assert_eq!(result.result_text(), "Closed 2 tab(s) matching \"khan\"");
        let remaining: Vec<String> = host.tabs().into_iter().map(|t| t.title).collect();
        assert_eq!(remaining, vec!["YouTube"]);
    }

    #[tokio::test]
    async fn test_close_tab_without_match() {
        let (executor, host) = executor(browser());
        let result = run(&executor, "close_tab", json!({"query": "reddit"})).await;

        assert!(!result.success);
        assert_eq!(result.error_text(), "No tabs found matching \"reddit\"");
        assert_eq!(host.tabs().len(), 3);
    }

    #[tokio::test]
    async fn test_switch_tab_by_numeric_string_id() {
        let (executor, host) = executor(browser());
        let result = run(&executor, "switch_tab", json!({"query": "2"})).await;

        assert!(result.success);
        assert_eq!(result.result_text(), "Switched to tab matching \"2\"");
        let active = host.active_tab().await.unwrap();
        assert_eq!(active.title, "YouTube");
    }

    #[tokio::test]
    async fn test_switch_tab_unknown_id() {
        let (executor, _) = executor(browser());
        let result = run(&executor, "switch_tab", json!({"tabId": 99})).await;
        assert_eq!(result.error_text(), "Tab 99 not found");

        let result = run(&executor, "switch_tab", json!({"query": "gmail"})).await;
        assert_eq!(result.error_text(), "No tab found matching \"gmail\"");
    }

    #[tokio::test]
    async fn test_reload_tab_uses_first_match() {
        let (executor, host) = executor(browser());
        let result = run(&executor, "reload_tab", json!({"query": "KHAN"})).await;

        assert_eq!(result.result_text(), "Reloaded tab matching \"KHAN\"");
        assert_eq!(host.reloads(), vec![1]);
    }

    #[tokio::test]
    async fn test_current_tab_operations() {
        let (executor, host) = executor(browser());

        let result = run(&executor, "reload_page", json!({})).await;
        assert_eq!(result.result_text(), "Reloaded current tab (ID: 1)");

        let result = run(&executor, "duplicate_tab", json!({})).await;
        assert_eq!(result.result_text(), "Duplicated current tab");
        assert_eq!(host.tabs().len(), 4);

        let active = host.active_tab().await.unwrap();
        let result = run(&executor, "close_current_tab", json!({})).await;
        assert_eq!(
            result.result_text(),
            format!("Closed current tab (ID: {})", active.id)
        );
        assert_eq!(host.tabs().len(), 3);
    }

    #[tokio::test]
    async fn test_close_current_tab_without_tabs() {
        let (executor, _) = executor(MemoryHost::new());
        let result = run(&executor, "close_current_tab", json!({})).await;
        assert_eq!(result.error_text(), "No active tab found");
    }

    #[tokio::test]
    async fn test_list_tabs_is_raw_data() {
        let (executor, _) = executor(browser());
        let result = run(&executor, "list_tabs", json!({})).await;

        assert!(result.is_raw_data);
        let listing = result.result.unwrap();
        assert_eq!(listing.as_array().unwrap().len(), 3);
        assert_eq!(
            listing[1],
            json!({"id": 2, "title": "YouTube", "url": "https://youtube.com"})
        );
    }

    #[tokio::test]
    async fn test_open_url() {
        let (executor, host) = executor(MemoryHost::new());
        let result = run(&executor, "open_url", json!({"url": "https://example.com"})).await;

        assert_eq!(result.result_text(), "Opened https://example.com");
        assert_eq!(host.tabs()[0].url, "https://example.com");
    }

    #[tokio::test]
    async fn test_group_tabs_requires_support() {
        let (executor, _) = executor(browser());
        let result = run(&executor, "group_tabs", json!({"tabIds": [1, 3]})).await;
        assert_eq!(result.error_text(), "Tab groups not supported in this browser");

        let (executor, host) = self::executor(browser().with_group_support(true));
        let result = run(&executor, "group_tabs", json!({"tabIds": [1, 3]})).await;
        assert_eq!(result.result_text(), "Grouped tabs into \"Group\"");
        assert_eq!(host.groups(), vec![("Group".to_string(), vec![1, 3])]);
    }

    #[tokio::test]
    async fn test_dom_actions_are_recorded() {
        let (executor, host) = executor(browser());

        let result = run(&executor, "scroll_page", json!({"direction": "up", "amount": 200})).await;
        assert_eq!(result.result_text(), "Scrolled up");
        let result = run(&executor, "type_input", json!({"selector": "#q", "text": "rust"})).await;
        assert_eq!(result.result_text(), "Typed \"rust\" into \"#q\"");

        assert_eq!(
            host.actions(),
            vec![
                PageAction::Scroll {
                    direction: ScrollDirection::Up,
                    amount: 200
                },
                PageAction::Type {
                    selector: "#q".into(),
                    text: "rust".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_failing_dom_script_still_reports_success() {
        let (executor, _) = executor(browser().with_failing_scripts());
        let result = run(&executor, "click_element", json!({"selector": "button.submit"})).await;

        assert!(result.success);
        assert_eq!(result.result_text(), "Clicked element \"button.submit\"");
    }

    #[tokio::test]
    async fn test_argument_errors_become_results() {
        let (executor, _) = executor(browser());

        let result = run(&executor, "highlight_element", json!({})).await;
        assert!(!result.success);
        assert_eq!(
            result.error_text(),
            "Missing required argument 'selector' for highlight_element"
        );

        let result = run(&executor, "teleport", json!({})).await;
        assert_eq!(result.error_text(), "Unknown tool: teleport");
    }
}
