//! An in-process browser used when no WebDriver is available and in tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::error::HostError;
use crate::host::{DomScriptExecutor, PageAction, PageContentProvider, TabHost, TabId, TabInfo};
use crate::page::PageContent;

#[derive(Debug, Default)]
struct MemoryState {
    tabs: Vec<TabInfo>,
    active: Option<TabId>,
    next_id: TabId,
    groups: Vec<(String, Vec<TabId>)>,
    actions: Vec<PageAction>,
    reloads: Vec<TabId>,
    pages: HashMap<TabId, (String, String)>,
}

impl MemoryState {
    fn find(&self, id: TabId) -> Result<&TabInfo, HostError> {
        self.tabs
            .iter()
            .find(|tab| tab.id == id)
            .ok_or(HostError::TabNotFound(id))
    }

    fn set_active(&mut self, id: Option<TabId>) {
        self.active = id;
        for tab in &mut self.tabs {
            tab.active = Some(tab.id) == id;
        }
    }

    fn push_tab(&mut self, title: &str, url: &str) -> TabInfo {
        self.next_id += 1;
        let tab = TabInfo {
            id: self.next_id,
            title: title.to_string(),
            url: url.to_string(),
            active: false,
        };
        self.tabs.push(tab.clone());
        tab
    }
}

/// Tabs kept in a vector; ids start at 1 and are never reused.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<MemoryState>,
    group_support: bool,
    failing_scripts: bool,
    screenshot: Vec<u8>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tab; the first one added becomes active.
    pub fn with_tab(self, title: &str, url: &str) -> Self {
        {
            let mut state = self.lock();
            let tab = state.push_tab(title, url);
            if state.active.is_none() {
                state.set_active(Some(tab.id));
            }
        }
        self
    }

    pub fn with_group_support(mut self, enabled: bool) -> Self {
        self.group_support = enabled;
        self
    }

    /// Make every DOM action fail, as a page with a strict CSP would.
    pub fn with_failing_scripts(mut self) -> Self {
        self.failing_scripts = true;
        self
    }

    pub fn with_screenshot(mut self, png: Vec<u8>) -> Self {
        self.screenshot = png;
        self
    }

    pub fn with_page_text(self, id: TabId, description: &str, text: &str) -> Self {
        self.lock()
            .pages
            .insert(id, (description.to_string(), text.to_string()));
        self
    }

    pub fn tabs(&self) -> Vec<TabInfo> {
        self.lock().tabs.clone()
    }

    pub fn actions(&self) -> Vec<PageAction> {
        self.lock().actions.clone()
    }

    pub fn groups(&self) -> Vec<(String, Vec<TabId>)> {
        self.lock().groups.clone()
    }

    pub fn reloads(&self) -> Vec<TabId> {
        self.lock().reloads.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl TabHost for MemoryHost {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        Ok(self.lock().tabs.clone())
    }

    async fn active_tab(&self) -> Result<TabInfo, HostError> {
        let state = self.lock();
        let id = state.active.ok_or(HostError::NoActiveTab)?;
        state.find(id).cloned()
    }

    async fn open_tab(&self, url: &str) -> Result<TabInfo, HostError> {
        let mut state = self.lock();
        let mut tab = state.push_tab(url, url);
        state.set_active(Some(tab.id));
        tab.active = true;
        debug!("memory host opened tab {} at {}", tab.id, url);
        Ok(tab)
    }

    async fn activate_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.lock();
        state.find(id)?;
        state.set_active(Some(id));
        Ok(())
    }

    async fn focus_window(&self, id: TabId) -> Result<(), HostError> {
        self.lock().find(id).map(|_| ())
    }

    async fn reload_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.lock();
        state.find(id)?;
        state.reloads.push(id);
        Ok(())
    }

    async fn close_tabs(&self, ids: &[TabId]) -> Result<(), HostError> {
        let mut state = self.lock();
        for id in ids {
            state.find(*id)?;
        }
        state.tabs.retain(|tab| !ids.contains(&tab.id));
        if state.active.is_some_and(|active| ids.contains(&active)) {
            let next = state.tabs.first().map(|tab| tab.id);
            state.set_active(next);
        }
        Ok(())
    }

    async fn duplicate_tab(&self, id: TabId) -> Result<TabInfo, HostError> {
        let mut state = self.lock();
        let source = state.find(id)?.clone();
        let mut tab = state.push_tab(&source.title, &source.url);
        state.set_active(Some(tab.id));
        tab.active = true;
        Ok(tab)
    }

    fn supports_groups(&self) -> bool {
        self.group_support
    }

    async fn group_tabs(&self, ids: &[TabId], name: &str) -> Result<(), HostError> {
        if !self.group_support {
            return Err(HostError::GroupsUnsupported);
        }
        let mut state = self.lock();
        for id in ids {
            state.find(*id)?;
        }
        state.groups.push((name.to_string(), ids.to_vec()));
        Ok(())
    }

    async fn capture_visible(&self) -> Result<Vec<u8>, HostError> {
        if self.lock().active.is_none() {
            return Err(HostError::NoActiveTab);
        }
        Ok(self.screenshot.clone())
    }
}

#[async_trait]
impl DomScriptExecutor for MemoryHost {
    async fn run_action(&self, action: &PageAction) -> Result<(), HostError> {
        let mut state = self.lock();
        if state.active.is_none() {
            return Err(HostError::NoActiveTab);
        }
        state.actions.push(action.clone());
        if self.failing_scripts {
            return Err(HostError::Script(format!(
                "{} blocked by content security policy",
                action.name()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl PageContentProvider for MemoryHost {
    async fn page_content(&self) -> PageContent {
        let state = self.lock();
        let Some(active) = state.active.and_then(|id| state.find(id).ok()) else {
            return PageContent::failed("No active tab found");
        };
        let (description, text) = state.pages.get(&active.id).cloned().unwrap_or_default();
        PageContent::from_raw(active.title.clone(), active.url.clone(), description, &text)
    }
}
