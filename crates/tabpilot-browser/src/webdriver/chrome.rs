use async_trait::async_trait;
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::ChromeOptions;
use crate::error::HostError;
use crate::host::{DomScriptExecutor, PageAction, PageContentProvider, TabHost, TabId, TabInfo};
use crate::page::{PageContent, EXTRACT_CONTENT_SCRIPT};

/// Window handles are opaque strings; tools address tabs by small numeric ids.
#[derive(Debug, Default)]
struct ChromeState {
    handles: Vec<(TabId, String)>,
    next_id: TabId,
    active: Option<TabId>,
}

impl ChromeState {
    fn handle_of(&self, id: TabId) -> Result<String, HostError> {
        self.handles
            .iter()
            .find(|(tab_id, _)| *tab_id == id)
            .map(|(_, handle)| handle.clone())
            .ok_or(HostError::TabNotFound(id))
    }

    fn id_of(&self, handle: &str) -> Option<TabId> {
        self.handles
            .iter()
            .find(|(_, h)| h == handle)
            .map(|(id, _)| *id)
    }

    fn register(&mut self, handle: String) -> TabId {
        if let Some(id) = self.id_of(&handle) {
            return id;
        }
        self.next_id += 1;
        self.handles.push((self.next_id, handle));
        self.next_id
    }
}

/// A Chrome session driven over ChromeDriver. Every tab is a WebDriver window.
pub struct ChromeHost {
    client: Client,
    state: Mutex<ChromeState>,
}

impl ChromeHost {
    /// Connect to a running ChromeDriver on `options.port`.
    pub async fn connect(options: &ChromeOptions) -> Result<Self, HostError> {
        let url = format!("http://localhost:{}", options.port);

        let mut caps = serde_json::Map::new();
        caps.insert(
            "browserName".to_string(),
            Value::String("chrome".to_string()),
        );

        let mut args = vec![
            // Use a unique profile directory to avoid clashing with a running Chrome
            Value::String(format!(
                "--user-data-dir={}",
                std::env::temp_dir()
                    .join(format!("tabpilot-chrome-{}", std::process::id()))
                    .display()
            )),
            Value::String("--window-size=1280,900".to_string()),
            Value::String("--disable-dev-shm-usage".to_string()),
        ];
        if options.headless {
            args.push(Value::String("--headless=new".to_string()));
            args.push(Value::String("--disable-gpu".to_string()));
        }

        let mut chrome_options = serde_json::Map::new();
        chrome_options.insert("args".to_string(), Value::Array(args));
        if let Some(binary) = &options.chrome_binary {
            chrome_options.insert("binary".to_string(), Value::String(binary.clone()));
        }
        caps.insert(
            "goog:chromeOptions".to_string(),
            Value::Object(chrome_options),
        );

        // Use a timeout for the connection attempt to avoid hanging indefinitely
        let mut builder = ClientBuilder::native();
        let connect_future = builder.capabilities(caps).connect(&url);
        let client = tokio::time::timeout(Duration::from_secs(30), connect_future)
            .await
            .map_err(|_| {
                HostError::WebDriver(
                    "Connection to ChromeDriver timed out after 30 seconds".to_string(),
                )
            })??;

        let host = Self {
            client,
            state: Mutex::new(ChromeState::default()),
        };
        {
            let mut state = host.state.lock().await;
            host.sync_handles(&mut state).await?;
        }
        Ok(host)
    }

    /// End the browser session.
    pub async fn quit(self) -> Result<(), HostError> {
        self.client.close().await?;
        Ok(())
    }

    /// Pick up windows opened or closed behind our back.
    async fn sync_handles(&self, state: &mut ChromeState) -> Result<(), HostError> {
        let live: Vec<String> = self
            .client
            .windows()
            .await?
            .into_iter()
            .map(String::from)
            .collect();

        state.handles.retain(|(_, handle)| live.contains(handle));
        for handle in live {
            state.register(handle);
        }

        let active_alive = state
            .active
            .is_some_and(|id| state.handles.iter().any(|(tab_id, _)| *tab_id == id));
        if !active_alive {
            let current = self.client.window().await.ok().map(String::from);
            state.active = current
                .and_then(|handle| state.id_of(&handle))
                .or_else(|| state.handles.first().map(|(id, _)| *id));
            if let Some(id) = state.active {
                self.switch_to(&state.handle_of(id)?).await?;
            }
        }
        Ok(())
    }

    async fn switch_to(&self, handle: &str) -> Result<(), HostError> {
        let window = WindowHandle::try_from(handle.to_string())
            .map_err(|e| HostError::WebDriver(e.to_string()))?;
        self.client.switch_to_window(window).await?;
        Ok(())
    }

    /// Title and URL of `id`. Leaves the WebDriver context on that tab.
    async fn describe(&self, state: &ChromeState, id: TabId) -> Result<TabInfo, HostError> {
        self.switch_to(&state.handle_of(id)?).await?;
        let title = self.client.title().await.unwrap_or_default();
        let url = self
            .client
            .current_url()
            .await
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(TabInfo {
            id,
            title,
            url,
            active: state.active == Some(id),
        })
    }

    async fn restore_active(&self, state: &ChromeState) -> Result<(), HostError> {
        if let Some(active) = state.active {
            self.switch_to(&state.handle_of(active)?).await?;
        }
        Ok(())
    }

    async fn open_in_state(
        &self,
        state: &mut ChromeState,
        url: &str,
    ) -> Result<TabInfo, HostError> {
        let response = self.client.new_window(true).await?;
        let handle: String = response.handle.into();
        self.switch_to(&handle).await?;
        self.client.goto(url).await?;

        let id = state.register(handle);
        state.active = Some(id);
        debug!("Opened tab {} at {}", id, url);
        self.describe(state, id).await
    }
}

#[async_trait]
impl TabHost for ChromeHost {
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;

        let ids: Vec<TabId> = state.handles.iter().map(|(id, _)| *id).collect();
        let mut tabs = Vec::with_capacity(ids.len());
        for id in ids {
            tabs.push(self.describe(&state, id).await?);
        }
        self.restore_active(&state).await?;
        Ok(tabs)
    }

    async fn get_tab(&self, id: TabId) -> Result<TabInfo, HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;
        let tab = self.describe(&state, id).await;
        self.restore_active(&state).await?;
        tab
    }

    async fn active_tab(&self) -> Result<TabInfo, HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;
        let id = state.active.ok_or(HostError::NoActiveTab)?;
        self.describe(&state, id).await
    }

    async fn open_tab(&self, url: &str) -> Result<TabInfo, HostError> {
        let mut state = self.state.lock().await;
        self.open_in_state(&mut state, url).await
    }

    async fn activate_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;
        let handle = state.handle_of(id)?;
        self.switch_to(&handle).await?;
        state.active = Some(id);
        Ok(())
    }

    async fn focus_window(&self, id: TabId) -> Result<(), HostError> {
        // Switching the WebDriver context already raises the window
        let state = self.state.lock().await;
        state.handle_of(id).map(|_| ())
    }

    async fn reload_tab(&self, id: TabId) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;
        let handle = state.handle_of(id)?;
        self.switch_to(&handle).await?;
        self.client.refresh().await?;
        self.restore_active(&state).await
    }

    async fn close_tabs(&self, ids: &[TabId]) -> Result<(), HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;

        for id in ids {
            let handle = state.handle_of(*id)?;
            self.switch_to(&handle).await?;
            self.client.close_window().await?;
            state.handles.retain(|(tab_id, _)| tab_id != id);
            debug!("Closed tab {}", id);
        }

        if state.active.is_some_and(|active| ids.contains(&active)) {
            state.active = None;
        }
        if state.handles.is_empty() {
            state.active = None;
            return Ok(());
        }
        if state.active.is_none() {
            state.active = state.handles.first().map(|(id, _)| *id);
        }
        self.restore_active(&state).await
    }

    async fn duplicate_tab(&self, id: TabId) -> Result<TabInfo, HostError> {
        let mut state = self.state.lock().await;
        self.sync_handles(&mut state).await?;
        let source = self.describe(&state, id).await?;
        self.open_in_state(&mut state, &source.url).await
    }

    async fn capture_visible(&self) -> Result<Vec<u8>, HostError> {
        let state = self.state.lock().await;
        if state.active.is_none() {
            return Err(HostError::NoActiveTab);
        }
        Ok(self.client.screenshot().await?)
    }
}

#[async_trait]
impl DomScriptExecutor for ChromeHost {
    async fn run_action(&self, action: &PageAction) -> Result<(), HostError> {
        let state = self.state.lock().await;
        if state.active.is_none() {
            return Err(HostError::NoActiveTab);
        }
        let (script, args) = action.script();
        self.client
            .execute(script, args)
            .await
            .map_err(|e| HostError::Script(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl PageContentProvider for ChromeHost {
    async fn page_content(&self) -> PageContent {
        let _state = self.state.lock().await;
        let value = match self.client.execute(EXTRACT_CONTENT_SCRIPT, Vec::new()).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to extract page content: {}", e);
                return PageContent::failed(e.to_string());
            }
        };

        let field = |name: &str| {
            value
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        PageContent::from_raw(
            field("title"),
            field("url"),
            field("description"),
            &field("text"),
        )
    }
}
