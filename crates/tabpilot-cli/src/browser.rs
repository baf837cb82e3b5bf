//! Chooses the browser the tools drive: Chrome over WebDriver, or an
//! in-memory stand-in for `--no-browser`.

use std::sync::Arc;
use tracing::info;

use tabpilot_browser::{
    ChromeOptions, ChromeSession, DomScriptExecutor, MemoryHost, PageContentProvider, TabHost,
};
use tabpilot_config::WebDriverConfig;

pub enum Browser {
    Chrome(ChromeSession),
    Memory(Arc<MemoryHost>),
}

impl Browser {
    pub async fn start(config: &WebDriverConfig, headless: bool) -> anyhow::Result<Self> {
        let options = ChromeOptions {
            port: config.port,
            headless: headless || config.headless,
            chrome_binary: config.chrome_binary.clone(),
            chromedriver_binary: config.chromedriver_binary.clone(),
        };
        let session = ChromeSession::start(&options).await?;
        info!("Connected to Chrome on port {}", options.port);
        Ok(Browser::Chrome(session))
    }

    pub fn in_memory() -> Self {
        Browser::Memory(Arc::new(
            MemoryHost::new().with_tab("New Tab", "chrome://newtab/"),
        ))
    }

    pub fn tabs(&self) -> Arc<dyn TabHost> {
        match self {
            Browser::Chrome(session) => session.host.clone(),
            Browser::Memory(host) => host.clone(),
        }
    }

    pub fn dom(&self) -> Arc<dyn DomScriptExecutor> {
        match self {
            Browser::Chrome(session) => session.host.clone(),
            Browser::Memory(host) => host.clone(),
        }
    }

    pub fn page(&self) -> Arc<dyn PageContentProvider> {
        match self {
            Browser::Chrome(session) => session.host.clone(),
            Browser::Memory(host) => host.clone(),
        }
    }

    /// Close Chrome. Call after everything holding a host handle is dropped.
    pub async fn shutdown(self) {
        if let Browser::Chrome(session) = self {
            session.shutdown().await;
        }
    }
}
