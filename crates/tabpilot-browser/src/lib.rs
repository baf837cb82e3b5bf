//! Browser collaborators for the tab tools: traits plus a WebDriver and an
//! in-memory implementation.

pub mod error;
pub mod host;
pub mod memory;
pub mod page;
pub mod webdriver;

pub use error::HostError;
pub use host::{
    DomScriptExecutor, PageAction, PageContentProvider, ScrollDirection, TabHost, TabId, TabInfo,
};
pub use memory::MemoryHost;
pub use page::PageContent;
pub use webdriver::{ChromeHost, ChromeOptions, ChromeSession};
