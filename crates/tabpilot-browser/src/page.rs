//! Page scraping and the scripts behind each [`PageAction`].
//!
//! Selectors and text always travel as script arguments (`arguments[n]`),
//! never spliced into the script source.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::host::{PageAction, ScrollDirection};

pub const MAX_CONTENT_CHARS: usize = 8000;
pub const TRUNCATION_NOTICE: &str = "\n\n[Content truncated due to length...]";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageContent {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PageContent {
    /// Build from raw page text: whitespace is normalised and long text truncated.
    pub fn from_raw(title: String, url: String, description: String, raw_text: &str) -> Self {
        Self {
            title,
            url,
            description,
            content: truncate_content(&clean_text(raw_text)),
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Trim every line and drop blank ones.
pub fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn truncate_content(text: &str) -> String {
    match text.char_indices().nth(MAX_CONTENT_CHARS) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_NOTICE),
        None => text.to_string(),
    }
}

/// Returns `{title, url, description, text}` for the active document.
pub const EXTRACT_CONTENT_SCRIPT: &str = r#"
const meta = document.querySelector('meta[name="description"]');
const body = document.body ? document.body.cloneNode(true) : null;
if (body) {
    body.querySelectorAll('script, style, noscript').forEach(el => el.remove());
}
return {
    title: document.title,
    url: window.location.href,
    description: meta ? (meta.getAttribute('content') || '') : '',
    text: body ? (body.innerText || body.textContent || '') : ''
};
"#;

const BACK_SCRIPT: &str = "window.history.back();";

const FORWARD_SCRIPT: &str = "window.history.forward();";

const SCROLL_SCRIPT: &str = "window.scrollBy({ top: arguments[0], behavior: 'smooth' });";

const CLICK_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { throw new Error('Element not found: ' + arguments[0]); }
el.click();
el.focus();
"#;

const TYPE_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { throw new Error('Element not found: ' + arguments[0]); }
el.value = arguments[1];
el.dispatchEvent(new Event('input', { bubbles: true }));
el.dispatchEvent(new Event('change', { bubbles: true }));
"#;

const HIGHLIGHT_SCRIPT: &str = r#"
const el = document.querySelector(arguments[0]);
if (!el) { throw new Error('Element not found: ' + arguments[0]); }
const originalOutline = el.style.outline;
el.style.outline = '4px solid #FF0000';
el.scrollIntoView({ behavior: 'smooth', block: 'center' });
setTimeout(() => { el.style.outline = originalOutline; }, 3000);
"#;

impl PageAction {
    /// Script source plus the arguments it reads.
    pub fn script(&self) -> (&'static str, Vec<Value>) {
        match self {
            PageAction::Back => (BACK_SCRIPT, Vec::new()),
            PageAction::Forward => (FORWARD_SCRIPT, Vec::new()),
            PageAction::Scroll { direction, amount } => {
                let delta = match direction {
                    ScrollDirection::Up => amount.saturating_neg(),
                    ScrollDirection::Down => *amount,
                };
                (SCROLL_SCRIPT, vec![json!(delta)])
            }
            PageAction::Click { selector } => (CLICK_SCRIPT, vec![json!(selector)]),
            PageAction::Type { selector, text } => {
                (TYPE_SCRIPT, vec![json!(selector), json!(text)])
            }
            PageAction::Highlight { selector } => (HIGHLIGHT_SCRIPT, vec![json!(selector)]),
        }
    }
}
