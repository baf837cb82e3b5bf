use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;

use crate::tools::ToolKind;

/// Tool descriptions appended to every system instruction. Each tool line is
/// `- <name>(<args>): <description>`; nothing else starts that way.
pub const TOOL_CATALOGUE: &str = r#"You have access to the following tools:
- open_url(url): Opens a new tab with the specified URL.
- close_current_tab(): Closes the currently active tab.
- reload_page(): Reloads the current page.
- reload_tab(query): Reloads the first tab matching the query (ID, title, or URL).
- go_back(): Navigates back in the browser history.
- go_forward(): Navigates forward in the browser history.
- duplicate_tab(): Duplicates the currently active tab.
- list_tabs(): Returns a list of all open tabs with their IDs, titles, and URLs.
- switch_tab(query): Switches focus to the first tab matching the query (ID, title, or URL).
- close_tab(query): Closes every tab matching the query (ID, title, or URL).
- group_tabs(tabIds, name): Groups the specified tabs (by ID) and optionally names the group.
- scroll_page(direction, amount): Scrolls the page 'up' or 'down'. Default amount is 500.
- click_element(selector): Clicks the element matching the CSS selector.
- type_input(selector, text): Types text into the element matching the CSS selector.
- highlight_element(selector): Visually highlights the element matching the CSS selector.

IMPORTANT:
- If the user refers to "this tab", "current tab", or just "the page", use close_current_tab() or reload_page()
- If the user refers to a SPECIFIC tab by name/URL, use close_tab(query) or reload_tab(query)

ITERATIVE TOOL USE:
You can call tools iteratively to solve complex tasks.
1. Call a tool (e.g., list_tabs)
2. You will receive the results of that tool call
3. Based on the results, you can call more tools or provide a final answer
4. Repeat as needed

Example: "Close all khanacademy tabs except the one on statistics"
1. Call: {"tool": "list_tabs"}
2. System returns list of tabs
3. You analyze the list, find the IDs of tabs to close
4. Call: [{"tool": "close_tab", "query": 456}, {"tool": "close_tab", "query": 789}]
5. System confirms closure
6. You respond: "Closed 2 Khan Academy tabs, kept Statistics tab open."

To use a tool, respond with ONLY a JSON object OR a JSON array of objects in this format:
{"tool": "tool_name", "args": ...}
or
[{"tool": "tool_name", "args": ...}, {"tool": "tool_name", "args": ...}]

Examples:
{"tool": "open_url", "url": "https://example.com"}
[{"tool": "open_url", "url": "https://google.com"}, {"tool": "open_url", "url": "https://youtube.com"}]
{"tool": "close_current_tab"}
{"tool": "reload_page"}
{"tool": "reload_tab", "query": "khan academy"}
{"tool": "reload_tab", "query": 123}
{"tool": "go_back"}
{"tool": "go_forward"}
{"tool": "duplicate_tab"}
{"tool": "list_tabs"}
{"tool": "switch_tab", "query": "khan academy"}
{"tool": "switch_tab", "query": 123}
{"tool": "close_tab", "query": "youtube"}
{"tool": "scroll_page", "direction": "down"}
{"tool": "click_element", "selector": "button.submit"}"#;

static CATALOGUE_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^- ([a-z_]+)\(").expect("catalogue pattern is valid"));

/// Persona text followed by the tool catalogue.
pub fn build_system_instructions(persona: &str) -> String {
    let persona = persona.trim();
    if persona.is_empty() {
        TOOL_CATALOGUE.to_string()
    } else {
        format!("{}\n\n{}", persona, TOOL_CATALOGUE)
    }
}

/// Tool names the catalogue advertises, in order of appearance.
pub fn catalogue_tool_names(catalogue: &str) -> Vec<String> {
    CATALOGUE_ENTRY
        .captures_iter(catalogue)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Check that the catalogue and the executor agree on the set of tools.
pub fn validate_tool_catalogue(catalogue: &str) -> Result<()> {
    let advertised: BTreeSet<String> = catalogue_tool_names(catalogue).into_iter().collect();
    let implemented: BTreeSet<String> =
        ToolKind::ALL.iter().map(|kind| kind.name().to_string()).collect();

    let undocumented: Vec<&String> = implemented.difference(&advertised).collect();
    let unknown: Vec<&String> = advertised.difference(&implemented).collect();

    if !undocumented.is_empty() || !unknown.is_empty() {
        anyhow::bail!(
            "Tool catalogue out of sync: missing {:?}, not implemented {:?}",
            undocumented,
            unknown
        );
    }
    Ok(())
}
