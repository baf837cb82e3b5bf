//! Text fed back to the model after tools run, and the summary shown when
//! the iteration cap is reached.

use crate::tools::{ToolKind, ToolResult};

pub fn format_tool_results(results: &[ToolResult]) -> String {
    let mut message = String::from("Tool execution results:\n");

    for result in results {
        message.push_str(&format!("\nTool: {}\n", result.tool));
        if result.success {
            message.push_str("Status: Success\n");
            message.push_str(&format!("Result: {}\n", result.result_text()));
        } else {
            message.push_str("Status: Failed\n");
            message.push_str(&format!("Error: {}\n", result.error_text()));
        }
    }

    message.push_str("\nBased on these results, you can now:\n");
    message.push_str("1. Call more tools (respond with JSON tool calls)\n");
    message.push_str("2. Provide a final answer to the user (respond with text)\n");
    message
}

pub fn summarize(results: &[ToolResult]) -> String {
    let (succeeded, failed): (Vec<&ToolResult>, Vec<&ToolResult>) =
        results.iter().partition(|r| r.success);

    let mut summary = String::new();

    if !succeeded.is_empty() {
        summary.push_str("✅ Successfully:\n");
        for result in succeeded {
            let listed = result
                .result
                .as_ref()
                .and_then(|value| value.as_array())
                .filter(|_| result.tool == ToolKind::ListTabs.name());
            match listed {
                Some(tabs) => summary.push_str(&format!("- Listed {} open tabs\n", tabs.len())),
                None => summary.push_str(&format!("- {}\n", result.result_text())),
            }
        }
    }

    if !failed.is_empty() {
        summary.push_str("\n❌ Failed to:\n");
        for result in failed {
            summary.push_str(&format!("- {}: {}\n", result.tool, result.error_text()));
        }
    }

    summary.trim().to_string()
}

/// Reply used when the model is still calling tools after the last iteration.
pub fn capped_reply(results: &[ToolResult]) -> String {
    format!(
        "Completed {} tool operations:\n{}\n\n(Reached maximum iteration limit)",
        results.len(),
        summarize(results)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feedback_mixes_success_and_failure() {
        let results = vec![
            ToolResult::ok("open_url", "Opened https://a.com"),
            ToolResult::failed("switch_tab", "No tab found matching \"b\""),
            ToolResult::raw("list_tabs", json!([{"id": 1, "title": "A", "url": "https://a.com"}])),
        ];

        let expected = "Tool execution results:\n\
            \nTool: open_url\nStatus: Success\nResult: Opened https://a.com\n\
            \nTool: switch_tab\nStatus: Failed\nError: No tab found matching \"b\"\n\
            \nTool: list_tabs\nStatus: Success\nResult: [{\"id\":1,\"title\":\"A\",\"url\":\"https://a.com\"}]\n\
            \nBased on these results, you can now:\n\
            1. Call more tools (respond with JSON tool calls)\n\
            2. Provide a final answer to the user (respond with text)\n";
        assert_eq!(format_tool_results(&results), expected);
    }

    #[test]
    fn test_summary_sections() {
        let results = vec![
            ToolResult::raw("list_tabs", json!([{}, {}, {}])),
            ToolResult::ok("reload_page", "Reloaded current tab (ID: 4)"),
            ToolResult::failed("close_tab", "No tabs found matching \"x\""),
        ];
        assert_eq!(
            summarize(&results),
            "✅ Successfully:\n- Listed 3 open tabs\n- Reloaded current tab (ID: 4)\n\n❌ Failed to:\n- close_tab: No tabs found matching \"x\""
        );
    }

    #[test]
    fn test_summary_with_only_failures_is_trimmed() {
        let results = vec![ToolResult::failed("go_back", "boom")];
        assert_eq!(summarize(&results), "❌ Failed to:\n- go_back: boom");
    }

    #[test]
    fn test_capped_reply() {
        let results = vec![ToolResult::ok("go_back", "Navigated back"); 2];
        assert_eq!(
            capped_reply(&results),
            "Completed 2 tool operations:\n✅ Successfully:\n- Navigated back\n- Navigated back\n\n(Reached maximum iteration limit)"
        );
    }
}
