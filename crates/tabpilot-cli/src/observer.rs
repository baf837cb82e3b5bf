//! Prints tool-loop progress while a turn runs.

use crossterm::style::{Color, ResetColor, SetForegroundColor};
use serde_json::Value;

use tabpilot_core::{ToolCall, ToolResult, TurnObserver};

use crate::status::StatusLine;

const PREVIEW_CHARS: usize = 80;

pub struct ConsoleObserver;

impl TurnObserver for ConsoleObserver {
    fn on_model_call(&self, iteration: usize) {
        if iteration > 1 {
            StatusLine::info(&format!("thinking (step {})", iteration));
        }
    }

    fn on_tool_start(&self, call: &ToolCall) {
        println!(
            "  {}🔧 {}{}",
            SetForegroundColor(Color::Cyan),
            describe_call(call),
            ResetColor
        );
    }

    fn on_tool_result(&self, result: &ToolResult) {
        let color = if result.success { Color::Green } else { Color::Red };
        println!(
            "     {}{}{}",
            SetForegroundColor(color),
            describe_result(result),
            ResetColor
        );
    }
}

/// `tool` plus its arguments as compact JSON, when there are any.
pub fn describe_call(call: &ToolCall) -> String {
    match &call.args {
        Value::Object(fields) if !fields.is_empty() => {
            format!("{} {}", call.tool, preview(&call.args.to_string()))
        }
        _ => call.tool.clone(),
    }
}

pub fn describe_result(result: &ToolResult) -> String {
    if result.success {
        format!("✓ {}", preview(&result.result_text()))
    } else {
        format!("✗ {}", preview(result.error_text()))
    }
}

/// First line, cut to a terminal-friendly width.
fn preview(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default();
    if line.chars().count() > PREVIEW_CHARS {
        let cut: String = line.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
