//! Consistent formatting for "tabpilot:" status lines.
//!
//! ```ignore
//! use crate::status::{Status, StatusLine};
//!
//! // Progress on one line, completed later
//! StatusLine::progress("capturing screenshot");
//! StatusLine::status(&Status::Done);
//!
//! // Or both at once
//! StatusLine::complete("loading conversation", Status::Done);
//! ```

use crossterm::style::{Attribute, Color, ResetColor, SetAttribute, SetForegroundColor};
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    /// Bold green "[done]"
    Done,
    /// Red "[error: <msg>]"
    Error(String),
    /// Plain "[<status>]"
    Custom(String),
}

pub struct StatusLine;

impl StatusLine {
    /// "tabpilot: <message> ..." without a newline; finish it with [`StatusLine::status`].
    pub fn progress(message: &str) {
        print!("{} {} ...", Self::format_prefix(), message);
        let _ = io::stdout().flush();
    }

    pub fn status(status: &Status) {
        println!(" {}", Self::format_status(status));
    }

    pub fn complete(message: &str, status: Status) {
        Self::progress(message);
        Self::status(&status);
    }

    /// Dimmed "... <message>"
    pub fn info(message: &str) {
        println!(
            "{}... {}{}",
            SetForegroundColor(Color::DarkGrey),
            message,
            ResetColor
        );
    }

    pub fn warn(message: &str) {
        println!(
            "{}⚠️  {}{}",
            SetForegroundColor(Color::Yellow),
            message,
            ResetColor
        );
    }

    pub fn format_status(status: &Status) -> String {
        match status {
            Status::Done => format!(
                "{}{}[done]{}",
                SetForegroundColor(Color::Green),
                SetAttribute(Attribute::Bold),
                ResetColor
            ),
            Status::Error(msg) => format!(
                "{}[error: {}]{}",
                SetForegroundColor(Color::Red),
                msg,
                ResetColor
            ),
            Status::Custom(s) => format!("[{}]", s),
        }
    }

    pub fn format_prefix() -> String {
        format!(
            "{}{}tabpilot:{}{}",
            SetAttribute(Attribute::Bold),
            SetForegroundColor(Color::Green),
            ResetColor,
            SetAttribute(Attribute::Reset),
        )
    }
}
