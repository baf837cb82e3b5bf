//! Local control commands for interactive mode.
//!
//! These act on the terminal session itself (stored chats, attachments,
//! persona) and never reach the model. Anything not recognised here falls
//! through to the slash commands in `tabpilot_core::commands`, including
//! `/help` and a bare `/image`.

use anyhow::{Context as _, Result};
use chrono::{Local, TimeZone};
use std::path::{Path, PathBuf};

use tabpilot_config::PersonaPreset;
use tabpilot_core::history::{export_markdown, MatchType, SortKey};
use tabpilot_core::{build_system_instructions, ChatSession, Conversation};
use tabpilot_providers::{ImageContent, Message, MessageRole};

use crate::status::{Status, StatusLine};

const MESSAGE_PREVIEW_CHARS: usize = 70;

/// Control commands with their usage, for `/help` and tab completion.
pub const CONTROL_COMMANDS: &[(&str, &str)] = &[
    ("/history", "[query] - List stored chats, or search them"),
    ("/load", "<id> - Open a stored chat"),
    ("/delete", "<id> - Delete a stored chat"),
    ("/import", "<file> - Import a chat exported as JSON"),
    ("/messages", "- Show the open chat with message numbers"),
    ("/edit", "<n> <text> - Change your message number n"),
    ("/rm", "<n> - Delete message number n"),
    ("/regen", "[n] - Regenerate answer n (default: the last one)"),
    ("/page", "- Toggle sending the active page with each message"),
    ("/image", "<path> - Attach an image to your next message"),
    ("/screenshot", "- Attach a screenshot of the active tab"),
    (
        "/persona",
        "[preset] - Switch persona (helper, coder, teacher, creative, professional)",
    ),
    ("/tabs", "- List open browser tabs"),
    ("/quit", "- Exit (also: exit, quit, Ctrl-D)"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    History(Option<String>),
    Load(String),
    Delete(String),
    Import(PathBuf),
    Messages,
    /// Zero-based index and the new text
    Edit(usize, String),
    Remove(usize),
    Regenerate(Option<usize>),
    Page,
    Image(PathBuf),
    Screenshot,
    Persona(Option<String>),
    Tabs,
    Quit,
}

impl ControlCommand {
    /// `None` when the input is not a control command; `Some(Err(usage))`
    /// when it is one with bad arguments.
    pub fn parse(input: &str) -> Option<Result<Self, String>> {
        let rest = input.trim().strip_prefix('/')?;
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "history" => Ok(ControlCommand::History(non_empty(args))),
            "load" => required(args, "/load <id>").map(ControlCommand::Load),
            "delete" => required(args, "/delete <id>").map(ControlCommand::Delete),
            "import" => {
                required(args, "/import <file>").map(|p| ControlCommand::Import(p.into()))
            }
            "messages" => Ok(ControlCommand::Messages),
            "edit" => {
                let (number, text) = args.split_once(char::is_whitespace).unwrap_or((args, ""));
                match (message_index(number), text.trim()) {
                    (Some(index), text) if !text.is_empty() => {
                        Ok(ControlCommand::Edit(index, text.to_string()))
                    }
                    _ => Err("Usage: /edit <n> <text>".to_string()),
                }
            }
            "rm" => message_index(args)
                .map(ControlCommand::Remove)
                .ok_or_else(|| "Usage: /rm <n>".to_string()),
            "regen" => {
                if args.is_empty() {
                    Ok(ControlCommand::Regenerate(None))
                } else {
                    message_index(args)
                        .map(|index| ControlCommand::Regenerate(Some(index)))
                        .ok_or_else(|| "Usage: /regen [n]".to_string())
                }
            }
            "page" => Ok(ControlCommand::Page),
            "image" if !args.is_empty() => Ok(ControlCommand::Image(args.into())),
            "screenshot" => Ok(ControlCommand::Screenshot),
            "persona" => Ok(ControlCommand::Persona(non_empty(args))),
            "tabs" => Ok(ControlCommand::Tabs),
            "quit" | "exit" => Ok(ControlCommand::Quit),
            _ => return None,
        };
        Some(command)
    }
}

fn non_empty(args: &str) -> Option<String> {
    (!args.is_empty()).then(|| args.to_string())
}

fn required(args: &str, usage: &str) -> Result<String, String> {
    non_empty(args).ok_or_else(|| format!("Usage: {}", usage))
}

/// The control command list printed after the slash command help.
pub fn control_help() -> String {
    let mut help = String::from("📖 Control commands:\n");
    for (name, usage) in CONTROL_COMMANDS {
        help.push_str(&format!("  {} {}\n", name, usage));
    }
    help
}

/// Parse a 1-based message number into an index.
fn message_index(number: &str) -> Option<usize> {
    number.trim().parse::<usize>().ok()?.checked_sub(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Mutable bits of the prompt loop a control command may touch.
#[derive(Default)]
pub struct PendingInput {
    pub images: Vec<ImageContent>,
}

pub async fn handle_control(
    command: ControlCommand,
    session: &ChatSession,
    pending: &mut PendingInput,
) -> Result<Flow> {
    match command {
        ControlCommand::History(query) => print_history(session, query.as_deref())?,
        ControlCommand::Load(id) => {
            if session.load_conversation(&id).await? {
                StatusLine::complete(&format!("loading {}", id), Status::Done);
                print_messages(&session.messages().await);
            } else {
                let status = Status::Error("not found".into());
                StatusLine::complete(&format!("loading {}", id), status);
            }
        }
        ControlCommand::Delete(id) => {
            let status = if session.delete_conversation(&id).await? {
                Status::Done
            } else {
                Status::Error("not found".into())
            };
            StatusLine::complete(&format!("deleting {}", id), status);
        }
        ControlCommand::Import(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let conversation = session.store().import_json(&json)?;
            // Importing makes the new chat current in the store; keep the open one.
            let open = session.conversation_id().await;
            session.store().set_current_id(Some(&open))?;
            StatusLine::complete(
                &format!("importing \"{}\" as {}", conversation.title, conversation.id),
                Status::Done,
            );
        }
        ControlCommand::Messages => print_messages(&session.messages().await),
        ControlCommand::Edit(index, text) => {
            let status = if session.edit_message(index, &text).await? {
                Status::Done
            } else {
                Status::Custom("unchanged".into())
            };
            StatusLine::complete(&format!("editing message {}", index + 1), status);
        }
        ControlCommand::Remove(index) => {
            session.delete_message(index).await?;
            StatusLine::complete(&format!("deleting message {}", index + 1), Status::Done);
        }
        // The caller runs regeneration so it can be cancelled like any turn.
        ControlCommand::Regenerate(_) => {}
        ControlCommand::Page => {
            let enabled = !session.include_page_context();
            session.set_include_page_context(enabled);
            StatusLine::info(&format!(
                "page context {}",
                if enabled { "on" } else { "off" }
            ));
        }
        ControlCommand::Image(path) => {
            let image = load_image(&path)?;
            pending.images.push(image);
            StatusLine::complete(&format!("attaching {}", path.display()), Status::Done);
        }
        ControlCommand::Screenshot => {
            StatusLine::progress("capturing screenshot");
            let captured = session
                .tool_loop()
                .executor()
                .tabs()
                .capture_visible()
                .await
                .map_err(anyhow::Error::from)
                .and_then(|png| {
                    ImageContent::from_bytes(&png)
                        .ok_or_else(|| anyhow::anyhow!("capture was not an image"))
                });
            match captured {
                Ok(image) => {
                    pending.images.push(image);
                    StatusLine::status(&Status::Done);
                }
                Err(e) => StatusLine::status(&Status::Error(e.to_string())),
            }
        }
        ControlCommand::Persona(None) => {
            let names: Vec<&str> = PersonaPreset::ALL.iter().map(|p| p.name()).collect();
            println!("Personas: {}", names.join(", "));
        }
        ControlCommand::Persona(Some(name)) => match PersonaPreset::from_name(&name) {
            Some(preset) => {
                session
                    .tool_loop()
                    .set_system_instructions(build_system_instructions(preset.instructions()));
                StatusLine::complete(
                    &format!("switching persona to {}", preset.name()),
                    Status::Done,
                );
            }
            None => StatusLine::warn(&format!("Unknown persona: {}", name)),
        },
        ControlCommand::Tabs => {
            let tabs = session.tool_loop().executor().tabs().list_tabs().await?;
            for tab in tabs {
                let marker = if tab.active { "*" } else { " " };
                println!("{} [{}] {} - {}", marker, tab.id, tab.title, tab.url);
            }
        }
        ControlCommand::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

/// Index of the newest assistant message, the default for `/regen`.
pub fn last_answer_index(messages: &[Message]) -> Option<usize> {
    messages.iter().rposition(|m| m.role == MessageRole::Assistant)
}

/// Read an image file; its type comes from the file signature.
pub fn load_image(path: &Path) -> Result<ImageContent> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ImageContent::from_bytes(&bytes)
        .ok_or_else(|| anyhow::anyhow!("{} is not a PNG, JPEG, GIF or WebP image", path.display()))
}

/// Write the open chat as Markdown into `dir`.
pub async fn export_conversation(session: &ChatSession, dir: &Path) -> Result<PathBuf> {
    let conversation = session
        .current_conversation()
        .await?
        .ok_or_else(|| anyhow::anyhow!("No conversation to export"))?;
    let path = dir.join(export_file_name(&conversation));
    std::fs::write(&path, export_markdown(&conversation))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Title with every non-alphanumeric character replaced by `_`.
pub fn export_file_name(conversation: &Conversation) -> String {
    let stem: String = conversation
        .title
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}.md", stem)
}

fn print_history(session: &ChatSession, query: Option<&str>) -> Result<()> {
    let store = session.store();
    match query {
        Some(query) => {
            let hits = store.search(query)?;
            if hits.is_empty() {
                println!("No chats match \"{}\"", query);
            }
            for hit in hits {
                let detail = match hit.match_type {
                    MatchType::Title => "title match".to_string(),
                    MatchType::Messages => format!("{} matching messages", hit.match_count),
                };
                println!("  {}  {}  [{}]", hit.conversation.id, hit.conversation.title, detail);
            }
        }
        None => {
            let current = store.current_id()?;
            for conversation in store.sorted(SortKey::UpdatedAt, false)? {
                let marker = if current.as_deref() == Some(conversation.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}  {}  ({} messages, {})",
                    marker,
                    conversation.id,
                    conversation.title,
                    conversation.messages.len(),
                    local_time(conversation.updated_at)
                );
            }
        }
    }
    StatusLine::info(&store.storage_info()?.to_string());
    Ok(())
}

fn print_messages(messages: &[Message]) {
    if messages.is_empty() {
        StatusLine::info("no messages yet");
    }
    for (index, message) in messages.iter().enumerate() {
        println!("  [{}] {}", index + 1, message_line(message));
    }
}

fn message_line(message: &Message) -> String {
    let who = match message.role {
        MessageRole::User => "👤 You",
        MessageRole::Assistant => "🤖 Gemini",
        MessageRole::System => "⚙️ System",
    };
    let flat = message.content.replace('\n', " ");
    let text = if flat.chars().count() > MESSAGE_PREVIEW_CHARS {
        let cut: String = flat.chars().take(MESSAGE_PREVIEW_CHARS - 3).collect();
        format!("{}...", cut)
    } else {
        flat
    };
    if message.images.is_empty() {
        format!("{}: {}", who, text)
    } else {
        format!("{}: {} [{} image(s)]", who, text, message.images.len())
    }
}

fn local_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_control_input_falls_through() {
        assert_eq!(ControlCommand::parse("hello"), None);
        assert_eq!(ControlCommand::parse("/summarize"), None);
        assert_eq!(ControlCommand::parse("/tldr now"), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            ControlCommand::parse("/history rust blog"),
            Some(Ok(ControlCommand::History(Some("rust blog".into()))))
        );
        assert_eq!(
            ControlCommand::parse("/history"),
            Some(Ok(ControlCommand::History(None)))
        );
        assert_eq!(
            ControlCommand::parse("/edit 3 fixed   typo"),
            Some(Ok(ControlCommand::Edit(2, "fixed   typo".into())))
        );
        assert_eq!(ControlCommand::parse("/rm 1"), Some(Ok(ControlCommand::Remove(0))));
        assert_eq!(
            ControlCommand::parse("/regen"),
            Some(Ok(ControlCommand::Regenerate(None)))
        );
        assert_eq!(
            ControlCommand::parse("/REGEN 4"),
            Some(Ok(ControlCommand::Regenerate(Some(3))))
        );
        assert_eq!(
            ControlCommand::parse("/image ~/shots/a.png"),
            Some(Ok(ControlCommand::Image("~/shots/a.png".into())))
        );
    }

    #[test]
    fn test_help_and_bare_image_reach_slash_commands() {
        for input in ["/help", "/commands", "/?", "/image", "/image   "] {
            assert_eq!(ControlCommand::parse(input), None, "{}", input);
        }
    }

    #[test]
    fn test_control_help_lists_every_command() {
        let help = control_help();
        assert!(help.starts_with("📖 Control commands:\n"));
        for (name, usage) in CONTROL_COMMANDS {
            assert!(help.contains(&format!("  {} {}\n", name, usage)));
        }
    }

    #[test]
    fn test_bad_arguments_report_usage() {
        assert_eq!(
            ControlCommand::parse("/load"),
            Some(Err("Usage: /load <id>".to_string()))
        );
        assert_eq!(
            ControlCommand::parse("/rm 0"),
            Some(Err("Usage: /rm <n>".to_string()))
        );
        assert_eq!(
            ControlCommand::parse("/edit 2"),
            Some(Err("Usage: /edit <n> <text>".to_string()))
        );
        assert_eq!(
            ControlCommand::parse("/regen last"),
            Some(Err("Usage: /regen [n]".to_string()))
        );
    }

    #[test]
    fn test_last_answer_index() {
        let messages = vec![
            Message::new(MessageRole::User, "a".into()),
            Message::new(MessageRole::Assistant, "b".into()),
            Message::new(MessageRole::User, "c".into()),
        ];
        assert_eq!(last_answer_index(&messages), Some(1));
        assert_eq!(last_answer_index(&messages[..1]), None);
    }

    #[test]
    fn test_export_file_name_replaces_symbols() {
        let conversation = Conversation {
            id: "conv_1_abc".into(),
            title: "What's on Hacker News?".into(),
            messages: vec![],
            created_at: 0,
            updated_at: 0,
            tags: vec![],
        };
        assert_eq!(export_file_name(&conversation), "What_s_on_Hacker_News_.md");
    }

    #[test]
    fn test_load_image_by_signature_and_rejects_text() {
        let dir = tempfile::TempDir::new().unwrap();
        let png = dir.path().join("shot.bin");
        std::fs::write(&png, [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0]).unwrap();
        assert_eq!(load_image(&png).unwrap().media_type, "image/png");

        let text = dir.path().join("notes.png");
        std::fs::write(&text, "definitely not a picture").unwrap();
        assert!(load_image(&text).is_err());
    }

    #[test]
    fn test_message_line_flattens_and_truncates() {
        let short = Message::new(MessageRole::User, "line one\nline two".into());
        assert_eq!(message_line(&short), "👤 You: line one line two");

        let long = Message::new(MessageRole::Assistant, "x".repeat(100));
        let line = message_line(&long);
        assert!(line.starts_with("🤖 Gemini: "));
        assert!(line.ends_with("..."));
    }
}
