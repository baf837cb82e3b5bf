//! Interactive mode for the tabpilot CLI.

use anyhow::Result;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use rustyline::error::ReadlineError;
use rustyline::{CompletionType, Config, Editor};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error};

use tabpilot_browser::PageContentProvider;
use tabpilot_core::commands::{
    unknown_command_message, BuiltinCommand, CommandContext, CommandOutcome, CommandRegistry,
    ParsedInput,
};
use tabpilot_core::{ChatSession, TurnError, TurnOutcome};

use crate::commands::{
    control_help, export_conversation, handle_control, last_answer_index, ControlCommand, Flow,
    PendingInput,
};
use crate::completion::TabpilotHelper;
use crate::status::{Status, StatusLine};

const HISTORY_FILE: &str = ".tabpilot_history";

/// Build the interactive prompt string.
///
/// - Plain: `"tabpilot> "`
/// - With page context on: `"tabpilot [page]> "`
/// - With attachments waiting: `"tabpilot [📎 2]> "`
///
/// ANSI codes are wrapped in \x01...\x02 so rustyline can measure the
/// visible prompt width.
pub fn build_prompt(attached_images: usize, page_context: bool) -> String {
    let mut tags = Vec::new();
    if page_context {
        tags.push("page".to_string());
    }
    if attached_images > 0 {
        tags.push(format!("📎 {}", attached_images));
    }
    if tags.is_empty() {
        return "tabpilot> ".to_string();
    }

    let blue = format!("\x01{}\x02", SetForegroundColor(Color::Blue));
    let reset = format!("\x01{}\x02", ResetColor);
    format!("tabpilot {}[{}]{}> ", blue, tags.join(" | "), reset)
}

pub async fn run_interactive(
    session: ChatSession,
    page: Arc<dyn PageContentProvider>,
) -> Result<()> {
    let registry = CommandRegistry::new();

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(TabpilotHelper::new(&registry)));

    let history_file = dirs::home_dir().map(|home| home.join(HISTORY_FILE));
    if let Some(ref path) = history_file {
        let _ = rl.load_history(path);
    }

    println!();
    println!("tabpilot browser assistant");
    println!("      >> ask anything, or type /help");
    let messages = session.messages().await;
    if !messages.is_empty() {
        StatusLine::info(&format!(
            "resuming {} ({} messages)",
            session.conversation_id().await,
            messages.len()
        ));
    }
    println!();

    let mut pending = PendingInput::default();
    let mut prefill: Option<String> = None;

    loop {
        let prompt = build_prompt(pending.images.len(), session.include_page_context());
        let readline = match prefill.take() {
            Some(text) => rl.readline_with_initial(&prompt, (text.as_str(), "")),
            None => rl.readline(&prompt),
        };

        match readline {
            Ok(line) => {
                let input = line.trim().to_string();
                if input.is_empty() {
                    continue;
                }
                rl.add_history_entry(&input)?;

                if input == "exit" || input == "quit" {
                    break;
                }

                let flow = handle_input(
                    &input,
                    &session,
                    &registry,
                    page.as_ref(),
                    &mut pending,
                    &mut prefill,
                )
                .await;
                match flow {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => StatusLine::warn(&e.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                error!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(ref path) = history_file {
        let _ = rl.save_history(path);
    }

    session.shutdown().await;
    println!("👋 Goodbye!");
    Ok(())
}

async fn handle_input(
    input: &str,
    session: &ChatSession,
    registry: &CommandRegistry,
    page: &dyn PageContentProvider,
    pending: &mut PendingInput,
    prefill: &mut Option<String>,
) -> Result<Flow> {
    if let Some(parsed) = ControlCommand::parse(input) {
        let command = match parsed {
            Ok(command) => command,
            Err(usage) => {
                StatusLine::warn(&usage);
                return Ok(Flow::Continue);
            }
        };

        if let ControlCommand::Regenerate(index) = command {
            let index = match index {
                Some(index) => Some(index),
                None => last_answer_index(&session.messages().await),
            };
            match index {
                Some(index) => run_turn(session, session.regenerate(index)).await,
                None => StatusLine::warn("Nothing to regenerate yet"),
            }
            return Ok(Flow::Continue);
        }

        return handle_control(command, session, pending).await;
    }

    match registry.parse(input) {
        ParsedInput::Unknown(name) => StatusLine::warn(&unknown_command_message(&name)),
        ParsedInput::Command { spec, args } => {
            debug!("Running /{} with {:?}", spec.name, args);
            let context = CommandContext {
                page: Some(page),
                selected_text: None,
            };
            match registry.execute(spec, &args, &context).await {
                CommandOutcome::Prompt(text) => {
                    StatusLine::info("review the prompt and press Enter to send");
                    *prefill = Some(text);
                }
                CommandOutcome::Info(text) => {
                    println!("{}", text);
                    match spec.kind {
                        BuiltinCommand::Help => println!("\n{}", control_help()),
                        BuiltinCommand::Image => {
                            StatusLine::info("attach a file with /image <path>")
                        }
                        _ => {}
                    }
                }
                CommandOutcome::NewChat => {
                    let id = session.new_chat().await?;
                    StatusLine::complete(&format!("starting new chat {}", id), Status::Done);
                }
                CommandOutcome::Export => {
                    let dir = std::env::current_dir()?;
                    let path = export_conversation(session, &dir).await?;
                    let action = format!("exporting to {}", path.display());
                    StatusLine::complete(&action, Status::Done);
                }
            }
        }
        ParsedInput::NotCommand => {
            let images = std::mem::take(&mut pending.images);
            run_turn(session, session.send(input, images)).await;
        }
    }
    Ok(Flow::Continue)
}

/// Drive one turn to completion; Ctrl-C cancels it.
pub async fn run_turn<F>(session: &ChatSession, turn: F)
where
    F: Future<Output = Result<TurnOutcome, TurnError>>,
{
    StatusLine::info("thinking");
    tokio::pin!(turn);
    let result = tokio::select! {
        result = &mut turn => result,
        _ = tokio::signal::ctrl_c() => {
            session.cancel_turn();
            turn.await
        }
    };
    print_turn_result(&result);
}

pub fn print_turn_result(result: &Result<TurnOutcome, TurnError>) {
    match result {
        Ok(outcome) => {
            println!();
            println!("{}", outcome.reply);
            println!();
        }
        Err(TurnError::Cancelled) => StatusLine::warn("Operation cancelled by user"),
        Err(e) => println!(
            "{}{}{}",
            SetForegroundColor(Color::Red),
            e.user_message(),
            ResetColor
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt_default() {
        assert_eq!(build_prompt(0, false), "tabpilot> ");
    }

    #[test]
    fn test_build_prompt_with_page_context() {
        let prompt = build_prompt(0, true);
        assert!(prompt.starts_with("tabpilot "));
        assert!(prompt.contains("[page]"));
        assert!(prompt.ends_with("> "));
    }

    #[test]
    fn test_build_prompt_with_attachments() {
        let prompt = build_prompt(2, true);
        assert!(prompt.contains("page | 📎 2"));

        let prompt = build_prompt(1, false);
        assert!(prompt.contains("[📎 1]"));
        assert!(!prompt.contains("page"));
    }
}
