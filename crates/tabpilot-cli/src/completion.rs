//! Tab completion for interactive mode.
//!
//! - `/` commands at the start of the line, both the prompt-building slash
//!   commands and the local control commands
//! - file paths after `/image` and `/import`

use rustyline::completion::{Completer, FilenameCompleter, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{Context, Helper};

use tabpilot_core::commands::CommandRegistry;

use crate::commands::CONTROL_COMMANDS;

/// Commands whose argument is a file path
const PATH_COMMANDS: [&str; 2] = ["/image ", "/import "];

pub struct TabpilotHelper {
    /// `/name` of every command, sorted and deduplicated
    commands: Vec<String>,
    file_completer: FilenameCompleter,
}

impl TabpilotHelper {
    pub fn new(registry: &CommandRegistry) -> Self {
        let mut commands: Vec<String> = registry
            .all()
            .iter()
            .map(|spec| format!("/{}", spec.name))
            .chain(CONTROL_COMMANDS.iter().map(|(name, _)| name.to_string()))
            .collect();
        commands.sort();
        commands.dedup();

        Self {
            commands,
            file_completer: FilenameCompleter::new(),
        }
    }

    fn complete_command(&self, word: &str) -> Vec<Pair> {
        self.commands
            .iter()
            .filter(|cmd| cmd.starts_with(word))
            .map(|cmd| Pair {
                display: cmd.clone(),
                replacement: cmd.clone(),
            })
            .collect()
    }
}

impl Completer for TabpilotHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        ctx: &Context<'_>,
    ) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let line_to_cursor = &line[..pos];

        if line_to_cursor.starts_with('/') && !line_to_cursor.contains(char::is_whitespace) {
            return Ok((0, self.complete_command(line_to_cursor)));
        }

        if PATH_COMMANDS.iter().any(|cmd| line_to_cursor.starts_with(cmd)) {
            return self.file_completer.complete(line, pos, ctx);
        }

        Ok((pos, vec![]))
    }
}

impl Hinter for TabpilotHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Highlighter for TabpilotHelper {}

impl Validator for TabpilotHelper {}

impl Helper for TabpilotHelper {}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper() -> TabpilotHelper {
        TabpilotHelper::new(&CommandRegistry::new())
    }

    #[test]
    fn test_completes_slash_and_control_commands() {
        let helper = helper();
        let history = rustyline::history::DefaultHistory::new();
        let ctx = Context::new(&history);

        let (start, matches) = helper.complete("/s", 2, &ctx).unwrap();
        assert_eq!(start, 0);
        let names: Vec<&str> = matches.iter().map(|m| m.replacement.as_str()).collect();
        assert_eq!(names, vec!["/screenshot", "/search", "/summarize"]);

        let (_, matches) = helper.complete("/his", 4, &ctx).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].replacement, "/history");
    }

    #[test]
    fn test_help_is_listed_once() {
        let helper = helper();
        let history = rustyline::history::DefaultHistory::new();
        let ctx = Context::new(&history);

        let (_, matches) = helper.complete("/he", 3, &ctx).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].replacement, "/help");
    }

    #[test]
    fn test_no_completion_for_regular_input() {
        let helper = helper();
        let history = rustyline::history::DefaultHistory::new();
        let ctx = Context::new(&history);

        let (start, matches) = helper.complete("open the rust blog", 18, &ctx).unwrap();
        assert_eq!(start, 18);
        assert!(matches.is_empty());

        let (_, matches) = helper.complete("/translate fr", 13, &ctx).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_image_argument_completes_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("screenshot.png"), b"x").unwrap();

        let helper = helper();
        let history = rustyline::history::DefaultHistory::new();
        let ctx = Context::new(&history);

        let line = format!("/image {}/scr", dir.path().display());
        let (_, matches) = helper.complete(&line, line.len(), &ctx).unwrap();
        assert!(matches.iter().any(|m| m.replacement.ends_with("screenshot.png")));
    }
}
