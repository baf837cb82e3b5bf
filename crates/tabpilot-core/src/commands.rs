//! Slash commands that expand into prompts or trigger chat actions.

use tabpilot_browser::{PageContent, PageContentProvider};

const TRANSLATE_EXCERPT_CHARS: usize = 3000;
const EXPLAIN_EXCERPT_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCommand {
    Summarize,
    Translate,
    Explain,
    Code,
    Compare,
    Clear,
    Export,
    Help,
    Search,
    Image,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub aliases: &'static [&'static str],
    pub requires_page_content: bool,
    pub kind: BuiltinCommand,
}

/// What running a command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Text to place in the input for the user to review and send
    Prompt(String),
    /// Text to show without sending anything
    Info(String),
    NewChat,
    Export,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput<'a> {
    NotCommand,
    Unknown(String),
    Command {
        spec: &'a CommandSpec,
        args: Vec<String>,
    },
}

/// What a command may look at while it runs.
#[derive(Default)]
pub struct CommandContext<'a> {
    pub page: Option<&'a dyn PageContentProvider>,
    pub selected_text: Option<String>,
}

impl CommandContext<'_> {
    /// The active page, when one could be read.
    async fn page_content(&self) -> Option<PageContent> {
        let page = self.page?.page_content().await;
        page.success.then_some(page)
    }
}

pub fn unknown_command_message(name: &str) -> String {
    format!(
        "Unknown command: /{}. Type /help for available commands.",
        name
    )
}

pub struct CommandRegistry {
    commands: Vec<CommandSpec>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: vec![
                builtin(
                    "summarize",
                    "Summarize the current page or text",
                    "📝",
                    &["sum", "tldr"],
                    true,
                    BuiltinCommand::Summarize,
                ),
                builtin(
                    "translate",
                    "Translate page or text to another language",
                    "🌐",
                    &["trans"],
                    false,
                    BuiltinCommand::Translate,
                ),
                builtin(
                    "explain",
                    "Explain technical concepts in simple terms",
                    "💡",
                    &["eli5"],
                    false,
                    BuiltinCommand::Explain,
                ),
                builtin(
                    "code",
                    "Activate expert coding mode",
                    "💻",
                    &["dev", "program"],
                    false,
                    BuiltinCommand::Code,
                ),
                builtin(
                    "compare",
                    "Compare multiple tabs or texts",
                    "🔀",
                    &["diff", "contrast"],
                    false,
                    BuiltinCommand::Compare,
                ),
                builtin(
                    "clear",
                    "Clear current conversation",
                    "🗑️",
                    &["reset", "new"],
                    false,
                    BuiltinCommand::Clear,
                ),
                builtin(
                    "export",
                    "Export current conversation",
                    "💾",
                    &["save", "download"],
                    false,
                    BuiltinCommand::Export,
                ),
                builtin(
                    "help",
                    "Show available commands",
                    "❓",
                    &["commands", "?"],
                    false,
                    BuiltinCommand::Help,
                ),
                builtin(
                    "search",
                    "Search the web (coming soon)",
                    "🔍",
                    &[],
                    false,
                    BuiltinCommand::Search,
                ),
                builtin(
                    "image",
                    "Analyze an image (coming soon)",
                    "🖼️",
                    &["img", "picture"],
                    false,
                    BuiltinCommand::Image,
                ),
            ],
        }
    }

    /// Look up by name first, then by alias.
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.commands
            .iter()
            .find(|c| c.name == name)
            .or_else(|| self.commands.iter().find(|c| c.aliases.contains(&name)))
    }

    pub fn all(&self) -> &[CommandSpec] {
        &self.commands
    }

    /// Commands whose name or any alias starts with `prefix` (case-insensitive).
    pub fn search(&self, prefix: &str) -> Vec<&CommandSpec> {
        let prefix = prefix.to_lowercase();
        self.commands
            .iter()
            .filter(|c| {
                c.name.to_lowercase().starts_with(&prefix)
                    || c.aliases.iter().any(|a| a.to_lowercase().starts_with(&prefix))
            })
            .collect()
    }

    pub fn parse<'a>(&'a self, input: &str) -> ParsedInput<'a> {
        let trimmed = input.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return ParsedInput::NotCommand;
        };

        let mut parts = rest.split_whitespace();
        let name = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<String> = parts.map(str::to_string).collect();

        match self.get(&name) {
            Some(spec) => ParsedInput::Command { spec, args },
            None => ParsedInput::Unknown(name),
        }
    }

    pub fn help_text(&self) -> String {
        let mut help = String::from("**Available Commands:**\n\n");
        for command in &self.commands {
            help.push_str(&format!(
                "{} **/{}** - {}",
                command.icon, command.name, command.description
            ));
            if !command.aliases.is_empty() {
                help.push_str(&format!(" (aliases: /{})", command.aliases.join(", /")));
            }
            help.push('\n');
        }
        help.push_str("\n*Tip: Type / to see command suggestions*");
        help
    }

    pub async fn execute(
        &self,
        spec: &CommandSpec,
        args: &[String],
        context: &CommandContext<'_>,
    ) -> CommandOutcome {
        let joined = args.join(" ");

        match spec.kind {
            BuiltinCommand::Summarize => match context.page_content().await {
                Some(page) => CommandOutcome::Prompt(format!(
                    "Please provide a concise summary of this page in bullet points:\n\n[Page Context]\nTitle: {}\nURL: {}\n\nContent:\n{}",
                    page.title, page.url, page.content
                )),
                None => CommandOutcome::Info(
                    "Unable to access page content. Please make sure you're on a valid webpage."
                        .to_string(),
                ),
            },
            BuiltinCommand::Translate => {
                let target = if joined.is_empty() { "English" } else { joined.as_str() };
                if let Some(selected) = context.selected_text.as_deref().filter(|s| !s.is_empty()) {
                    return CommandOutcome::Prompt(format!(
                        "Translate the following text to {}:\n\n{}",
                        target, selected
                    ));
                }
                match context.page_content().await {
                    Some(page) => CommandOutcome::Prompt(format!(
                        "Translate the main content of this page to {}:\n\n[Page Content]\n{}",
                        target,
                        excerpt(&page.content, TRANSLATE_EXCERPT_CHARS)
                    )),
                    None => CommandOutcome::Prompt(format!(
                        "Please provide the text you want to translate to {}.",
                        target
                    )),
                }
            }
            BuiltinCommand::Explain => {
                if !joined.is_empty() {
                    return CommandOutcome::Prompt(format!(
                        "Explain \"{}\" in simple, easy-to-understand terms as if explaining to a beginner.",
                        joined
                    ));
                }
                match context.page_content().await {
                    Some(page) => CommandOutcome::Prompt(format!(
                        "Explain the main concepts on this page in simple terms:\n\n[Page: {}]\n{}",
                        page.title,
                        excerpt(&page.content, EXPLAIN_EXCERPT_CHARS)
                    )),
                    None => {
                        CommandOutcome::Prompt("What would you like me to explain?".to_string())
                    }
                }
            }
            BuiltinCommand::Code => {
                let request = if joined.is_empty() {
                    "Help me with coding"
                } else {
                    joined.as_str()
                };
                CommandOutcome::Prompt(format!(
                    "[CODING MODE ACTIVATED]\n\n{}\n\n(Please provide clean, well-documented code with explanations. Focus on best practices and modern standards.)",
                    request
                ))
            }
            BuiltinCommand::Compare => CommandOutcome::Prompt(
                "Please describe what you'd like to compare. (Multi-tab comparison coming soon!)"
                    .to_string(),
            ),
            BuiltinCommand::Clear => CommandOutcome::NewChat,
            BuiltinCommand::Export => CommandOutcome::Export,
            BuiltinCommand::Help => CommandOutcome::Info(self.help_text()),
            BuiltinCommand::Search => {
                if joined.is_empty() {
                    CommandOutcome::Prompt("What would you like to search for?".to_string())
                } else {
                    CommandOutcome::Prompt(format!(
                        "I'll search for: \"{}\" (Web search integration coming soon!)",
                        joined
                    ))
                }
            }
            BuiltinCommand::Image => CommandOutcome::Info(
                "Image analysis feature coming soon! You'll be able to upload and analyze images."
                    .to_string(),
            ),
        }
    }
}

fn builtin(
    name: &'static str,
    description: &'static str,
    icon: &'static str,
    aliases: &'static [&'static str],
    requires_page_content: bool,
    kind: BuiltinCommand,
) -> CommandSpec {
    CommandSpec {
        name,
        description,
        icon,
        aliases,
        requires_page_content,
        kind,
    }
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabpilot_browser::MemoryHost;

    fn command<'a>(registry: &'a CommandRegistry, input: &str) -> (&'a CommandSpec, Vec<String>) {
        match registry.parse(input) {
            ParsedInput::Command { spec, args } => (spec, args),
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[test]
    fn test_lookup_by_name_and_alias() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.get("summarize").unwrap().kind, BuiltinCommand::Summarize);
        assert_eq!(registry.get("tldr").unwrap().kind, BuiltinCommand::Summarize);
        assert_eq!(registry.get("?").unwrap().kind, BuiltinCommand::Help);
        assert!(registry.get("launch").is_none());
        assert_eq!(registry.all().len(), 10);
    }

    #[test]
    fn test_prefix_search_covers_aliases() {
        let registry = CommandRegistry::new();
        let names: Vec<&str> = registry.search("S").iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["summarize", "export", "search"]);

        let names: Vec<&str> = registry.search("di").iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["compare"]);
    }

    #[test]
    fn test_parse() {
        let registry = CommandRegistry::new();
        assert_eq!(registry.parse("hello /there"), ParsedInput::NotCommand);
        assert_eq!(registry.parse("/nope x"), ParsedInput::Unknown("nope".into()));
        assert_eq!(
            unknown_command_message("nope"),
            "Unknown command: /nope. Type /help for available commands."
        );

        let (spec, args) = command(&registry, "  /TRANSLATE   to   French ");
        assert_eq!(spec.name, "translate");
        assert_eq!(args, vec!["to", "French"]);
    }

    #[test]
    fn test_help_lists_aliases() {
        let help = CommandRegistry::new().help_text();
        assert!(help.starts_with(
            "**Available Commands:**\n\n📝 **/summarize** - Summarize the current page or text (aliases: /sum, /tldr)\n"
        ));
        assert!(help.contains("🔍 **/search** - Search the web (coming soon)\n"));
        assert!(help.ends_with("\n*Tip: Type / to see command suggestions*"));
    }

    #[tokio::test]
    async fn test_summarize_uses_page() {
        let registry = CommandRegistry::new();
        let host = MemoryHost::new()
            .with_tab("Rust", "https://rust-lang.org")
            .with_page_text(1, "", "Fast and safe");
        let context = CommandContext {
            page: Some(&host),
            selected_text: None,
        };

        let (spec, args) = command(&registry, "/sum");
        let outcome = registry.execute(spec, &args, &context).await;
        assert_eq!(
            outcome,
            CommandOutcome::Prompt(
                "Please provide a concise summary of this page in bullet points:\n\n[Page Context]\nTitle: Rust\nURL: https://rust-lang.org\n\nContent:\nFast and safe".into()
            )
        );
    }

    #[tokio::test]
    async fn test_summarize_without_page() {
        let registry = CommandRegistry::new();
        let (spec, args) = command(&registry, "/summarize");
        let outcome = registry.execute(spec, &args, &CommandContext::default()).await;
        assert!(matches!(
            outcome,
            CommandOutcome::Info(text) if text.starts_with("Unable to access page content")
        ));
    }

    #[tokio::test]
    async fn test_translate_prefers_selection() {
        let registry = CommandRegistry::new();
        let context = CommandContext {
            page: None,
            selected_text: Some("Hola".into()),
        };
        let (spec, args) = command(&registry, "/trans German");
        assert_eq!(
            registry.execute(spec, &args, &context).await,
            CommandOutcome::Prompt("Translate the following text to German:\n\nHola".into())
        );

        let (spec, args) = command(&registry, "/translate");
        assert_eq!(
            registry.execute(spec, &args, &CommandContext::default()).await,
            CommandOutcome::Prompt(
                "Please provide the text you want to translate to English.".into()
            )
        );
    }

    #[tokio::test]
    async fn test_explain_truncates_page_excerpt() {
        let registry = CommandRegistry::new();
        let long = "word ".repeat(1000);
        let host = MemoryHost::new()
            .with_tab("Long", "https://long.example")
            .with_page_text(1, "", &long);
        let context = CommandContext {
            page: Some(&host),
            selected_text: None,
        };

        let (spec, args) = command(&registry, "/eli5");
        let CommandOutcome::Prompt(prompt) = registry.execute(spec, &args, &context).await else {
            panic!("expected a prompt");
        };
        let body = prompt.split_once("[Page: Long]\n").unwrap().1;
        assert_eq!(body.chars().count(), EXPLAIN_EXCERPT_CHARS);
    }

    #[tokio::test]
    async fn test_action_commands() {
        let registry = CommandRegistry::new();
        let context = CommandContext::default();

        let (spec, args) = command(&registry, "/reset");
        assert_eq!(registry.execute(spec, &args, &context).await, CommandOutcome::NewChat);
        let (spec, args) = command(&registry, "/download");
        assert_eq!(registry.execute(spec, &args, &context).await, CommandOutcome::Export);
        let (spec, args) = command(&registry, "/code a parser");
        let CommandOutcome::Prompt(prompt) = registry.execute(spec, &args, &context).await else {
            panic!("expected a prompt");
        };
        assert!(prompt.starts_with("[CODING MODE ACTIVATED]\n\na parser\n\n"));
    }
}
