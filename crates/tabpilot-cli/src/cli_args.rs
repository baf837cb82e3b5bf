//! CLI argument parsing for tabpilot.

use clap::Parser;

#[derive(Parser, Clone, Debug)]
#[command(name = "tabpilot")]
#[command(about = "A Gemini chat assistant that can drive your browser tabs")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Override the configured provider (e.g., 'gemini.default')
    #[arg(long, value_name = "PROVIDER")]
    pub provider: Option<String>,

    /// Override the model for the selected provider
    #[arg(long, value_name = "MODEL")]
    pub model: Option<String>,

    /// Run against an in-memory browser instead of Chrome
    #[arg(long)]
    pub no_browser: bool,

    /// Start Chrome headless (overrides the config file)
    #[arg(long)]
    pub headless: bool,

    /// Persona preset: helper, coder, teacher, creative or professional
    #[arg(long, value_name = "PRESET")]
    pub persona: Option<String>,

    /// Send the active page's content along with every message
    #[arg(long)]
    pub page_context: bool,

    /// Message to send (if provided, answers once and exits instead of starting a chat)
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_start_interactive_chat() {
        let cli = Cli::try_parse_from(["tabpilot"]).unwrap();
        assert!(cli.message.is_none());
        assert!(!cli.no_browser);
        assert!(!cli.page_context);
        assert!(cli.persona.is_none());
    }

    #[test]
    fn test_one_shot_message_and_overrides() {
        let cli = Cli::try_parse_from([
            "tabpilot",
            "--no-browser",
            "--model",
            "gemini-1.5-pro",
            "--persona",
            "coder",
            "list my tabs",
        ])
        .unwrap();
        assert!(cli.no_browser);
        assert_eq!(cli.model.as_deref(), Some("gemini-1.5-pro"));
        assert_eq!(cli.persona.as_deref(), Some("coder"));
        assert_eq!(cli.message.as_deref(), Some("list my tabs"));
    }
}
