//! tabpilot CLI - terminal client for the tabpilot browser assistant.

mod browser;
mod cli_args;
mod commands;
mod completion;
mod interactive;
mod observer;
mod status;

use anyhow::{Context as _, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use tabpilot_config::{Config, PersonaPreset};
use tabpilot_core::context::ContextBuilder;
use tabpilot_core::{
    build_system_instructions, validate_tool_catalogue, ChatSession, ConversationStore,
    ToolExecutor, ToolLoop, TOOL_CATALOGUE,
};
use tabpilot_providers::{GeminiProvider, GenerationSettings, LLMProvider, ProviderRegistry};

pub use cli_args::Cli;
use clap::Parser;

use browser::Browser;
use interactive::{run_interactive, run_turn};
use observer::ConsoleObserver;

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let config = Config::load_with_overrides(
        cli.config.as_deref(),
        cli.provider.clone(),
        cli.model.clone(),
    )?;
    validate_tool_catalogue(TOOL_CATALOGUE)?;

    let (provider, generation) = create_provider(&config)?;

    let browser = if cli.no_browser {
        Browser::in_memory()
    } else {
        Browser::start(&config.webdriver, cli.headless).await?
    };

    let result = run_session(&cli, &config, provider, generation, &browser).await;
    browser.shutdown().await;
    result
}

// --- Helper functions ---

fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for target in [
        "tabpilot",
        "tabpilot_cli",
        "tabpilot_core",
        "tabpilot_providers",
        "tabpilot_config",
        "tabpilot_browser",
    ] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();
}

fn create_provider(config: &Config) -> Result<(Arc<dyn LLMProvider>, GenerationSettings)> {
    let (name, gemini) = config.get_default_provider_config()?;
    let api_key = gemini.resolved_api_key().with_context(|| {
        format!(
            "No Gemini API key: set providers.gemini.{}.api_key or the {} environment variable",
            name,
            tabpilot_config::API_KEY_ENV
        )
    })?;

    let generation = GenerationSettings {
        temperature: gemini.temperature,
        top_k: gemini.top_k,
        top_p: gemini.top_p,
        max_output_tokens: gemini.max_tokens,
    };

    let mut registry = ProviderRegistry::new();
    registry.register(GeminiProvider::new_with_name(
        format!("gemini.{}", name),
        api_key,
        Some(gemini.model.clone()),
        Some(generation),
    )?);
    let provider = registry.get(None)?;
    info!("Using {} ({})", provider.name(), provider.model());

    Ok((provider, generation))
}

/// Persona text: `--persona` wins over the configured instructions.
fn persona_instructions(cli: &Cli, config: &Config) -> Result<String> {
    match cli.persona.as_deref() {
        Some(name) => PersonaPreset::from_name(name)
            .map(|preset| preset.instructions().to_string())
            .ok_or_else(|| {
                let names: Vec<&str> = PersonaPreset::ALL.iter().map(|p| p.name()).collect();
                anyhow::anyhow!("Unknown persona '{}'. Available: {}", name, names.join(", "))
            }),
        None => Ok(config.agent.system_instructions.clone()),
    }
}

fn open_store(config: &Config) -> Result<Arc<ConversationStore>> {
    let store = ConversationStore::new(config.history.resolved_path());
    debug!("Conversation store at {}", store.path().display());

    store.migrate_legacy()?;
    store.cleanup(config.history.keep_count)?;
    Ok(Arc::new(store))
}

async fn run_session(
    cli: &Cli,
    config: &Config,
    provider: Arc<dyn LLMProvider>,
    generation: GenerationSettings,
    browser: &Browser,
) -> Result<()> {
    let instructions = build_system_instructions(&persona_instructions(cli, config)?);
    let tool_loop = ToolLoop::new(
        provider,
        ToolExecutor::new(browser.tabs(), browser.dom()),
        ContextBuilder::new(instructions).with_generation(generation),
    )
    .with_max_iterations(config.agent.max_iterations)
    .with_request_timeout(Duration::from_secs(config.agent.request_timeout_seconds))
    .with_observer(Arc::new(ConsoleObserver));

    let session = ChatSession::open(
        tool_loop,
        open_store(config)?,
        Duration::from_millis(config.agent.autosave_debounce_ms),
    )?
    .with_page_provider(browser.page())
    .with_page_context(cli.page_context || config.agent.include_page_context);

    match cli.message.as_deref() {
        Some(message) => {
            run_turn(&session, session.send(message, Vec::new())).await;
            session.shutdown().await;
            Ok(())
        }
        None => run_interactive(session, browser.page()).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_flag_overrides_config() {
        let mut config = Config::default();
        config.agent.system_instructions = "Answer in French.".to_string();

        let cli = Cli::try_parse_from(["tabpilot"]).unwrap();
        assert_eq!(persona_instructions(&cli, &config).unwrap(), "Answer in French.");

        let cli = Cli::try_parse_from(["tabpilot", "--persona", "Teacher"]).unwrap();
        assert_eq!(
            persona_instructions(&cli, &config).unwrap(),
            PersonaPreset::Teacher.instructions()
        );

        let cli = Cli::try_parse_from(["tabpilot", "--persona", "pirate"]).unwrap();
        let err = persona_instructions(&cli, &config).unwrap_err();
        assert!(err.to_string().contains("Unknown persona 'pirate'"));
    }

    #[test]
    fn test_create_provider_uses_configured_key() {
        let mut config = Config::default();
        if let Some(gemini) = config.providers.gemini.get_mut("default") {
            gemini.api_key = "test-key".to_string();
            gemini.model = "gemini-1.5-flash".to_string();
            gemini.top_k = 20;
        }

        let (provider, generation) = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gemini.default");
        assert_eq!(provider.model(), "gemini-1.5-flash");
        assert_eq!(generation.top_k, 20);
        assert_eq!(generation.max_output_tokens, 2048);
    }

    #[test]
    fn test_open_store_trims_to_keep_count() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.history.path = Some(dir.path().join("chats.json").display().to_string());
        config.history.keep_count = 2;

        let seed = ConversationStore::new(config.history.resolved_path());
        for title in ["one", "two", "three"] {
            seed.create(title, Vec::new()).unwrap();
        }

        let store = open_store(&config).unwrap();
        assert_eq!(store.all().unwrap().len(), 2);
    }
}
