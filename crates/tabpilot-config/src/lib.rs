use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Locations searched for a config file, in order
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "./tabpilot.toml",
    "~/.config/tabpilot/config.toml",
    "~/.tabpilot.toml",
];

/// Environment variable consulted when a provider has no api_key
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// System instructions longer than this still work but are flagged
pub const SYSTEM_INSTRUCTIONS_SOFT_LIMIT: usize = 1000;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub webdriver: WebDriverConfig,
}

/// Provider configuration with named configs per provider type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    /// Default provider in format "<provider_type>.<config_name>"
    pub default_provider: String,

    /// Named Gemini provider configs
    #[serde(default)]
    pub gemini: HashMap<String, GeminiConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
}

fn default_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_top_k() -> u32 {
    40
}

fn default_top_p() -> f32 {
    0.95
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            top_k: default_top_k(),
            top_p: default_top_p(),
        }
    }
}

impl GeminiConfig {
    /// The configured key, or `GEMINI_API_KEY` when the file leaves it empty.
    pub fn resolved_api_key(&self) -> Option<String> {
        if !self.api_key.trim().is_empty() {
            return Some(self.api_key.clone());
        }
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub request_timeout_seconds: u64,
    /// Persona text prepended to the tool catalogue
    pub system_instructions: String,
    pub include_page_context: bool,
    pub autosave_debounce_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            request_timeout_seconds: 60,
            system_instructions: String::new(),
            include_page_context: false,
            autosave_debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Conversation file; defaults to the platform data dir
    pub path: Option<String>,
    pub keep_count: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: None,
            keep_count: 100,
        }
    }
}

impl HistoryConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => PathBuf::from(shellexpand::tilde(path).as_ref()),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tabpilot")
                .join("conversations.json"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    pub port: u16,
    pub headless: bool,
    /// Optional path to Chrome binary (e.g., Chrome for Testing)
    /// If not set, ChromeDriver will use the default Chrome installation
    pub chrome_binary: Option<String>,
    /// Optional path to chromedriver; looked up on PATH when unset
    pub chromedriver_binary: Option<String>,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            port: 9515,
            headless: false,
            chrome_binary: None,
            chromedriver_binary: None,
        }
    }
}

/// Built-in personas selectable from the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaPreset {
    Helper,
    Coder,
    Teacher,
    Creative,
    Professional,
}

impl PersonaPreset {
    pub const ALL: [PersonaPreset; 5] = [
        PersonaPreset::Helper,
        PersonaPreset::Coder,
        PersonaPreset::Teacher,
        PersonaPreset::Creative,
        PersonaPreset::Professional,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PersonaPreset::Helper => "helper",
            PersonaPreset::Coder => "coder",
            PersonaPreset::Teacher => "teacher",
            PersonaPreset::Creative => "creative",
            PersonaPreset::Professional => "professional",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|preset| preset.name().eq_ignore_ascii_case(name))
    }

    pub fn instructions(&self) -> &'static str {
        match self {
            PersonaPreset::Helper => {
                "You are a helpful assistant. Be concise and friendly in your responses."
            }
            PersonaPreset::Coder => {
                "You are an expert programmer. Provide clear code examples with explanations. Use best practices and explain your reasoning."
            }
            PersonaPreset::Teacher => {
                "You are a patient teacher. Explain concepts step-by-step, use analogies, and check for understanding."
            }
            PersonaPreset::Creative => {
                "You are a creative writer. Use vivid language, storytelling, and imaginative ideas in your responses."
            }
            PersonaPreset::Professional => {
                "You are a professional business consultant. Be formal, precise, and data-driven in your responses."
            }
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut gemini_configs = HashMap::new();
        gemini_configs.insert("default".to_string(), GeminiConfig::default());

        Self {
            providers: ProvidersConfig {
                default_provider: "gemini.default".to_string(),
                gemini: gemini_configs,
            },
            agent: AgentConfig::default(),
            history: HistoryConfig::default(),
            webdriver: WebDriverConfig::default(),
        }
    }
}

impl Config {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config_path_to_load = match config_path {
            Some(path) if Path::new(path).exists() => Some(path.to_string()),
            Some(path) => anyhow::bail!("Config file not found: {}", path),
            None => Self::find_config_file(),
        };

        let Some(path) = config_path_to_load else {
            // No config anywhere: create one with defaults so the user can edit it
            let default_config = Self::default();
            let config_dir = dirs::home_dir()
                .map(|home| home.join(".config").join("tabpilot"))
                .unwrap_or_else(|| PathBuf::from("."));

            let config_file = config_dir.join("config.toml");
            let saved = std::fs::create_dir_all(&config_dir)
                .map_err(anyhow::Error::from)
                .and_then(|_| default_config.save(&config_file));
            match saved {
                Ok(()) => info!("Created default configuration at: {}", config_file.display()),
                Err(e) => warn!("Could not save default config: {}", e),
            }

            return Ok(default_config);
        };

        let config_content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&config_content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path, e))?;

        config.validate_provider_reference(&config.providers.default_provider)?;
        config.warn_on_long_instructions();

        Ok(config)
    }

    fn find_config_file() -> Option<String> {
        DEFAULT_CONFIG_PATHS.iter().find_map(|path| {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                Some(expanded_path.to_string())
            } else {
                None
            }
        })
    }

    fn warn_on_long_instructions(&self) {
        let len = self.agent.system_instructions.chars().count();
        if len > SYSTEM_INSTRUCTIONS_SOFT_LIMIT {
            warn!(
                "System instructions are {} characters; long instructions may reduce performance",
                len
            );
        }
    }

    /// Validate a provider reference (format: "<provider_type>.<config_name>")
    fn validate_provider_reference(&self, reference: &str) -> Result<()> {
        let (provider_type, config_name) = Self::parse_provider_reference(reference)?;

        match provider_type.as_str() {
            "gemini" => {
                if !self.providers.gemini.contains_key(&config_name) {
                    let mut available: Vec<_> = self.providers.gemini.keys().collect();
                    available.sort();
                    anyhow::bail!(
                        "Provider config 'gemini.{}' not found. Available: {:?}",
                        config_name,
                        available
                    );
                }
            }
            _ => {
                anyhow::bail!(
                    "Unknown provider type '{}'. Valid types: gemini",
                    provider_type
                );
            }
        }

        Ok(())
    }

    /// Parse a provider reference into (provider_type, config_name)
    pub fn parse_provider_reference(reference: &str) -> Result<(String, String)> {
        let parts: Vec<&str> = reference.split('.').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            anyhow::bail!(
                "Invalid provider reference '{}'. Expected format: '<provider_type>.<config_name>'",
                reference
            );
        }
        Ok((parts[0].to_string(), parts[1].to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    pub fn load_with_overrides(
        config_path: Option<&str>,
        provider_override: Option<String>,
        model_override: Option<String>,
    ) -> Result<Self> {
        let mut config = Self::load(config_path)?;

        if let Some(provider) = provider_override {
            config = config.with_provider_override(&provider)?;
        }

        // Apply model override to the active provider
        if let Some(model) = model_override {
            let (_, config_name) =
                Self::parse_provider_reference(&config.providers.default_provider)?;
            match config.providers.gemini.get_mut(&config_name) {
                Some(gemini_config) => gemini_config.model = model,
                None => anyhow::bail!("Provider config 'gemini.{}' not found.", config_name),
            }
        }

        Ok(config)
    }

    /// Create a copy of the config with a different default provider
    pub fn with_provider_override(&self, provider_ref: &str) -> Result<Self> {
        self.validate_provider_reference(provider_ref)?;

        let mut config = self.clone();
        config.providers.default_provider = provider_ref.to_string();
        Ok(config)
    }

    /// Get Gemini config by name
    pub fn get_gemini_config(&self, name: &str) -> Option<&GeminiConfig> {
        self.providers.gemini.get(name)
    }

    /// Get the current default provider's name and config
    pub fn get_default_provider_config(&self) -> Result<(String, &GeminiConfig)> {
        let (_, config_name) = Self::parse_provider_reference(&self.providers.default_provider)?;
        self.providers
            .gemini
            .get(&config_name)
            .map(|c| (config_name.clone(), c))
            .ok_or_else(|| anyhow::anyhow!("Gemini config '{}' not found", config_name))
    }
}
