//! Google Gemini provider implementation for the tabpilot-providers crate.
//!
//! Talks to the `generateContent` endpoint of the Generative Language API.
//! Tool calls are not sent as native function declarations: the model is
//! taught the tool catalogue through the system instruction and answers with
//! JSON text, which the core crate classifies.
//!
//! # Usage
//!
//! ```rust,no_run
//! use tabpilot_providers::{GeminiProvider, LLMProvider, CompletionRequest, Message, MessageRole};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let provider = GeminiProvider::new(
//!         "your-api-key".to_string(),
//!         Some("gemini-2.0-flash-exp".to_string()),
//!         None,
//!     )?;
//!
//!     let request = CompletionRequest::new(vec![
//!         Message::new(MessageRole::System, "You are a helpful assistant.".to_string()),
//!         Message::new(MessageRole::User, "Hello! How are you?".to_string()),
//!     ]);
//!
//!     let response = provider.complete(request).await?;
//!     println!("Response: {}", response.content);
//!
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    CompletionRequest, CompletionResponse, GenerationSettings, LLMProvider, Message, MessageRole,
    Usage,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

// ============================================================================
// Provider Struct
// ============================================================================

#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    generation: GenerationSettings,
    base_url: String,
    name: String,
}

impl GeminiProvider {
    pub fn new(
        api_key: String,
        model: Option<String>,
        generation: Option<GenerationSettings>,
    ) -> Result<Self> {
        Self::new_with_name("gemini".to_string(), api_key, model, generation)
    }

    pub fn new_with_name(
        name: String,
        api_key: String,
        model: Option<String>,
        generation: Option<GenerationSettings>,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            anyhow::bail!("Gemini API key is not configured");
        }

        Ok(Self {
            client: Client::new(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation: generation.unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            name,
        })
    }

    /// Point the provider at a different API root (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn get_api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    pub fn generation(&self) -> GenerationSettings {
        self.generation
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

/// Gemini API request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
    /// Parts we never produce and ignore on the way back (function calls, etc.)
    Other(serde_json::Value),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

impl From<GenerationSettings> for GeminiGenerationConfig {
    fn from(settings: GenerationSettings) -> Self {
        Self {
            temperature: settings.temperature,
            top_k: settings.top_k,
            top_p: settings.top_p,
            max_output_tokens: settings.max_output_tokens,
        }
    }
}

/// Gemini API response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
    usage_metadata: Option<GeminiUsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
    total_token_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: Option<String>,
}

// ============================================================================
// Message Conversion
// ============================================================================

/// Convert messages to Gemini format
///
/// - Gemini uses "model" instead of "assistant"
/// - System messages are joined into system_instruction, not contents
/// - Images ride along as inlineData parts after the text
fn convert_messages(request: &CompletionRequest) -> (Vec<GeminiContent>, Option<GeminiContent>) {
    let contents = request
        .messages
        .iter()
        .filter(|msg| msg.role != MessageRole::System)
        .map(convert_message)
        .collect();

    let system_instruction = request
        .system_instruction()
        .filter(|text| !text.trim().is_empty())
        .map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart::Text { text }],
        });

    (contents, system_instruction)
}

fn convert_message(msg: &Message) -> GeminiContent {
    let role = match msg.role {
        MessageRole::Assistant => "model",
        _ => "user",
    };

    let mut parts = vec![GeminiPart::Text {
        text: msg.content.clone(),
    }];
    parts.extend(msg.images.iter().map(|image| GeminiPart::InlineData {
        inline_data: GeminiInlineData {
            mime_type: image.media_type.clone(),
            data: image.data.clone(),
        },
    }));

    GeminiContent {
        role: Some(role.to_string()),
        parts,
    }
}

/// Text of the first candidate's first part, if there is one.
fn extract_text(response: &GeminiResponse) -> Option<String> {
    let content = response.candidates.as_ref()?.first()?.content.as_ref()?;
    match content.parts.first()? {
        GeminiPart::Text { text } => Some(text.clone()),
        _ => None,
    }
}

fn convert_usage(metadata: Option<&GeminiUsageMetadata>) -> Usage {
    match metadata {
        Some(m) => Usage {
            prompt_tokens: m.prompt_token_count.unwrap_or(0),
            completion_tokens: m.candidates_token_count.unwrap_or(0),
            total_tokens: m.total_token_count.unwrap_or(0),
        },
        None => Usage::default(),
    }
}

/// Turn a non-2xx body into a readable message, preferring `error.message`.
fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    serde_json::from_str::<GeminiErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| format!("Gemini API error ({}): {}", status, body))
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

impl GeminiProvider {
    fn build_request(&self, request: &CompletionRequest) -> GeminiRequest {
        let (contents, system_instruction) = convert_messages(request);
        GeminiRequest {
            contents,
            system_instruction,
            generation_config: request.generation.unwrap_or(self.generation).into(),
        }
    }
}

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let gemini_request = self.build_request(&request);

        debug!(
            "Gemini request: model={} contents={}",
            self.model,
            gemini_request.contents.len()
        );

        let response = self
            .client
            .post(self.get_api_url())
            .header("Content-Type", "application/json")
            .json(&gemini_request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            error!("Gemini API error ({}): {}", status, error_text);
            anyhow::bail!(describe_api_error(status, &error_text));
        }

        let gemini_response: GeminiResponse = response.json().await?;
        debug!("Gemini response: {:?}", gemini_response);

        let content = extract_text(&gemini_response)
            .ok_or_else(|| anyhow::anyhow!("No response from API"))?;

        Ok(CompletionResponse {
            content,
            usage: convert_usage(gemini_response.usage_metadata.as_ref()),
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.generation.max_output_tokens
    }

    fn temperature(&self) -> f32 {
        self.generation.temperature
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
