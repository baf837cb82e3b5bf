//! Builds provider requests from stored turns and the turn in progress.

use tabpilot_browser::PageContent;
use tabpilot_providers::{
    CompletionRequest, GenerationSettings, ImageContent, Message, MessageRole,
};

/// What the model sees for the current user turn.
#[derive(Debug, Clone, Default)]
pub struct TurnInput {
    pub text: String,
    pub images: Vec<ImageContent>,
}

impl TurnInput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<ImageContent>) -> Self {
        self.images = images;
        self
    }
}

/// Prefix the user's message with the scraped page. Failed scrapes leave the
/// message untouched.
pub fn compose_user_input(message: &str, page: Option<&PageContent>) -> String {
    let Some(page) = page.filter(|p| p.success) else {
        return message.to_string();
    };

    let mut composed = format!("[Page Context]\nTitle: {}\nURL: {}", page.title, page.url);
    if !page.description.trim().is_empty() {
        composed.push_str(&format!("\nDescription: {}", page.description));
    }
    composed.push_str(&format!(
        "\n\nContent:\n{}\n\n[User Question]\n{}",
        page.content, message
    ));
    composed
}

#[derive(Debug, Clone)]
pub struct ContextBuilder {
    system_instructions: String,
    generation: GenerationSettings,
}

impl ContextBuilder {
    pub fn new(system_instructions: impl Into<String>) -> Self {
        Self {
            system_instructions: system_instructions.into(),
            generation: GenerationSettings::default(),
        }
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn system_instructions(&self) -> &str {
        &self.system_instructions
    }

    pub fn set_system_instructions(&mut self, instructions: impl Into<String>) {
        self.system_instructions = instructions.into();
    }

    /// `prior` holds the stored conversation before this turn; `transcript`
    /// the turn so far, ending with the current input.
    pub fn build(&self, prior: &[Message], transcript: &[Message]) -> CompletionRequest {
        let mut messages = Vec::with_capacity(prior.len() + transcript.len() + 1);

        if !self.system_instructions.trim().is_empty() {
            messages.push(Message::new(
                MessageRole::System,
                self.system_instructions.clone(),
            ));
        }

        messages.extend(
            prior
                .iter()
                .chain(transcript.iter())
                .filter(|m| m.role != MessageRole::System)
                .cloned(),
        );

        CompletionRequest::new(messages).with_generation(self.generation)
    }
}
