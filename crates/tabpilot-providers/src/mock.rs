//! Mock LLM Provider for Testing
//!
//! A configurable provider that replays queued responses in order and
//! records every request it receives, so tests can drive the tool loop
//! without a network.
//!
//! # Example
//!
//! ```rust,ignore
//! use tabpilot_providers::mock::{MockProvider, MockResponse};
//!
//! // Final answer
//! let provider = MockProvider::new()
//!     .with_response(MockResponse::text("Hello, world!"));
//!
//! // JSON tool call followed by an answer
//! let provider = MockProvider::new().with_responses(vec![
//!     MockResponse::tool_call("list_tabs", json!({})),
//!     MockResponse::text("You have 3 tabs open."),
//! ]);
//! ```

use crate::{CompletionRequest, CompletionResponse, LLMProvider, Usage};
use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A mock response that can be configured for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Raw text the model "answers" with; `None` makes the call fail
    pub content: Option<String>,
    /// Error message returned when `content` is `None`
    pub error: Option<String>,
    /// Usage stats to report
    pub usage: Usage,
    /// Time to wait before answering
    pub delay: Option<Duration>,
}

impl MockResponse {
    /// Create a simple text response
    pub fn text(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            error: None,
            usage: Usage {
                prompt_tokens: 100,
                completion_tokens: content.len() as u32 / 4,
                total_tokens: 100 + content.len() as u32 / 4,
            },
            delay: None,
        }
    }

    /// A single JSON tool call, `{"tool": ..., <args>}`
    pub fn tool_call(tool: &str, args: serde_json::Value) -> Self {
        let mut object = serde_json::Map::new();
        object.insert("tool".to_string(), serde_json::Value::String(tool.to_string()));
        if let serde_json::Value::Object(fields) = args {
            object.extend(fields);
        }
        Self::text(&serde_json::Value::Object(object).to_string())
    }

    /// Several tool calls emitted as one JSON array
    pub fn tool_calls(calls: Vec<(&str, serde_json::Value)>) -> Self {
        let entries: Vec<serde_json::Value> = calls
            .into_iter()
            .map(|(tool, args)| {
                let mut object = serde_json::Map::new();
                object.insert("tool".to_string(), serde_json::Value::String(tool.to_string()));
                if let serde_json::Value::Object(fields) = args {
                    object.extend(fields);
                }
                serde_json::Value::Object(object)
            })
            .collect();
        Self::text(&serde_json::Value::Array(entries).to_string())
    }

    /// Simulate a transport or API failure
    pub fn error(message: &str) -> Self {
        Self {
            content: None,
            error: Some(message.to_string()),
            usage: Usage::default(),
            delay: None,
        }
    }

    /// Builder: answer only after `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Builder: set custom usage
    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}

/// A mock LLM provider for testing
///
/// The provider maintains a queue of responses that are returned in order.
/// It also tracks all requests made for verification in tests.
#[derive(Clone)]
pub struct MockProvider {
    name: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    /// Queue of responses to return (FIFO)
    responses: Arc<Mutex<Vec<MockResponse>>>,
    /// All requests received (for verification)
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
    /// Default response when queue is empty
    default_response: Option<MockResponse>,
}

impl MockProvider {
    /// Create a new mock provider with default settings
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            model: "mock-model".to_string(),
            max_tokens: 2048,
            temperature: 0.0,
            responses: Arc::new(Mutex::new(Vec::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            default_response: None,
        }
    }

    /// Set the provider name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the model name
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    /// Add a response to the queue
    pub fn with_response(self, response: MockResponse) -> Self {
        self.responses.lock().unwrap().push(response);
        self
    }

    /// Add multiple responses to the queue
    pub fn with_responses(self, responses: Vec<MockResponse>) -> Self {
        self.responses.lock().unwrap().extend(responses);
        self
    }

    /// Set a default response when queue is empty
    pub fn with_default_response(mut self, response: MockResponse) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Get all requests that were made to this provider
    pub fn get_requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of requests made
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Clear recorded requests
    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    /// Get the next response from the queue (or default)
    fn next_response(&self) -> MockResponse {
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            self.default_response
                .clone()
                .unwrap_or_else(|| MockResponse::text("Mock response (no responses configured)"))
        } else {
            responses.remove(0)
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LLMProvider for MockProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().unwrap().push(request);

        let response = self.next_response();

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }

        match response.content {
            Some(content) => Ok(CompletionResponse {
                content,
                usage: response.usage,
                model: self.model.clone(),
            }),
            None => Err(anyhow::anyhow!(response
                .error
                .unwrap_or_else(|| "Mock provider error".to_string()))),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    fn temperature(&self) -> f32 {
        self.temperature
    }
}

// ============================================================================
// Preset Scenarios for Common Test Cases
// ============================================================================

/// Preset scenarios for common testing patterns
pub mod scenarios {
    use super::*;

    /// Create a provider that returns a simple text response
    pub fn text_only_response(text: &str) -> MockProvider {
        MockProvider::new().with_response(MockResponse::text(text))
    }

    /// Create a provider for multi-turn conversation
    /// Each call returns the next response in sequence
    pub fn multi_turn(responses: Vec<&str>) -> MockProvider {
        let mock_responses: Vec<MockResponse> =
            responses.into_iter().map(MockResponse::text).collect();
        MockProvider::new().with_responses(mock_responses)
    }

    /// 1. First call: returns a JSON tool call
    /// 2. Second call: returns the final answer
    pub fn tool_then_response(
        tool: &str,
        args: serde_json::Value,
        final_response: &str,
    ) -> MockProvider {
        MockProvider::new().with_responses(vec![
            MockResponse::tool_call(tool, args),
            MockResponse::text(final_response),
        ])
    }

    /// A model that never stops calling tools
    pub fn endless_tool_calls(tool: &str) -> MockProvider {
        MockProvider::new().with_default_response(MockResponse::tool_call(
            tool,
            serde_json::json!({}),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Message, MessageRole};

    fn request(text: &str) -> CompletionRequest {
        CompletionRequest::new(vec![Message::new(MessageRole::User, text.to_string())])
    }

    #[tokio::test]
    async fn test_mock_provider_text_response() {
        let provider = MockProvider::new().with_response(MockResponse::text("Hello, world!"));

        let response = provider.complete(request("hi")).await.unwrap();
        assert_eq!(response.content, "Hello, world!");
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_multi_turn() {
        let provider = scenarios::multi_turn(vec!["First response", "Second response"]);

        let response1 = provider.complete(request("a")).await.unwrap();
        assert_eq!(response1.content, "First response");

        let response2 = provider.complete(request("b")).await.unwrap();
        assert_eq!(response2.content, "Second response");

        let fallback = provider.complete(request("c")).await.unwrap();
        assert!(fallback.content.contains("no responses configured"));
    }

    #[tokio::test]
    async fn test_mock_provider_tool_call_is_json_text() {
        let provider = scenarios::tool_then_response(
            "open_url",
            serde_json::json!({"url": "https://example.com"}),
            "Done",
        );

        let first = provider.complete(request("open it")).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&first.content).unwrap();
        assert_eq!(parsed["tool"], "open_url");
        assert_eq!(parsed["url"], "https://example.com");

        let second = provider.complete(request("next")).await.unwrap();
        assert_eq!(second.content, "Done");
    }

    #[tokio::test]
    async fn test_mock_provider_error() {
        let provider = MockProvider::new().with_response(MockResponse::error("quota exceeded"));

        let err = provider.complete(request("hi")).await.unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
    }

    #[tokio::test]
    async fn test_mock_provider_request_tracking() {
        let provider = MockProvider::new().with_default_response(MockResponse::text("OK"));

        provider.complete(request("Hello")).await.unwrap();
        provider.complete(request("World")).await.unwrap();

        let requests = provider.get_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages[0].content, "Hello");
        assert_eq!(requests[1].messages[0].content, "World");

        provider.clear_requests();
        assert_eq!(provider.request_count(), 0);
    }
}
