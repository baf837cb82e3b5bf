//! Integration tests for the Gemini provider against a local fake endpoint.
//!
//! What this test protects:
//! - The request hits `models/<model>:generateContent?key=<key>`
//! - The body carries contents, systemInstruction and generationConfig
//! - Non-2xx bodies surface `error.message` as the error text
//! - A response without text becomes "No response from API"

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tabpilot_providers::{CompletionRequest, GeminiProvider, LLMProvider, Message, MessageRole};

#[derive(Clone)]
struct FakeGemini {
    status: StatusCode,
    reply: Value,
    seen: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn generate(
    State(fake): State<FakeGemini>,
    uri: Uri,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.seen.lock().unwrap().push((uri.to_string(), body));
    (fake.status, Json(fake.reply.clone()))
}

/// Start a fake endpoint and return its base URL plus the captured requests.
async fn serve(status: StatusCode, reply: Value) -> (String, Arc<Mutex<Vec<(String, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().fallback(generate).with_state(FakeGemini {
        status,
        reply,
        seen: seen.clone(),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), seen)
}

fn provider(base_url: &str) -> GeminiProvider {
    GeminiProvider::new("secret".to_string(), Some("gemini-test".to_string()), None)
        .unwrap()
        .with_base_url(base_url)
}

#[tokio::test]
async fn test_complete_sends_expected_request() {
    let (base, seen) = serve(
        StatusCode::OK,
        json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hi!"}]}}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 2, "totalTokenCount": 9}
        }),
    )
    .await;

    let request = CompletionRequest::new(vec![
        Message::new(MessageRole::System, "Be brief.".to_string()),
        Message::new(MessageRole::User, "Hello".to_string()),
        Message::new(MessageRole::Assistant, "Hey".to_string()),
        Message::new(MessageRole::User, "How are you?".to_string()),
    ]);

    let response = provider(&base).complete(request).await.unwrap();
    assert_eq!(response.content, "Hi!");
    assert_eq!(response.usage.total_tokens, 9);
    assert_eq!(response.model, "gemini-test");

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let (uri, body) = &seen[0];
    assert_eq!(uri, "/models/gemini-test:generateContent?key=secret");
    assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Be brief.");
    let roles: Vec<&str> = body["contents"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, vec!["user", "model", "user"]);
    assert_eq!(body["generationConfig"]["topK"], 40);
    assert_eq!(body["generationConfig"]["maxOutputTokens"], 2048);
}

#[tokio::test]
async fn test_api_error_message_is_surfaced() {
    let (base, _) = serve(
        StatusCode::BAD_REQUEST,
        json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key."}}),
    )
    .await;

    let request = CompletionRequest::new(vec![Message::new(MessageRole::User, "x".to_string())]);
    let err = provider(&base).complete(request).await.unwrap_err();
    assert_eq!(err.to_string(), "API key not valid. Please pass a valid API key.");
}

#[tokio::test]
async fn test_missing_candidates_is_no_response() {
    let (base, _) = serve(StatusCode::OK, json!({"candidates": []})).await;

    let request = CompletionRequest::new(vec![Message::new(MessageRole::User, "x".to_string())]);
    let err = provider(&base).complete(request).await.unwrap_err();
    assert_eq!(err.to_string(), "No response from API");
}
