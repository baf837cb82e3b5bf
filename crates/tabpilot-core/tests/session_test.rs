//! ChatSession behaviour: page context, busy guard, message operations and
//! persistence through the autosave task.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tabpilot_browser::MemoryHost;
use tabpilot_core::context::ContextBuilder;
use tabpilot_core::history::DEFAULT_TITLE;
use tabpilot_core::prompts::build_system_instructions;
use tabpilot_core::{ChatSession, ConversationStore, ToolExecutor, ToolLoop, TurnError};
use tabpilot_providers::mock::{MockProvider, MockResponse};
use tabpilot_providers::MessageRole;
use tempfile::TempDir;

struct Fixture {
    session: ChatSession,
    provider: MockProvider,
    store: Arc<ConversationStore>,
    _dir: TempDir,
}

fn fixture(provider: MockProvider) -> Fixture {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(ConversationStore::new(dir.path().join("conversations.json")));
    let host = Arc::new(
        MemoryHost::new()
            .with_tab("Rust Blog", "https://blog.rust-lang.org")
            .with_page_text(1, "News from the Rust team", "Rust 1.80 is out"),
    );
    let tool_loop = ToolLoop::new(
        Arc::new(provider.clone()),
        ToolExecutor::new(host.clone(), host.clone()),
        ContextBuilder::new(build_system_instructions("")),
    );
    let session = ChatSession::open(tool_loop, store.clone(), Duration::from_millis(10))
        .unwrap()
        .with_page_provider(host);

    Fixture {
        session,
        provider,
        store,
        _dir: dir,
    }
}

#[tokio::test]
async fn test_page_context_is_sent_but_not_stored() {
    let f = fixture(MockProvider::new().with_response(MockResponse::text("It's a release post.")));
    f.session.set_include_page_context(true);

    f.session.send("What is this page?", vec![]).await.unwrap();

    let sent = f.provider.get_requests()[0]
        .last_user_message()
        .unwrap()
        .content
        .clone();
    assert_eq!(
        sent,
        "[Page Context]\nTitle: Rust Blog\nURL: https://blog.rust-lang.org\nDescription: News from the Rust team\n\nContent:\nRust 1.80 is out\n\n[User Question]\nWhat is this page?"
    );

    let messages = f.session.messages().await;
    assert_eq!(messages[0].content, "What is this page?");
    assert_eq!(messages[1].content, "It's a release post.");

    let stored = f.session.current_conversation().await.unwrap().unwrap();
    assert_eq!(stored.messages[0].content, "What is this page?");
    assert_eq!(stored.title, "What is this page?");
}

#[tokio::test]
async fn test_prior_turns_are_sent_as_history() {
    let f = fixture(MockProvider::new().with_responses(vec![
        MockResponse::text("first answer"),
        MockResponse::text("second answer"),
    ]));

    f.session.send("first", vec![]).await.unwrap();
    f.session.send("second", vec![]).await.unwrap();

    let request = &f.provider.get_requests()[1];
    let contents: Vec<(MessageRole, &str)> = request
        .messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| (m.role, m.content.as_str()))
        .collect();
    assert_eq!(
        contents,
        vec![
            (MessageRole::User, "first"),
            (MessageRole::Assistant, "first answer"),
            (MessageRole::User, "second"),
        ]
    );
}

#[tokio::test]
async fn test_second_send_while_busy_is_rejected() {
    let f = fixture(MockProvider::new().with_default_response(
        MockResponse::text("slow").with_delay(Duration::from_millis(200)),
    ));

    let second = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.session.is_busy());
        f.session.send("again", vec![]).await
    };
    let (first, second) = tokio::join!(f.session.send("hello", vec![]), second);

    assert_eq!(first.unwrap().reply, "slow");
    assert!(matches!(second, Err(TurnError::Busy)));
    assert!(!f.session.is_busy());
    assert_eq!(f.session.messages().await.len(), 2);
}

#[tokio::test]
async fn test_cancel_turn_keeps_user_message_only() {
    let f = fixture(MockProvider::new().with_response(
        MockResponse::text("never").with_delay(Duration::from_secs(5)),
    ));

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(f.session.cancel_turn());
    };
    let (result, _) = tokio::join!(f.session.send("long question", vec![]), cancel);

    assert!(matches!(result, Err(TurnError::Cancelled)));
    assert!(!f.session.cancel_turn());
    let messages = f.session.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, MessageRole::User);
}

#[tokio::test]
async fn test_provider_error_is_not_stored() {
    let f = fixture(MockProvider::new().with_response(MockResponse::error("quota exceeded")));

    let err = f.session.send("hi", vec![]).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "Sorry, I encountered an error: quota exceeded. Please check your API key in settings."
    );
    let messages = f.session.messages().await;
    assert_eq!(messages.len(), 1);
    assert!(messages.iter().all(|m| !m.content.contains("Sorry")));
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let f = fixture(MockProvider::new());
    assert!(matches!(
        f.session.send("   ", vec![]).await,
        Err(TurnError::EmptyInput)
    ));
    assert_eq!(f.provider.request_count(), 0);
}

#[tokio::test]
async fn test_tool_turn_is_stored_as_single_exchange() {
    let f = fixture(MockProvider::new().with_responses(vec![
        MockResponse::tool_call("open_url", json!({"url": "https://docs.rs"})),
        MockResponse::text("Opened docs.rs"),
    ]));

    let outcome = f.session.send("open docs.rs", vec![]).await.unwrap();
    assert_eq!(outcome.tool_results.len(), 1);

    let messages = f.session.messages().await;
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["open docs.rs", "Opened docs.rs"]);
}

#[tokio::test]
async fn test_edit_and_delete_messages() {
    let f = fixture(MockProvider::new().with_default_response(MockResponse::text("ok")));
    f.session.send("helo", vec![]).await.unwrap();

    assert!(f.session.edit_message(0, " hello ").await.unwrap());
    assert!(!f.session.edit_message(0, "hello").await.unwrap());
    assert!(!f.session.edit_message(0, "   ").await.unwrap());
    assert!(f.session.edit_message(1, "rewrite the answer").await.is_err());
    assert!(f.session.edit_message(7, "nope").await.is_err());

    let removed = f.session.delete_message(1).await.unwrap();
    assert_eq!(removed.content, "ok");

    let stored = f.session.current_conversation().await.unwrap().unwrap();
    assert_eq!(stored.messages.len(), 1);
    assert_eq!(stored.messages[0].content, "hello");
}

#[tokio::test]
async fn test_regenerate_replaces_answer() {
    let f = fixture(MockProvider::new().with_responses(vec![
        MockResponse::text("first try"),
        MockResponse::text("second try"),
    ]));
    f.session.send("tell me a joke", vec![]).await.unwrap();

    assert!(matches!(
        f.session.regenerate(0).await,
        Err(TurnError::NothingToRegenerate)
    ));

    let outcome = f.session.regenerate(1).await.unwrap();
    assert_eq!(outcome.reply, "second try");

    let contents: Vec<String> = f
        .session
        .messages()
        .await
        .into_iter()
        .map(|m| m.content)
        .collect();
    assert_eq!(contents, vec!["tell me a joke", "second try"]);

    let regen_request = &f.provider.get_requests()[1];
    let user_turns = regen_request
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .count();
    assert_eq!(user_turns, 1);
}

#[tokio::test]
async fn test_new_chat_and_load_conversation() {
    let f = fixture(MockProvider::new().with_default_response(MockResponse::text("answer")));
    f.session.send("about cats", vec![]).await.unwrap();
    let first_id = f.session.conversation_id().await;

    let second_id = f.session.new_chat().await.unwrap();
    assert_ne!(first_id, second_id);
    assert!(f.session.messages().await.is_empty());
    assert_eq!(f.store.current_id().unwrap(), Some(second_id.clone()));
    assert_eq!(f.store.get(&second_id).unwrap().unwrap().title, DEFAULT_TITLE);

    assert!(f.session.load_conversation(&first_id).await.unwrap());
    assert_eq!(f.session.messages().await.len(), 2);
    assert_eq!(f.store.current_id().unwrap(), Some(first_id.clone()));
    assert!(!f.session.load_conversation("conv_0_missing").await.unwrap());

    assert!(f.session.delete_conversation(&first_id).await.unwrap());
    assert_ne!(f.session.conversation_id().await, first_id);
    assert!(f.session.messages().await.is_empty());
}

#[tokio::test]
async fn test_reopen_resumes_current_conversation() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("conversations.json");
    let host = Arc::new(MemoryHost::new());
    let build = |provider: MockProvider| {
        ToolLoop::new(
            Arc::new(provider),
            ToolExecutor::new(host.clone(), host.clone()),
            ContextBuilder::new(""),
        )
    };

    let store = Arc::new(ConversationStore::new(&path));
    let session = ChatSession::open(
        build(MockProvider::new().with_response(MockResponse::text("hi back"))),
        store,
        Duration::from_millis(10),
    )
    .unwrap();
    session.send("hi", vec![]).await.unwrap();
    let id = session.conversation_id().await;
    session.shutdown().await;

    let reopened = ChatSession::open(
        build(MockProvider::new()),
        Arc::new(ConversationStore::new(&path)),
        Duration::from_millis(10),
    )
    .unwrap();
    assert_eq!(reopened.conversation_id().await, id);
    assert_eq!(reopened.messages().await.len(), 2);
    reopened.shutdown().await;
}
