//! One chat: the stored conversation, the turn in flight and the message
//! operations a user can perform between turns.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabpilot_browser::PageContentProvider;
use tabpilot_providers::{ImageContent, Message, MessageRole};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::autosave::{AutosaveHandle, Snapshot};
use crate::context::{compose_user_input, TurnInput};
use crate::error::TurnError;
use crate::history::{Conversation, ConversationStore, DEFAULT_TITLE};
use crate::tool_loop::{ToolLoop, TurnOutcome};

struct SessionState {
    conversation_id: String,
    messages: Vec<Message>,
}

impl SessionState {
    fn snapshot(&self) -> Snapshot {
        Snapshot {
            conversation_id: self.conversation_id.clone(),
            messages: self.messages.clone(),
        }
    }
}

/// Clears the busy flag when the turn ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct ChatSession {
    tool_loop: ToolLoop,
    store: Arc<ConversationStore>,
    autosave: AutosaveHandle,
    page: Option<Arc<dyn PageContentProvider>>,
    include_page_context: AtomicBool,
    busy: AtomicBool,
    cancel: std::sync::Mutex<Option<CancellationToken>>,
    state: Mutex<SessionState>,
}

impl ChatSession {
    /// Resume the store's current conversation, or start a new one.
    ///
    /// Spawns the autosave task, so this must run inside a tokio runtime.
    pub fn open(
        tool_loop: ToolLoop,
        store: Arc<ConversationStore>,
        debounce: Duration,
    ) -> Result<Self> {
        let resumed = match store.current_id()? {
            Some(id) => store.get(&id)?,
            None => None,
        };
        let state = match resumed {
            Some(conversation) => {
                info!("Resuming conversation {}", conversation.id);
                SessionState {
                    conversation_id: conversation.id,
                    messages: conversation.messages,
                }
            }
            None => SessionState {
                conversation_id: store.create(DEFAULT_TITLE, Vec::new())?.id,
                messages: Vec::new(),
            },
        };

        Ok(Self {
            tool_loop,
            autosave: AutosaveHandle::spawn(store.clone(), debounce),
            store,
            page: None,
            include_page_context: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            cancel: std::sync::Mutex::new(None),
            state: Mutex::new(state),
        })
    }

    pub fn with_page_provider(mut self, page: Arc<dyn PageContentProvider>) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_page_context(self, enabled: bool) -> Self {
        self.set_include_page_context(enabled);
        self
    }

    pub fn tool_loop(&self) -> &ToolLoop {
        &self.tool_loop
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    pub fn include_page_context(&self) -> bool {
        self.include_page_context.load(Ordering::SeqCst)
    }

    pub fn set_include_page_context(&self, enabled: bool) {
        self.include_page_context.store(enabled, Ordering::SeqCst);
    }

    pub async fn conversation_id(&self) -> String {
        self.state.lock().await.conversation_id.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    /// Stop the turn in flight. Returns false when nothing was running.
    pub fn cancel_turn(&self) -> bool {
        let slot = self.cancel.lock().unwrap_or_else(|p| p.into_inner());
        match slot.as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run one user turn. Only `message` is stored; page context, when
    /// enabled, is added to what the model sees.
    pub async fn send(
        &self,
        message: &str,
        images: Vec<ImageContent>,
    ) -> Result<TurnOutcome, TurnError> {
        let message = message.trim();
        if message.is_empty() && images.is_empty() {
            return Err(TurnError::EmptyInput);
        }
        let _busy = self.begin_turn()?;

        let prior = {
            let mut state = self.state.lock().await;
            let prior = state.messages.clone();
            state.messages.push(Message::with_images(
                MessageRole::User,
                message.to_string(),
                images.clone(),
            ));
            self.autosave.save(state.snapshot());
            prior
        };

        let text = self.compose(message).await;
        self.complete_turn(&prior, TurnInput::new(text).with_images(images))
            .await
    }

    /// Replace the assistant message at `index` with a fresh answer to the
    /// user message before it. Everything from `index` on is dropped.
    pub async fn regenerate(&self, index: usize) -> Result<TurnOutcome, TurnError> {
        let _busy = self.begin_turn()?;

        let (prior, user) = {
            let mut state = self.state.lock().await;
            if state.messages.get(index).map(|m| m.role) != Some(MessageRole::Assistant) {
                return Err(TurnError::NothingToRegenerate);
            }
            let user_index = state.messages[..index]
                .iter()
                .rposition(|m| m.role == MessageRole::User)
                .ok_or(TurnError::NothingToRegenerate)?;

            state.messages.truncate(index);
            self.autosave.save(state.snapshot());
            (
                state.messages[..user_index].to_vec(),
                state.messages[user_index].clone(),
            )
        };

        let text = self.compose(&user.content).await;
        self.complete_turn(&prior, TurnInput::new(text).with_images(user.images))
            .await
    }

    /// Change the text of a user message. Returns false when the new text is
    /// empty or unchanged.
    pub async fn edit_message(&self, index: usize, text: &str) -> Result<bool> {
        self.ensure_idle()?;
        let text = text.trim();

        let mut state = self.state.lock().await;
        let Some(message) = state.messages.get_mut(index) else {
            anyhow::bail!("No message at position {}", index + 1);
        };
        if message.role != MessageRole::User {
            anyhow::bail!("Only your own messages can be edited");
        }
        if text.is_empty() || text == message.content {
            return Ok(false);
        }

        message.content = text.to_string();
        message.timestamp = chrono::Utc::now().timestamp_millis();
        self.autosave.save(state.snapshot());
        Ok(true)
    }

    pub async fn delete_message(&self, index: usize) -> Result<Message> {
        self.ensure_idle()?;

        let mut state = self.state.lock().await;
        if index >= state.messages.len() {
            anyhow::bail!("No message at position {}", index + 1);
        }
        let removed = state.messages.remove(index);
        self.autosave.save(state.snapshot());
        Ok(removed)
    }

    /// Save the current chat and switch to a fresh one.
    pub async fn new_chat(&self) -> Result<String> {
        self.ensure_idle()?;
        self.autosave.flush().await;

        let conversation = self.store.create(DEFAULT_TITLE, Vec::new())?;
        let mut state = self.state.lock().await;
        state.conversation_id = conversation.id.clone();
        state.messages.clear();
        debug!("Started conversation {}", conversation.id);
        Ok(conversation.id)
    }

    /// Switch to a stored conversation. Returns false when it does not exist.
    pub async fn load_conversation(&self, id: &str) -> Result<bool> {
        self.ensure_idle()?;
        self.autosave.flush().await;

        let Some(conversation) = self.store.get(id)? else {
            return Ok(false);
        };
        self.store.set_current_id(Some(id))?;

        let mut state = self.state.lock().await;
        state.conversation_id = conversation.id;
        state.messages = conversation.messages;
        Ok(true)
    }

    /// Delete a stored conversation; deleting the open one starts a new chat.
    pub async fn delete_conversation(&self, id: &str) -> Result<bool> {
        self.ensure_idle()?;
        self.autosave.flush().await;

        let deleted = self.store.delete(id)?;
        if deleted && self.conversation_id().await == id {
            self.new_chat().await?;
        }
        Ok(deleted)
    }

    /// The open conversation as stored, after pending changes are written.
    pub async fn current_conversation(&self) -> Result<Option<Conversation>> {
        self.autosave.flush().await;
        let id = self.conversation_id().await;
        self.store.get(&id)
    }

    pub async fn shutdown(self) {
        self.cancel_turn();
        self.autosave.shutdown().await;
    }

    fn ensure_idle(&self) -> Result<(), TurnError> {
        if self.is_busy() {
            Err(TurnError::Busy)
        } else {
            Ok(())
        }
    }

    fn begin_turn(&self) -> Result<BusyGuard<'_>, TurnError> {
        self.busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| TurnError::Busy)?;
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = Some(CancellationToken::new());
        Ok(BusyGuard(&self.busy))
    }

    fn current_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get_or_insert_with(CancellationToken::new)
            .clone()
    }

    async fn compose(&self, message: &str) -> String {
        if !self.include_page_context() {
            return message.to_string();
        }
        let Some(page) = &self.page else {
            return message.to_string();
        };

        let content = page.page_content().await;
        if !content.success {
            warn!(
                "Page context unavailable: {}",
                content.error.as_deref().unwrap_or("unknown error")
            );
        }
        compose_user_input(message, Some(&content))
    }

    async fn complete_turn(
        &self,
        prior: &[Message],
        input: TurnInput,
    ) -> Result<TurnOutcome, TurnError> {
        let token = self.current_token();
        let outcome = self.tool_loop.run(prior, input, &token).await;
        *self.cancel.lock().unwrap_or_else(|p| p.into_inner()) = None;

        match &outcome {
            Ok(turn) => {
                let mut state = self.state.lock().await;
                state
                    .messages
                    .push(Message::new(MessageRole::Assistant, turn.reply.clone()));
                self.autosave.save(state.snapshot());
            }
            Err(e) => error!("Turn ended without an answer: {}", e),
        }

        self.autosave.flush().await;
        outcome
    }
}
