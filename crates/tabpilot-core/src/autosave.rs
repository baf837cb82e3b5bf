//! Debounced conversation writes.
//!
//! The session hands every change to a background task that keeps only the
//! newest snapshot and writes it once no new snapshot has arrived for the
//! debounce interval. A flush writes immediately and acknowledges.

use std::sync::Arc;
use std::time::Duration;
use tabpilot_providers::Message;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::history::{smart_title, ConversationStore, ConversationUpdate, DEFAULT_TITLE};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub conversation_id: String,
    pub messages: Vec<Message>,
}

enum Command {
    Save(Snapshot),
    Flush(oneshot::Sender<()>),
}

pub struct AutosaveHandle {
    tx: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

impl AutosaveHandle {
    /// Start the writer task. Must be called from within a tokio runtime.
    pub fn spawn(store: Arc<ConversationStore>, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run(store, debounce, rx));
        Self { tx, task }
    }

    /// Queue a snapshot; replaces any snapshot not yet written.
    pub fn save(&self, snapshot: Snapshot) {
        if self.tx.send(Command::Save(snapshot)).is_err() {
            error!("Autosave task is gone; snapshot dropped");
        }
    }

    /// Write the pending snapshot now and wait for it.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Flush(ack)).is_err() {
            error!("Autosave task is gone; nothing flushed");
            return;
        }
        let _ = done.await;
    }

    pub async fn shutdown(self) {
        self.flush().await;
        drop(self.tx);
        if let Err(e) = self.task.await {
            error!("Autosave task ended abnormally: {}", e);
        }
    }
}

async fn run(
    store: Arc<ConversationStore>,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut pending: Option<Snapshot> = None;

    loop {
        let command = if pending.is_some() {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(command) => command,
                Err(_) => {
                    write(&store, pending.take());
                    continue;
                }
            }
        } else {
            rx.recv().await
        };

        match command {
            Some(Command::Save(snapshot)) => pending = Some(snapshot),
            Some(Command::Flush(ack)) => {
                write(&store, pending.take());
                let _ = ack.send(());
            }
            None => {
                write(&store, pending.take());
                break;
            }
        }
    }
}

fn write(store: &ConversationStore, snapshot: Option<Snapshot>) {
    let Some(snapshot) = snapshot else {
        return;
    };

    let title = match store.get(&snapshot.conversation_id) {
        Ok(Some(existing)) if existing.title == DEFAULT_TITLE => {
            Some(smart_title(&snapshot.messages)).filter(|t| t != DEFAULT_TITLE)
        }
        Ok(Some(_)) => None,
        Ok(None) => {
            debug!(
                "Conversation {} no longer exists; snapshot dropped",
                snapshot.conversation_id
            );
            return;
        }
        Err(e) => {
            error!("Autosave could not read the store: {:#}", e);
            return;
        }
    };

    let update = ConversationUpdate {
        title,
        messages: Some(snapshot.messages),
        tags: None,
    };
    match store.update(&snapshot.conversation_id, update) {
        Ok(_) => debug!("Saved conversation {}", snapshot.conversation_id),
        Err(e) => error!("Failed to save conversation: {:#}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabpilot_providers::MessageRole;
    use tempfile::TempDir;

    fn setup() -> (Arc<ConversationStore>, String, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(ConversationStore::new(dir.path().join("c.json")));
        let id = store.create(DEFAULT_TITLE, vec![]).unwrap().id;
        (store, id, dir)
    }

    fn snapshot(id: &str, texts: &[&str]) -> Snapshot {
        Snapshot {
            conversation_id: id.to_string(),
            messages: texts
                .iter()
                .map(|t| Message::new(MessageRole::User, t.to_string()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_flush_writes_latest_snapshot_and_title() {
        let (store, id, _dir) = setup();
        let autosave = AutosaveHandle::spawn(store.clone(), Duration::from_secs(60));

        autosave.save(snapshot(&id, &["first"]));
        autosave.save(snapshot(&id, &["first", "second"]));
        autosave.flush().await;

        let stored = store.get(&id).unwrap().unwrap();
        assert_eq!(stored.messages.len(), 2);
        assert_eq!(stored.title, "first");
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn test_quiet_period_triggers_write() {
        let (store, id, _dir) = setup();
        let autosave = AutosaveHandle::spawn(store.clone(), Duration::from_millis(20));

        autosave.save(snapshot(&id, &["hello"]));
        assert!(store.get(&id).unwrap().unwrap().messages.is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(store.get(&id).unwrap().unwrap().messages.len(), 1);
        autosave.shutdown().await;
    }

    #[tokio::test]
    async fn test_custom_title_is_kept() {
        let (store, id, _dir) = setup();
        store
            .update(
                &id,
                ConversationUpdate {
                    title: Some("Renamed".into()),
                    ..Default::default()
                },
            )
            .unwrap();

        let autosave = AutosaveHandle::spawn(store.clone(), DEFAULT_DEBOUNCE);
        autosave.save(snapshot(&id, &["something else"]));
        autosave.shutdown().await;

        assert_eq!(store.get(&id).unwrap().unwrap().title, "Renamed");
    }

    #[tokio::test]
    async fn test_snapshot_for_deleted_conversation_is_dropped() {
        let (store, id, _dir) = setup();
        store.delete(&id).unwrap();

        let autosave = AutosaveHandle::spawn(store.clone(), DEFAULT_DEBOUNCE);
        autosave.save(snapshot(&id, &["ghost"]));
        autosave.shutdown().await;

        assert!(store.all().unwrap().is_empty());
    }
}
