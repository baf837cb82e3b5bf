//! Conversation history kept in a single JSON file.
//!
//! Every operation reads the file, applies its change and writes the file
//! back. An in-process lock serialises those read-modify-write cycles so the
//! autosave task and the session never interleave.

use anyhow::{Context, Result};
use chrono::{Local, TimeZone};
use once_cell::sync::Lazy;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tabpilot_providers::{Message, MessageRole};
use tracing::{debug, info, warn};

pub const DEFAULT_TITLE: &str = "New Chat";
pub const DEFAULT_KEEP_COUNT: usize = 100;
const TITLE_MAX_CHARS: usize = 50;
/// Quota the usage percentage is measured against
pub const STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

static NEWLINE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n+").expect("newline pattern is valid"));

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Fields to replace in [`ConversationStore::update`]; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct ConversationUpdate {
    pub title: Option<String>,
    pub messages: Option<Vec<Message>>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    UpdatedAt,
    CreatedAt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Title,
    Messages,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub conversation: Conversation,
    pub match_type: MatchType,
    pub match_count: usize,
    pub matched_messages: Vec<Message>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageInfo {
    pub conversation_count: usize,
    pub bytes: u64,
}

impl StorageInfo {
    pub fn kb(&self) -> f64 {
        self.bytes as f64 / 1024.0
    }

    pub fn mb(&self) -> f64 {
        self.bytes as f64 / 1024.0 / 1024.0
    }

    pub fn percent_used(&self) -> f64 {
        self.bytes as f64 / STORAGE_QUOTA_BYTES as f64 * 100.0
    }
}

impl std::fmt::Display for StorageInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} conversations, {:.2} KB ({:.2} MB, {:.2}% of 5 MB)",
            self.conversation_count,
            self.kb(),
            self.mb(),
            self.percent_used()
        )
    }
}

/// On-disk layout. `conversation` is the single-chat format older versions wrote.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreData {
    #[serde(default)]
    conversations: HashMap<String, Conversation>,
    #[serde(default)]
    current_conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation: Option<Vec<Message>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    conversation_backup: Option<Vec<Message>>,
}

pub struct ConversationStore {
    path: PathBuf,
    io_lock: Mutex<()>,
}

impl ConversationStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `conv_<ms>_<9 base36 chars>`
    pub fn generate_id() -> String {
        const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("conv_{}_{}", now_millis(), suffix)
    }

    pub fn all(&self) -> Result<HashMap<String, Conversation>> {
        self.read(|data| Ok(data.conversations.clone()))
    }

    pub fn get(&self, id: &str) -> Result<Option<Conversation>> {
        self.read(|data| Ok(data.conversations.get(id).cloned()))
    }

    pub fn current_id(&self) -> Result<Option<String>> {
        self.read(|data| Ok(data.current_conversation_id.clone()))
    }

    pub fn set_current_id(&self, id: Option<&str>) -> Result<()> {
        self.modify(|data| {
            data.current_conversation_id = id.map(str::to_string);
            Ok(())
        })
    }

    /// Store a new conversation and make it current.
    pub fn create(&self, title: &str, messages: Vec<Message>) -> Result<Conversation> {
        let now = now_millis();
        let conversation = Conversation {
            id: Self::generate_id(),
            title: title.to_string(),
            messages,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
        };

        self.modify(|data| {
            data.conversations
                .insert(conversation.id.clone(), conversation.clone());
            data.current_conversation_id = Some(conversation.id.clone());
            Ok(())
        })?;
        debug!("Created conversation {}", conversation.id);
        Ok(conversation)
    }

    /// Returns false when no conversation has that id.
    pub fn update(&self, id: &str, update: ConversationUpdate) -> Result<bool> {
        self.modify(|data| {
            let Some(conversation) = data.conversations.get_mut(id) else {
                return Ok(false);
            };
            if let Some(title) = update.title {
                conversation.title = title;
            }
            if let Some(messages) = update.messages {
                conversation.messages = messages;
            }
            if let Some(tags) = update.tags {
                conversation.tags = tags;
            }
            conversation.updated_at = now_millis().max(conversation.updated_at);
            Ok(true)
        })
    }

    pub fn delete(&self, id: &str) -> Result<bool> {
        self.modify(|data| {
            let removed = data.conversations.remove(id).is_some();
            if removed && data.current_conversation_id.as_deref() == Some(id) {
                data.current_conversation_id = None;
            }
            Ok(removed)
        })
    }

    /// Case-insensitive search over titles and message text.
    ///
    /// A title match counts once and skips the messages; otherwise every
    /// matching message counts. Ordered by count, then most recently updated.
    pub fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let needle = query.to_lowercase();
        let conversations = self.all()?;

        let mut hits: Vec<SearchHit> = conversations
            .into_values()
            .filter_map(|conversation| {
                if conversation.title.to_lowercase().contains(&needle) {
                    return Some(SearchHit {
                        conversation,
                        match_type: MatchType::Title,
                        match_count: 1,
                        matched_messages: Vec::new(),
                    });
                }

                let matched: Vec<Message> = conversation
                    .messages
                    .iter()
                    .filter(|m| m.content.to_lowercase().contains(&needle))
                    .cloned()
                    .collect();
                if matched.is_empty() {
                    return None;
                }
                Some(SearchHit {
                    match_type: MatchType::Messages,
                    match_count: matched.len(),
                    matched_messages: matched,
                    conversation,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.match_count
                .cmp(&a.match_count)
                .then(b.conversation.updated_at.cmp(&a.conversation.updated_at))
        });
        Ok(hits)
    }

    pub fn sorted(&self, key: SortKey, ascending: bool) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self.all()?.into_values().collect();
        conversations.sort_by_key(|c| match key {
            SortKey::UpdatedAt => c.updated_at,
            SortKey::CreatedAt => c.created_at,
        });
        if !ascending {
            conversations.reverse();
        }
        Ok(conversations)
    }

    /// Import a conversation exported with [`export_json`]; it is stored as a new one.
    pub fn import_json(&self, json: &str) -> Result<Conversation> {
        let value: serde_json::Value =
            serde_json::from_str(json).context("Import is not valid JSON")?;

        let title = value
            .get("title")
            .and_then(|t| t.as_str())
            .filter(|t| !t.is_empty());
        let messages = value.get("messages").filter(|m| m.is_array());
        let (Some(title), Some(messages)) = (title, messages) else {
            anyhow::bail!("Invalid conversation format");
        };

        let messages: Vec<Message> = serde_json::from_value(messages.clone())
            .context("Invalid conversation format")?;
        self.create(title, messages)
    }

    /// Keep the `keep` most recently updated conversations; returns how many were removed.
    pub fn cleanup(&self, keep: usize) -> Result<usize> {
        let stale: Vec<String> = self
            .sorted(SortKey::UpdatedAt, false)?
            .into_iter()
            .skip(keep)
            .map(|c| c.id)
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }

        let removed = self.modify(|data| {
            let mut removed = 0;
            for id in &stale {
                if data.conversations.remove(id).is_some() {
                    removed += 1;
                }
                if data.current_conversation_id.as_deref() == Some(id.as_str()) {
                    data.current_conversation_id = None;
                }
            }
            Ok(removed)
        })?;
        info!("Removed {} old conversations", removed);
        Ok(removed)
    }

    pub fn storage_info(&self) -> Result<StorageInfo> {
        self.read(|data| {
            let bytes = serde_json::to_vec(&data.conversations)?.len() as u64;
            Ok(StorageInfo {
                conversation_count: data.conversations.len(),
                bytes,
            })
        })
    }

    /// Turn a legacy single-conversation file into a stored conversation.
    ///
    /// Only runs while the store has no conversations. The legacy messages are
    /// kept under `conversationBackup`.
    pub fn migrate_legacy(&self) -> Result<Option<Conversation>> {
        let migrated = self.modify(|data| {
            let legacy = match data.conversation.take() {
                Some(messages) if !messages.is_empty() => messages,
                other => {
                    data.conversation = other;
                    return Ok(None);
                }
            };
            if !data.conversations.is_empty() {
                data.conversation = Some(legacy);
                return Ok(None);
            }

            let now = now_millis();
            let conversation = Conversation {
                id: Self::generate_id(),
                title: smart_title(&legacy),
                messages: legacy.clone(),
                created_at: now,
                updated_at: now,
                tags: Vec::new(),
            };
            data.conversation_backup = Some(legacy);
            data.conversations
                .insert(conversation.id.clone(), conversation.clone());
            data.current_conversation_id = Some(conversation.id.clone());
            Ok(Some(conversation))
        })?;

        if let Some(conversation) = &migrated {
            info!("Migrated legacy conversation into {}", conversation.id);
        }
        Ok(migrated)
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> Result<T>) -> Result<T> {
        let _guard = self.io_lock.lock().unwrap_or_else(|p| p.into_inner());
        let data = self.load()?;
        f(&data)
    }

    fn modify<T>(&self, f: impl FnOnce(&mut StoreData) -> Result<T>) -> Result<T> {
        let _guard = self.io_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut data = self.load()?;
        let value = f(&mut data)?;
        self.save(&data)?;
        Ok(value)
    }

    fn load(&self) -> Result<StoreData> {
        if !self.path.exists() {
            return Ok(StoreData::default());
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(StoreData::default());
        }
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    fn save(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Write to a sibling file first so a crash never leaves half a store
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string(data)?)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            warn!("Could not replace {}: {}", self.path.display(), e);
            e
        })?;
        Ok(())
    }
}

pub fn export_json(conversation: &Conversation) -> Result<String> {
    Ok(serde_json::to_string_pretty(conversation)?)
}

pub fn export_markdown(conversation: &Conversation) -> String {
    let mut markdown = format!("# {}\n\n", conversation.title);
    markdown.push_str(&format!(
        "Created: {}\n",
        format_datetime(conversation.created_at)
    ));
    markdown.push_str(&format!(
        "Last Updated: {}\n\n",
        format_datetime(conversation.updated_at)
    ));
    markdown.push_str("---\n\n");

    for message in &conversation.messages {
        let speaker = if message.role == MessageRole::User {
            "👤 You"
        } else {
            "🤖 Gemini"
        };
        markdown.push_str(&format!(
            "## {} ({})\n\n",
            speaker,
            format_time(message.timestamp)
        ));
        markdown.push_str(&format!("{}\n\n", message.content));
    }
    markdown
}

/// Title from the first user message: newlines collapsed, long text shortened.
pub fn smart_title(messages: &[Message]) -> String {
    let Some(first) = messages.iter().find(|m| m.role == MessageRole::User) else {
        return DEFAULT_TITLE.to_string();
    };

    let title = NEWLINE_RUNS
        .replace_all(first.content.trim(), " ")
        .into_owned();
    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }
    if title.chars().count() > TITLE_MAX_CHARS {
        let head: String = title.chars().take(TITLE_MAX_CHARS - 3).collect();
        format!("{}...", head)
    } else {
        title
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn format_datetime(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string())
        .unwrap_or_default()
}

fn format_time(millis: i64) -> String {
    Local
        .timestamp_millis_opt(millis)
        .single()
        .map(|t| t.format("%-I:%M:%S %p").to_string())
        .unwrap_or_default()
}
