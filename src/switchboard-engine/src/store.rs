//! Conversation store collaborator.
//!
//! Keeps the user and assistant messages of each conversation beyond the
//! lifetime of the in-memory session. [`MemoryStore`] is process-local;
//! [`JsonlStore`] appends one JSON line per message to
//! `<dir>/<conversationId>.jsonl`.

use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::message::{Message, Role};

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Self {
            role: stored.role,
            content: stored.content,
            payload: None,
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn save(&self, conversation_id: &str, role: Role, content: &str)
    -> Result<(), StoreError>;

    /// Messages in save order; empty for an unknown conversation.
    async fn load(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError>;

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError>;
}

// ============================================================================
// Memory store
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Vec<StoredMessage>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn save(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        self.conversations
            .write()
            .entry(conversation_id.to_string())
            .or_default()
            .push(StoredMessage::new(role, content));
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .conversations
            .read()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        self.conversations.write().remove(conversation_id);
        Ok(())
    }
}

// ============================================================================
// JSONL store
// ============================================================================

#[derive(Debug, Clone)]
pub struct JsonlStore {
    dir: PathBuf,
}

impl JsonlStore {
    /// Use `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn history_path(&self, conversation_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(conversation_id)))
    }
}

/// Percent-encoded id. `/` is always encoded and the `.jsonl` suffix rules
/// out `.` and `..`, so no id escapes the store directory.
fn file_stem(conversation_id: &str) -> Cow<'_, str> {
    urlencoding::encode(conversation_id)
}

#[async_trait]
impl ConversationStore for JsonlStore {
    async fn save(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let path = self.history_path(conversation_id);
        let mut line = serde_json::to_string(&StoredMessage::new(role, content))?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;

        debug!(conversation_id, %role, "Message stored");
        Ok(())
    }

    async fn load(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let path = self.history_path(conversation_id);
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut messages = Vec::new();
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<StoredMessage>(line) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to parse message line"),
            }
        }
        Ok(messages)
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), StoreError> {
        match fs::remove_file(self.history_path(conversation_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
