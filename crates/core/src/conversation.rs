//! Durable conversation storage.
//!
//! Optional: when no [`ConversationStore`] is configured the system keeps
//! only session memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caller::Caller;
use crate::error::StoreError;
use crate::message::Role;

pub const DEFAULT_TITLE: &str = "New Chat";
pub const DEFAULT_LANGUAGE: &str = "ko";

/// A persisted conversation header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub owner: Caller,
    pub title: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: impl Into<String>, owner: Caller) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner,
            title: DEFAULT_TITLE.into(),
            language: DEFAULT_LANGUAGE.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn new(conversation_id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Persist a conversation header unless one with the same id exists.
    /// Returns the header actually stored, which may be the earlier one.
    async fn create(&self, conversation: &Conversation) -> Result<Conversation, StoreError>;

    /// Append a message and bump the conversation's `updated_at`.
    async fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError>;

    /// Conversations owned by `owner`, most recently updated first.
    async fn list_by_user(&self, owner: &Caller) -> Result<Vec<Conversation>, StoreError>;

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError>;

    /// Messages of a conversation, oldest first.
    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError>;
}
