//! In-memory conversation store — useful for testing and single-process demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use cleaners_core::caller::Caller;
use cleaners_core::conversation::{Conversation, ConversationStore, StoredMessage};
use cleaners_core::error::StoreError;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<StoredMessage>>,
}

pub struct InMemoryConversationStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation, StoreError> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .conversations
            .entry(conversation.id.clone())
            .or_insert_with(|| conversation.clone());
        Ok(stored.clone())
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let conversation = inner
            .conversations
            .get_mut(&message.conversation_id)
            .ok_or_else(|| StoreError::NotFound(message.conversation_id.clone()))?;
        conversation.updated_at = message.created_at;
        inner
            .messages
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn list_by_user(&self, owner: &Caller) -> Result<Vec<Conversation>, StoreError> {
        let inner = self.inner.read().await;
        let mut conversations: Vec<Conversation> = inner
            .conversations
            .values()
            .filter(|c| &c.owner == owner)
            .cloned()
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(conversations)
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        Ok(self.inner.read().await.conversations.get(conversation_id).cloned())
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }
}
