//! Bounded in-memory session store.
//!
//! Each session is a FIFO window of at most `max_size` messages. The map is
//! guarded by a readers-writer lock: history reads share the lock, appends
//! and clears take it exclusively, so operations on one session are
//! linearized and a read after an append in the same flow sees the append.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use cleaners_core::error::StoreError;
use cleaners_core::message::{Role, SessionMessage};
use cleaners_core::session::SessionStore;
use tokio::sync::RwLock;
use tracing::trace;

pub const DEFAULT_MAX_SIZE: usize = 10;

pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, VecDeque<SessionMessage>>>>,
    max_size: usize,
}

impl InMemorySessionStore {
    /// A store keeping at most `max_size` messages per session (minimum 1).
    pub fn new(max_size: usize) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            max_size: max_size.max(1),
        }
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().await;
        let messages = sessions.entry(session_id.to_string()).or_default();
        messages.push_back(SessionMessage {
            role,
            content: content.to_string(),
        });
        while messages.len() > self.max_size {
            messages.pop_front();
        }
        trace!(session_id, len = messages.len(), "Appended session message");
        Ok(())
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<SessionMessage>, StoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .get(session_id)
            .map(|messages| messages.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear_session(&self, session_id: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(session_id);
        Ok(())
    }
}
