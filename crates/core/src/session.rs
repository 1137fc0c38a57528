//! Session store trait — bounded short-term memory per session.
//!
//! Invariants every implementation must hold:
//! - a session never holds more than its configured maximum; on overflow the
//!   oldest messages are dropped first
//! - reading an unknown session yields an empty history, not an error
//! - clearing is idempotent

use async_trait::async_trait;

use crate::error::StoreError;
use crate::message::{Role, SessionMessage};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Append a message, creating the session on first use.
    async fn add_message(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<(), StoreError>;

    /// An independent copy of the session's messages, oldest first.
    async fn get_history(&self, session_id: &str) -> Result<Vec<SessionMessage>, StoreError>;

    /// Drop all state held for the session.
    async fn clear_session(&self, session_id: &str) -> Result<(), StoreError>;
}
