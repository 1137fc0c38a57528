//! Conversation memory for Cleaners.
//!
//! - [`InMemorySessionStore`] — bounded short-term memory per session
//! - [`InMemoryConversationStore`] / `SqliteConversationStore` — optional
//!   durable conversation history
//! - [`InMemoryKnowledgeRepository`] / `SqliteKnowledgeRepository` — the
//!   curated knowledge catalogue

pub mod in_memory;
pub mod knowledge;
pub mod session;

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use cleaners_config::StorageConfig;
use cleaners_core::conversation::ConversationStore;
use cleaners_core::error::StoreError;
use cleaners_core::knowledge::KnowledgeRepository;

pub use in_memory::InMemoryConversationStore;
pub use knowledge::InMemoryKnowledgeRepository;
pub use session::InMemorySessionStore;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteConversationStore, SqliteKnowledgeRepository};

#[cfg(feature = "sqlite")]
fn prepare_sqlite_path(config: &StorageConfig) -> Result<String, StoreError> {
    let path = config.sqlite_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| StoreError::Storage(format!("create {}: {e}", parent.display())))?;
    }
    Ok(path.to_string_lossy().to_string())
}

/// Open the configured durable store. `Ok(None)` when storage is disabled.
pub async fn open_conversation_store(
    config: &StorageConfig,
) -> Result<Option<Arc<dyn ConversationStore>>, StoreError> {
    match config.backend.as_str() {
        "none" => Ok(None),
        "memory" => Ok(Some(Arc::new(InMemoryConversationStore::new()))),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let store = SqliteConversationStore::new(&prepare_sqlite_path(config)?).await?;
            Ok(Some(Arc::new(store)))
        }
        other => Err(StoreError::Storage(format!(
            "storage backend '{other}' is not available in this build"
        ))),
    }
}

/// Open the knowledge catalogue. Without durable storage it lives in memory.
pub async fn open_knowledge_repository(
    config: &StorageConfig,
) -> Result<Arc<dyn KnowledgeRepository>, StoreError> {
    match config.backend.as_str() {
        "none" | "memory" => Ok(Arc::new(InMemoryKnowledgeRepository::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(
            SqliteKnowledgeRepository::new(&prepare_sqlite_path(config)?).await?,
        )),
        other => Err(StoreError::Storage(format!(
            "storage backend '{other}' is not available in this build"
        ))),
    }
}
