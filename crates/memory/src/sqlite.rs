//! SQLite conversation store and knowledge catalogue.
//!
//! Tables:
//! - `conversations` — one row per conversation; `user_id` is NULL for
//!   anonymous callers
//! - `messages` — append-only, ordered by insertion (`iid`)
//! - `knowledge` — curated knowledge items; `tags` is a JSON array

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cleaners_core::caller::Caller;
use cleaners_core::conversation::{Conversation, ConversationStore, StoredMessage};
use cleaners_core::error::StoreError;
use cleaners_core::knowledge::{KnowledgeItem, KnowledgeRepository};
use cleaners_core::message::Role;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

pub struct SqliteConversationStore {
    pool: SqlitePool,
}

impl SqliteConversationStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let store = Self {
            pool: connect(path).await?,
        };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id          TEXT PRIMARY KEY NOT NULL,
                user_id     TEXT,
                title       TEXT NOT NULL,
                language    TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                id               TEXT UNIQUE NOT NULL,
                conversation_id  TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role             TEXT NOT NULL,
                content          TEXT NOT NULL,
                created_at       TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("user index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, iid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("message index: {e}")))?;

        debug!("SQLite conversation migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| col("id", e))?;
        let user_id: Option<String> = row.try_get("user_id").map_err(|e| col("user_id", e))?;
        let title: String = row.try_get("title").map_err(|e| col("title", e))?;
        let language: String = row.try_get("language").map_err(|e| col("language", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| col("updated_at", e))?;

        Ok(Conversation {
            id,
            owner: user_id.map(Caller::user).unwrap_or(Caller::Anonymous),
            title,
            language,
            created_at: parse_time(&created_at, "created_at")?,
            updated_at: parse_time(&updated_at, "updated_at")?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let role: String = row.try_get("role").map_err(|e| col("role", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;

        Ok(StoredMessage {
            id: row.try_get("id").map_err(|e| col("id", e))?,
            conversation_id: row
                .try_get("conversation_id")
                .map_err(|e| col("conversation_id", e))?,
            role: role.parse::<Role>().map_err(StoreError::QueryFailed)?,
            content: row.try_get("content").map_err(|e| col("content", e))?,
            created_at: parse_time(&created_at, "created_at")?,
        })
    }
}

async fn connect(path: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(path)
        .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .pragma("foreign_keys", "ON");

    // Each in-memory connection is its own database.
    let max_connections = if path.contains(":memory:") { 1 } else { 4 };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("{column} column: {e}")))
}

fn owner_column(owner: &Caller) -> Option<&str> {
    owner.user_id().map(|id| id.0.as_str())
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, conversation: &Conversation) -> Result<Conversation, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, language, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&conversation.id)
        .bind(owner_column(&conversation.owner))
        .bind(&conversation.title)
        .bind(&conversation.language)
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("insert conversation: {e}")))?;

        self.get(&conversation.id)
            .await?
            .ok_or_else(|| StoreError::NotFound(conversation.id.clone()))
    }

    async fn append_message(&self, message: &StoredMessage) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("begin: {e}")))?;

        let created_at = message.created_at.to_rfc3339();
        let updated = sqlx::query("UPDATE conversations SET updated_at = ?1 WHERE id = ?2")
            .bind(&created_at)
            .bind(&message.conversation_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("touch conversation: {e}")))?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::NotFound(message.conversation_id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&message.id)
        .bind(&message.conversation_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("insert message: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("commit: {e}")))?;
        Ok(())
    }

    async fn list_by_user(&self, owner: &Caller) -> Result<Vec<Conversation>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM conversations
            WHERE user_id IS ?1
            ORDER BY updated_at DESC, id ASC
            "#,
        )
        .bind(owner_column(owner))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("list conversations: {e}")))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }

    async fn get(&self, conversation_id: &str) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?1")
            .bind(conversation_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get conversation: {e}")))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = sqlx::query("SELECT * FROM messages WHERE conversation_id = ?1 ORDER BY iid ASC")
            .bind(conversation_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }
}

pub struct SqliteKnowledgeRepository {
    pool: SqlitePool,
}

impl SqliteKnowledgeRepository {
    /// Open (or create) the database at `path`; may share a file with
    /// [`SqliteConversationStore`].
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = connect(path).await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge (
                id          TEXT PRIMARY KEY NOT NULL,
                title       TEXT NOT NULL,
                content     TEXT NOT NULL,
                category    TEXT NOT NULL,
                difficulty  TEXT NOT NULL,
                tags        TEXT NOT NULL,
                language    TEXT NOT NULL,
                created_by  TEXT,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("knowledge table: {e}")))?;

        info!("SQLite knowledge repository initialized at {path}");
        Ok(Self { pool })
    }

    fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<KnowledgeItem, StoreError> {
        let col = |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let category: String = row.try_get("category").map_err(|e| col("category", e))?;
        let difficulty: String = row.try_get("difficulty").map_err(|e| col("difficulty", e))?;
        let tags: String = row.try_get("tags").map_err(|e| col("tags", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| col("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| col("updated_at", e))?;

        Ok(KnowledgeItem {
            id: row.try_get("id").map_err(|e| col("id", e))?,
            title: row.try_get("title").map_err(|e| col("title", e))?,
            content: row.try_get("content").map_err(|e| col("content", e))?,
            category: category.parse().map_err(StoreError::QueryFailed)?,
            difficulty: difficulty.parse().map_err(StoreError::QueryFailed)?,
            tags: serde_json::from_str(&tags)
                .map_err(|e| StoreError::QueryFailed(format!("tags column: {e}")))?,
            language: row.try_get("language").map_err(|e| col("language", e))?,
            created_by: row.try_get("created_by").map_err(|e| col("created_by", e))?,
            created_at: parse_time(&created_at, "created_at")?,
            updated_at: parse_time(&updated_at, "updated_at")?,
        })
    }
}

#[async_trait]
impl KnowledgeRepository for SqliteKnowledgeRepository {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, item: &KnowledgeItem) -> Result<(), StoreError> {
        let tags = serde_json::to_string(&item.tags)
            .map_err(|e| StoreError::Storage(format!("encode tags: {e}")))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO knowledge
                (id, title, content, category, difficulty, tags, language, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&item.id)
        .bind(&item.title)
        .bind(&item.content)
        .bind(item.category.as_str())
        .bind(item.difficulty.as_str())
        .bind(tags)
        .bind(&item.language)
        .bind(item.created_by.as_deref())
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("save knowledge: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>, StoreError> {
        let row = sqlx::query("SELECT * FROM knowledge WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("get knowledge: {e}")))?;

        row.as_ref().map(Self::row_to_item).transpose()
    }

    async fn list(&self) -> Result<Vec<KnowledgeItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM knowledge ORDER BY created_at DESC, id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("list knowledge: {e}")))?;

        rows.iter().map(Self::row_to_item).collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM knowledge WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("delete knowledge: {e}")))?;
        Ok(result.rows_affected() > 0)
    }
}
