//! Curated knowledge base: the item catalogue plus its vector index.
//!
//! Items are embedded and upserted into the index before they are saved, so
//! a saved item is always searchable. Without an index the catalogue still
//! works and search finds nothing.

use std::sync::Arc;

use cleaners_core::caller::Caller;
use cleaners_core::error::{KnowledgeError, RetrievalError};
use cleaners_core::knowledge::{
    Difficulty, Embedder, KnowledgeCategory, KnowledgeItem, KnowledgeRepository,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::pinecone::{PineconeIndex, Vector};

pub const DEFAULT_SEARCH_TOP_K: usize = 5;
const MAX_SEARCH_TOP_K: usize = 50;

/// Fields a caller supplies for a new item.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeDraft {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: KnowledgeCategory,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub language: Option<String>,
}

struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    index: PineconeIndex,
}

pub struct KnowledgeBase {
    repository: Arc<dyn KnowledgeRepository>,
    vectors: Option<VectorIndex>,
}

impl KnowledgeBase {
    pub fn new(repository: Arc<dyn KnowledgeRepository>) -> Self {
        Self {
            repository,
            vectors: None,
        }
    }

    pub fn with_index(mut self, embedder: Arc<dyn Embedder>, index: PineconeIndex) -> Self {
        self.vectors = Some(VectorIndex { embedder, index });
        self
    }

    pub fn is_indexed(&self) -> bool {
        self.vectors.is_some()
    }

    pub fn repository_name(&self) -> &str {
        self.repository.name()
    }

    /// Validate, index, then save a new item.
    pub async fn create(
        &self,
        draft: KnowledgeDraft,
        author: &Caller,
    ) -> Result<KnowledgeItem, KnowledgeError> {
        if draft.title.trim().is_empty() {
            return Err(KnowledgeError::Invalid("title is required".into()));
        }
        if draft.content.trim().is_empty() {
            return Err(KnowledgeError::Invalid("content is required".into()));
        }

        let mut item = KnowledgeItem::new(draft.title.trim(), draft.content.trim());
        item.category = draft.category;
        item.difficulty = draft.difficulty;
        item.tags = draft.tags;
        if let Some(language) = draft.language.filter(|l| !l.trim().is_empty()) {
            item.language = language;
        }
        item.created_by = author.user_id().map(|id| id.0.clone());

        if let Some(vectors) = &self.vectors {
            let values = vectors.embedder.embed(&item.content).await?;
            if values.is_empty() {
                return Err(RetrievalError::EmbeddingFailed("empty embedding".into()).into());
            }
            vectors
                .index
                .upsert(vec![Vector {
                    id: item.id.clone(),
                    values,
                    metadata: vector_metadata(&item),
                }])
                .await
                .map_err(RetrievalError::QueryFailed)?;
        }

        self.repository.save(&item).await?;
        info!(id = %item.id, category = item.category.as_str(), indexed = self.is_indexed(), "Knowledge item created");
        Ok(item)
    }

    pub async fn list(&self) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        Ok(self.repository.list().await?)
    }

    /// Items most similar to `query`, best first. `top_k` is clamped to 1..=50.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<KnowledgeItem>, KnowledgeError> {
        if query.trim().is_empty() {
            return Err(KnowledgeError::Invalid("query is required".into()));
        }
        let Some(vectors) = &self.vectors else {
            return Ok(Vec::new());
        };

        let values = vectors.embedder.embed(query).await?;
        if values.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = Map::new();
        filter.insert("status".into(), Value::String("active".into()));
        let matches = vectors
            .index
            .query(values, top_k.clamp(1, MAX_SEARCH_TOP_K), filter)
            .await
            .map_err(RetrievalError::QueryFailed)?;

        let mut items = Vec::with_capacity(matches.len());
        for m in matches {
            match self.repository.get(&m.id).await? {
                Some(item) => items.push(item),
                None => warn!(id = %m.id, "Indexed vector has no catalogue entry"),
            }
        }
        Ok(items)
    }

    /// Remove an item from the index and the catalogue. `Ok(false)` when unknown.
    pub async fn delete(&self, id: &str) -> Result<bool, KnowledgeError> {
        if self.repository.get(id).await?.is_none() {
            return Ok(false);
        }
        if let Some(vectors) = &self.vectors {
            vectors
                .index
                .delete(vec![id.to_string()])
                .await
                .map_err(RetrievalError::QueryFailed)?;
        }
        let removed = self.repository.delete(id).await?;
        info!(id, "Knowledge item deleted");
        Ok(removed)
    }
}

/// Metadata stored with each vector. `title` and `content` feed chat context.
fn vector_metadata(item: &KnowledgeItem) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("title".into(), Value::String(item.title.clone()));
    metadata.insert("content".into(), Value::String(item.content.clone()));
    metadata.insert("category".into(), Value::String(item.category.as_str().into()));
    metadata.insert("difficulty".into(), Value::String(item.difficulty.as_str().into()));
    metadata.insert("language".into(), Value::String(item.language.clone()));
    metadata.insert(
        "tags".into(),
        Value::Array(item.tags.iter().cloned().map(Value::String).collect()),
    );
    metadata.insert("status".into(), Value::String("active".into()));
    metadata
}
