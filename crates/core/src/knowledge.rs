//! Knowledge retrieval traits and the curated knowledge base.
//!
//! A [`KnowledgeRetriever`] turns a user question into a block of grounding
//! text. An empty string means "nothing relevant", which is not an error.
//!
//! [`KnowledgeItem`]s are curated entries kept in a [`KnowledgeRepository`]
//! and mirrored into the vector index the retriever searches.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{RetrievalError, StoreError};

#[async_trait]
pub trait KnowledgeRetriever: Send + Sync {
    fn name(&self) -> &str;

    /// Relevance-ranked context for `query`, or an empty string.
    async fn get_context(&self, query: &str) -> Result<String, RetrievalError>;
}

/// Produces dense vectors for semantic search.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError>;
}

// --- Knowledge base management ---

/// Subject area of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    StainRemoval,
    FabricUnderstanding,
    AccidentPrevention,
    LaundryTechnique,
    EquipmentOperation,
    Marketing,
    #[default]
    Others,
}

impl KnowledgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StainRemoval => "stain_removal",
            Self::FabricUnderstanding => "fabric_understanding",
            Self::AccidentPrevention => "accident_prevention",
            Self::LaundryTechnique => "laundry_technique",
            Self::EquipmentOperation => "equipment_operation",
            Self::Marketing => "marketing",
            Self::Others => "others",
        }
    }
}

impl FromStr for KnowledgeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stain_removal" => Ok(Self::StainRemoval),
            "fabric_understanding" => Ok(Self::FabricUnderstanding),
            "accident_prevention" => Ok(Self::AccidentPrevention),
            "laundry_technique" => Ok(Self::LaundryTechnique),
            "equipment_operation" => Ok(Self::EquipmentOperation),
            "marketing" => Ok(Self::Marketing),
            "others" => Ok(Self::Others),
            other => Err(format!("unknown knowledge category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    #[default]
    Basic,
    Expert,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Expert => "expert",
        }
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Self::Basic),
            "expert" => Ok(Self::Expert),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

pub const DEFAULT_KNOWLEDGE_LANGUAGE: &str = "KR";

/// One curated piece of laundry knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: KnowledgeCategory,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub language: String,
    /// User id of the author; `None` for items loaded by tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KnowledgeItem {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            content: content.into(),
            category: KnowledgeCategory::default(),
            difficulty: Difficulty::default(),
            tags: Vec::new(),
            language: DEFAULT_KNOWLEDGE_LANGUAGE.into(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Catalogue of knowledge items, the source of truth behind the vector index.
#[async_trait]
pub trait KnowledgeRepository: Send + Sync {
    fn name(&self) -> &str;

    async fn save(&self, item: &KnowledgeItem) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>, StoreError>;

    /// All items, newest first.
    async fn list(&self) -> Result<Vec<KnowledgeItem>, StoreError>;

    /// `Ok(false)` when no such item existed.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;
}
