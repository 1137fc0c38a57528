//! In-memory knowledge catalogue.

use std::collections::HashMap;

use async_trait::async_trait;
use cleaners_core::error::StoreError;
use cleaners_core::knowledge::{KnowledgeItem, KnowledgeRepository};
use tokio::sync::RwLock;

#[derive(Default)]
pub struct InMemoryKnowledgeRepository {
    items: RwLock<HashMap<String, KnowledgeItem>>,
}

impl InMemoryKnowledgeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KnowledgeRepository for InMemoryKnowledgeRepository {
    fn name(&self) -> &str {
        "memory"
    }

    async fn save(&self, item: &KnowledgeItem) -> Result<(), StoreError> {
        self.items.write().await.insert(item.id.clone(), item.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<KnowledgeItem>, StoreError> {
        Ok(self.items.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<KnowledgeItem>, StoreError> {
        let mut items: Vec<KnowledgeItem> = self.items.read().await.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.items.write().await.remove(id).is_some())
    }
}
