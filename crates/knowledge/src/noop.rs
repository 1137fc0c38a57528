//! Retriever used when knowledge search is disabled. Always empty.

use async_trait::async_trait;
use cleaners_core::error::RetrievalError;
use cleaners_core::knowledge::KnowledgeRetriever;

pub struct NoopRetriever;

#[async_trait]
impl KnowledgeRetriever for NoopRetriever {
    fn name(&self) -> &str {
        "none"
    }

    async fn get_context(&self, _query: &str) -> Result<String, RetrievalError> {
        Ok(String::new())
    }
}
