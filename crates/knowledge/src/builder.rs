//! Builds the configured retriever, knowledge base, and shop directory.

use std::sync::Arc;
use std::time::Duration;

use cleaners_config::AppConfig;
use cleaners_core::error::{LookupError, RetrievalError};
use cleaners_core::knowledge::{Embedder, KnowledgeRepository, KnowledgeRetriever};
use cleaners_core::shop::ShopDirectory;
use cleaners_providers::build_embedder;
use tracing::info;

use crate::catalog::KnowledgeBase;
use crate::noop::NoopRetriever;
use crate::pinecone::{PineconeIndex, PineconeRetriever, PineconeShopDirectory};
use crate::static_shops::StaticShopDirectory;

fn embedder(config: &AppConfig) -> Result<Arc<dyn Embedder>, String> {
    let timeout = Duration::from_secs(config.knowledge.timeout_secs);
    build_embedder(&config.knowledge.embedding, timeout)
        .map(|e| Arc::new(e) as Arc<dyn Embedder>)
        .map_err(|e| e.to_string())
}

fn knowledge_index(config: &AppConfig) -> Result<PineconeIndex, RetrievalError> {
    let knowledge = &config.knowledge;
    let host = knowledge
        .index_host
        .clone()
        .ok_or_else(|| RetrievalError::NotConfigured("knowledge.index_host is not set".into()))?;
    let api_key = knowledge
        .api_key
        .clone()
        .ok_or_else(|| RetrievalError::NotConfigured("PINECONE_API_KEY is not set".into()))?;

    Ok(PineconeIndex::new(host, api_key, Duration::from_secs(knowledge.timeout_secs))
        .with_namespace(knowledge.namespace.clone()))
}

pub fn build_retriever(config: &AppConfig) -> Result<Arc<dyn KnowledgeRetriever>, RetrievalError> {
    let knowledge = &config.knowledge;
    if knowledge.backend != "pinecone" {
        return Ok(Arc::new(NoopRetriever));
    }

    let index = knowledge_index(config)?;
    let retriever = PineconeRetriever::new(embedder(config).map_err(RetrievalError::NotConfigured)?, index)
        .with_top_k(knowledge.top_k)
        .with_filter(knowledge.filter.clone());

    info!(top_k = knowledge.top_k, "Pinecone knowledge retriever ready");
    Ok(Arc::new(retriever))
}

/// The knowledge base over `repository`, indexed into the same index the
/// retriever reads when the Pinecone backend is configured.
pub fn build_knowledge_base(
    config: &AppConfig,
    repository: Arc<dyn KnowledgeRepository>,
) -> Result<KnowledgeBase, RetrievalError> {
    let base = KnowledgeBase::new(repository);
    if config.knowledge.backend != "pinecone" {
        return Ok(base);
    }

    let index = knowledge_index(config)?;
    let embedder = embedder(config).map_err(RetrievalError::NotConfigured)?;
    Ok(base.with_index(embedder, index))
}

pub fn build_shop_directory(config: &AppConfig) -> Result<Arc<dyn ShopDirectory>, LookupError> {
    let rec = &config.recommendation;

    if rec.directory == "pinecone" {
        let host = rec.partner_index_host.clone().ok_or_else(|| {
            LookupError::NotConfigured("recommendation.partner_index_host is not set".into())
        })?;
        let api_key = config
            .knowledge
            .api_key
            .clone()
            .ok_or_else(|| LookupError::NotConfigured("PINECONE_API_KEY is not set".into()))?;

        let index = PineconeIndex::new(host, api_key, Duration::from_secs(config.knowledge.timeout_secs))
            .with_namespace(rec.partner_namespace.clone());
        let embedder = embedder(config).map_err(LookupError::NotConfigured)?;
        info!("Pinecone shop directory ready");
        return Ok(Arc::new(PineconeShopDirectory::new(embedder, index, rec.max_shops)));
    }

    if rec.shops.is_empty() {
        info!("No shops configured, using demo shop directory");
        return Ok(Arc::new(StaticShopDirectory::demo()));
    }

    info!(shops = rec.shops.len(), "Static shop directory ready");
    Ok(Arc::new(StaticShopDirectory::new(rec.shops.clone(), rec.max_shops)))
}
