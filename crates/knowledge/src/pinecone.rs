//! Pinecone vector index client, plus the retriever and shop directory
//! built on it.
//!
//! Both collaborators embed their query text first and then run a
//! metadata-filtered similarity query against an index:
//! - [`PineconeRetriever`] reads laundry knowledge and formats it as context
//! - [`PineconeShopDirectory`] reads partner shops filtered by zipcode

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cleaners_core::error::{LookupError, RetrievalError};
use cleaners_core::knowledge::{Embedder, KnowledgeRetriever};
use cleaners_core::shop::{PartnerShop, ShopDirectory, ShopPriority};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Thin client for a single Pinecone index (`/query`, `/vectors/upsert`,
/// `/vectors/delete`).
pub struct PineconeIndex {
    host: String,
    api_key: String,
    namespace: Option<String>,
    client: reqwest::Client,
}

impl PineconeIndex {
    pub fn new(host: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            host: host.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            namespace: None,
            client,
        }
    }

    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    /// Similarity query with metadata included. An empty filter is omitted.
    pub async fn query(
        &self,
        vector: Vec<f32>,
        top_k: usize,
        filter: Map<String, Value>,
    ) -> Result<Vec<QueryMatch>, String> {
        let request = QueryRequest {
            vector,
            top_k,
            include_metadata: true,
            namespace: self.namespace.clone(),
            filter: (!filter.is_empty()).then_some(filter),
        };

        let response = self.post("query", &request).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| format!("Failed to parse query response: {e}"))?;

        debug!(host = %self.host, matches = parsed.matches.len(), "Pinecone query complete");
        Ok(parsed.matches)
    }

    /// Insert or overwrite vectors by id.
    pub async fn upsert(&self, vectors: Vec<Vector>) -> Result<(), String> {
        let count = vectors.len();
        let request = UpsertRequest {
            vectors,
            namespace: self.namespace.clone(),
        };
        self.post("vectors/upsert", &request).await?;
        debug!(host = %self.host, count, "Pinecone upsert complete");
        Ok(())
    }

    pub async fn delete(&self, ids: Vec<String>) -> Result<(), String> {
        let request = DeleteRequest {
            ids,
            namespace: self.namespace.clone(),
        };
        self.post("vectors/delete", &request).await?;
        debug!(host = %self.host, "Pinecone delete complete");
        Ok(())
    }

    async fn post<T: Serialize>(&self, endpoint: &str, body: &T) -> Result<reqwest::Response, String> {
        let response = self
            .client
            .post(format!("{}/{endpoint}", self.host))
            .header("Api-Key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("status {}: {body}", status.as_u16()));
        }
        Ok(response)
    }
}

/// A vector to upsert, with the metadata later returned by queries.
#[derive(Debug, Clone, Serialize)]
pub struct Vector {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest {
    vectors: Vec<Vector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest {
    ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    #[serde(default)]
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

fn meta_str<'a>(metadata: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| metadata.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
}

/// Render a scalar metadata value; numbers and strings both occur in practice.
fn meta_display(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    match metadata.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Turn knowledge matches into one context block, numbered from 1.
pub fn format_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let title = meta_str(&m.metadata, &["title", "stain_type"]).unwrap_or("Unknown");
            let content = meta_str(&m.metadata, &["content", "description"]).unwrap_or("");
            match meta_display(&m.metadata, "success_rate") {
                Some(rate) => format!("{}. {title} (성공률: {rate})\n{content}", i + 1),
                None => format!("{}. {title}\n{content}", i + 1),
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

// --- knowledge retriever ---

pub struct PineconeRetriever {
    embedder: Arc<dyn Embedder>,
    index: PineconeIndex,
    top_k: usize,
    filter: Map<String, Value>,
}

impl PineconeRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: PineconeIndex) -> Self {
        Self {
            embedder,
            index,
            top_k: 3,
            filter: Map::new(),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_filter<I, K, V>(mut self, filter: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.filter = filter
            .into_iter()
            .map(|(k, v)| (k.into(), Value::String(v.into())))
            .collect();
        self
    }
}

#[async_trait]
impl KnowledgeRetriever for PineconeRetriever {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn get_context(&self, query: &str) -> Result<String, RetrievalError> {
        let vector = self.embedder.embed(query).await?;
        if vector.is_empty() {
            return Ok(String::new());
        }

        let matches = self
            .index
            .query(vector, self.top_k, self.filter.clone())
            .await
            .map_err(RetrievalError::QueryFailed)?;

        Ok(format_context(&matches))
    }
}

// --- shop directory ---

pub struct PineconeShopDirectory {
    embedder: Arc<dyn Embedder>,
    index: PineconeIndex,
    max_shops: usize,
}

impl PineconeShopDirectory {
    pub fn new(embedder: Arc<dyn Embedder>, index: PineconeIndex, max_shops: usize) -> Self {
        Self {
            embedder,
            index,
            max_shops: max_shops.max(1),
        }
    }
}

fn shop_from_match(m: &QueryMatch, location: &str) -> PartnerShop {
    let md = &m.metadata;
    let specialties = ["specialties", "specialty"]
        .iter()
        .find_map(|k| md.get(*k).and_then(Value::as_array))
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    PartnerShop {
        name: meta_str(md, &["name", "shop_name"]).unwrap_or("Unknown Shop").to_string(),
        zipcode: meta_str(md, &["zipcode"]).unwrap_or(location).to_string(),
        priority: meta_str(md, &["priority"])
            .and_then(|p| p.parse().ok())
            .unwrap_or(ShopPriority::Partner),
        rating: md.get("rating").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        specialties,
        subscription_status: meta_str(md, &["subscription", "subscription_status"])
            .unwrap_or("active")
            .to_string(),
    }
}

#[async_trait]
impl ShopDirectory for PineconeShopDirectory {
    fn name(&self) -> &str {
        "pinecone"
    }

    async fn find_by_location(&self, location: &str) -> Result<Vec<PartnerShop>, LookupError> {
        let location = location.trim();
        if location.is_empty() {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(&format!("세탁소 {location}"))
            .await
            .map_err(|e| LookupError::QueryFailed(e.to_string()))?;
        if vector.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = Map::new();
        filter.insert("subscription".into(), Value::String("active".into()));
        filter.insert("zipcode".into(), Value::String(location.into()));

        let matches = self
            .index
            .query(vector, self.max_shops, filter)
            .await
            .map_err(LookupError::QueryFailed)?;

        let mut shops: Vec<PartnerShop> = matches.iter().map(|m| shop_from_match(m, location)).collect();
        let before = shops.len();
        shops.retain(|s| s.subscription_status == "active");
        if shops.len() != before {
            warn!(dropped = before - shops.len(), "Index returned inactive shops");
        }
        shops.sort_by(PartnerShop::display_order);
        Ok(shops)
    }
}
