//! Shared test doubles for orchestrator tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cleaners_core::error::{GatewayError, LookupError, RetrievalError, StoreError};
use cleaners_core::gateway::{Completion, ModelGateway, Prompt};
use cleaners_core::knowledge::KnowledgeRetriever;
use cleaners_core::message::{Role, SessionMessage};
use cleaners_core::session::SessionStore;
use cleaners_core::shop::{PartnerShop, ShopDirectory, ShopPriority};

/// Returns scripted replies in order and records every prompt it sees.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedGateway {
    replies: Mutex<Vec<Result<String, GatewayError>>>,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Result<String, GatewayError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().rev().collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
    }

    pub fn failing(err: GatewayError) -> Self {
        Self::new(vec![Err(err)])
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .expect("ScriptedGateway: no more replies");
        next.map(|content| Completion {
            content,
            model: "scripted-model".into(),
            usage: None,
        })
    }
}

/// Replies `re: <question>` after a short pause, so concurrent turns overlap.
pub struct EchoingGateway;

#[async_trait]
impl ModelGateway for EchoingGateway {
    fn name(&self) -> &str {
        "echoing"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(Completion {
            content: format!("re: {}", prompt.user_message),
            model: "echo-model".into(),
            usage: None,
        })
    }
}

/// Never answers within any reasonable test timeout.
pub struct StalledGateway;

#[async_trait]
impl ModelGateway for StalledGateway {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _prompt: &Prompt) -> Result<Completion, GatewayError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(GatewayError::Transport("unreachable".into()))
    }
}

pub struct FixedRetriever(pub &'static str);

#[async_trait]
impl KnowledgeRetriever for FixedRetriever {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn get_context(&self, _query: &str) -> Result<String, RetrievalError> {
        Ok(self.0.to_string())
    }
}

pub struct FailingRetriever;

#[async_trait]
impl KnowledgeRetriever for FailingRetriever {
    fn name(&self) -> &str {
        "failing"
    }

    async fn get_context(&self, _query: &str) -> Result<String, RetrievalError> {
        Err(RetrievalError::QueryFailed("index offline".into()))
    }
}

/// One partner shop for every non-empty location.
pub struct FixedShops;

#[async_trait]
impl ShopDirectory for FixedShops {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn find_by_location(&self, location: &str) -> Result<Vec<PartnerShop>, LookupError> {
        Ok(vec![PartnerShop {
            name: "클린마스터 세탁소".into(),
            zipcode: location.into(),
            priority: ShopPriority::Partner,
            rating: 4.8,
            specialties: vec!["실크".into()],
            subscription_status: "active".into(),
        }])
    }
}

pub struct FailingShops;

#[async_trait]
impl ShopDirectory for FailingShops {
    fn name(&self) -> &str {
        "failing"
    }

    async fn find_by_location(&self, _location: &str) -> Result<Vec<PartnerShop>, LookupError> {
        Err(LookupError::QueryFailed("directory offline".into()))
    }
}

/// Session store whose backend is gone.
pub struct UnreachableSessions;

#[async_trait]
impl SessionStore for UnreachableSessions {
    async fn add_message(
        &self,
        _session_id: &str,
        _role: Role,
        _content: &str,
    ) -> Result<(), StoreError> {
        Err(StoreError::Storage("connection refused".into()))
    }

    async fn get_history(&self, _session_id: &str) -> Result<Vec<SessionMessage>, StoreError> {
        Err(StoreError::Storage("connection refused".into()))
    }

    async fn clear_session(&self, _session_id: &str) -> Result<(), StoreError> {
        Err(StoreError::Storage("connection refused".into()))
    }
}
