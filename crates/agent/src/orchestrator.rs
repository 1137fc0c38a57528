//! Message orchestrator — turns one user message into one model reply.
//!
//! # Flow
//!
//! 1. Reject empty input (no side effects)
//! 2. Resolve the session id, generating one when absent
//! 3. Record the user message in session memory
//! 4. Retrieve knowledge context (failure → no context)
//! 5. Assemble persona + context + prior turns + current message
//! 6. Call the model gateway (failure → `ModelUnavailable`, nothing recorded)
//! 7. Record the assistant reply
//! 8. Evaluate the recommendation policy and look up shops (failure → none)
//!
//! A session belongs to the caller that first used it. Another caller gets
//! [`Error::SessionNotFound`] for it, the same as for a conversation they
//! do not own.
//!
//! When a [`ConversationStore`] is attached, both turns of an identified
//! caller are also mirrored into it. Mirroring is best effort and never
//! fails a request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use cleaners_config::AppConfig;
use cleaners_core::caller::Caller;
use cleaners_core::conversation::{Conversation, ConversationStore, StoredMessage};
use cleaners_core::error::{Error, GatewayError, StoreError};
use cleaners_core::gateway::{Completion, ModelGateway, Prompt};
use cleaners_core::knowledge::KnowledgeRetriever;
use cleaners_core::message::{Role, SessionId, SessionMessage};
use cleaners_core::session::SessionStore;
use cleaners_core::shop::{PartnerShop, ShopDirectory};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::prompt::PromptBuilder;
use crate::recommend::{KeywordRules, RecommendationEvaluator};

/// Lifecycle of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    ContextRetrieved,
    ModelInvoked,
    Completed,
    Failed,
}

impl RequestState {
    fn advance(self, next: RequestState, session_id: &SessionId) -> RequestState {
        debug!(session_id = %session_id, from = ?self, to = ?next, "Request state");
        next
    }
}

/// One inbound chat message.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub caller: Caller,
    pub message: String,
    pub session_id: Option<String>,
    /// Location key (zipcode) used for shop lookup
    pub location: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }
}

/// The reply and any shops worth suggesting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub message: String,
    pub recommended_shops: Vec<PartnerShop>,
}

#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub session_id: SessionId,
    /// Set when the turn was mirrored into the conversation store.
    pub conversation_id: Option<String>,
    pub result: RecommendationResult,
}

pub struct MessageOrchestrator {
    sessions: Arc<dyn SessionStore>,
    retriever: Arc<dyn KnowledgeRetriever>,
    gateway: Arc<dyn ModelGateway>,
    evaluator: RecommendationEvaluator,
    prompts: PromptBuilder,
    conversations: Option<Arc<dyn ConversationStore>>,
    /// Session id → the caller that owns it.
    owners: RwLock<HashMap<String, Caller>>,
    model_timeout: Duration,
    retrieval_timeout: Duration,
}

impl MessageOrchestrator {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        retriever: Arc<dyn KnowledgeRetriever>,
        gateway: Arc<dyn ModelGateway>,
        shops: Arc<dyn ShopDirectory>,
    ) -> Self {
        Self {
            sessions,
            retriever,
            gateway,
            evaluator: RecommendationEvaluator::new(shops),
            prompts: PromptBuilder::default(),
            conversations: None,
            owners: RwLock::new(HashMap::new()),
            model_timeout: Duration::from_secs(60),
            retrieval_timeout: Duration::from_secs(30),
        }
    }

    /// Apply persona, keyword lists, and timeouts from configuration.
    pub fn configured(mut self, config: &AppConfig) -> Self {
        self.prompts = PromptBuilder::from_config(&config.assistant);
        self.evaluator = self
            .evaluator
            .with_rules(KeywordRules::from_config(&config.recommendation));
        self.model_timeout = Duration::from_secs(config.model.timeout_secs);
        self.retrieval_timeout = Duration::from_secs(config.knowledge.timeout_secs);
        self
    }

    pub fn with_conversation_store(mut self, store: Option<Arc<dyn ConversationStore>>) -> Self {
        self.conversations = store;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptBuilder) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_timeouts(mut self, model: Duration, retrieval: Duration) -> Self {
        self.model_timeout = model;
        self.retrieval_timeout = retrieval;
        self
    }

    pub fn evaluator(&self) -> &RecommendationEvaluator {
        &self.evaluator
    }

    pub fn gateway(&self) -> &Arc<dyn ModelGateway> {
        &self.gateway
    }

    pub fn conversation_store(&self) -> Option<&Arc<dyn ConversationStore>> {
        self.conversations.as_ref()
    }

    /// Process one user message end to end.
    pub async fn process_message(&self, request: ChatRequest) -> Result<ChatOutcome, Error> {
        if request.message.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let session_id = SessionId::or_generate(request.session_id.as_deref());
        let user_message = request.message.as_str();
        let mut state = RequestState::Received;

        info!(session_id = %session_id, caller = %request.caller, "Processing message");

        if !self.claim(session_id.as_str(), &request.caller).await {
            let err = Error::SessionNotFound(session_id.to_string());
            return Err(self.fail(state, &session_id, err));
        }

        if let Err(e) = self
            .sessions
            .add_message(session_id.as_str(), Role::User, user_message)
            .await
        {
            return Err(self.fail(state, &session_id, Error::StoreUnavailable(e)));
        }

        let conversation_id = self.mirror_user_turn(&request.caller, &session_id, user_message).await;

        let context = self.retrieve_context(user_message).await;
        state = state.advance(RequestState::ContextRetrieved, &session_id);

        let history = match self.sessions.get_history(session_id.as_str()).await {
            Ok(history) => history,
            Err(e) => return Err(self.fail(state, &session_id, Error::StoreUnavailable(e))),
        };
        let prompt = self.prompts.build(&context, history, user_message);

        let reply = match self.complete(&prompt).await {
            Ok(completion) => completion.content,
            Err(e) => return Err(self.fail(state, &session_id, Error::ModelUnavailable(e))),
        };
        state = state.advance(RequestState::ModelInvoked, &session_id);

        if let Err(e) = self
            .sessions
            .add_message(session_id.as_str(), Role::Assistant, &reply)
            .await
        {
            return Err(self.fail(state, &session_id, Error::StoreUnavailable(e)));
        }

        if let Some(id) = &conversation_id {
            self.mirror(StoredMessage::new(id.clone(), Role::Assistant, reply.clone()))
                .await;
        }

        let recommended_shops = self
            .recommend(user_message, request.location.as_deref().unwrap_or(""))
            .await;

        state.advance(RequestState::Completed, &session_id);
        info!(
            session_id = %session_id,
            shops = recommended_shops.len(),
            "Message processed"
        );

        Ok(ChatOutcome {
            session_id,
            conversation_id,
            result: RecommendationResult {
                message: reply,
                recommended_shops,
            },
        })
    }

    /// Drop all session memory for `session_id`. Idempotent.
    pub async fn clear_session(&self, caller: &Caller, session_id: &str) -> Result<(), Error> {
        self.check_owner(caller, session_id).await?;
        self.sessions
            .clear_session(session_id)
            .await
            .map_err(Error::StoreUnavailable)?;
        info!(session_id, "Session cleared");
        Ok(())
    }

    /// Current session memory, oldest first.
    pub async fn history(
        &self,
        caller: &Caller,
        session_id: &str,
    ) -> Result<Vec<SessionMessage>, Error> {
        self.check_owner(caller, session_id).await?;
        self.sessions
            .get_history(session_id)
            .await
            .map_err(Error::StoreUnavailable)
    }

    /// Bind an unowned session to `caller`. False when someone else owns it.
    ///
    /// A session not yet seen in this process inherits the owner of a
    /// stored conversation with the same id.
    async fn claim(&self, session_id: &str, caller: &Caller) -> bool {
        if let Some(owner) = self.owners.read().await.get(session_id) {
            return owner == caller;
        }

        let stored_owner = match &self.conversations {
            Some(store) => match store.get(session_id).await {
                Ok(found) => found.map(|c| c.owner),
                Err(e) => {
                    warn!(store = store.name(), error = %e, "Could not look up session owner");
                    None
                }
            },
            None => None,
        };

        let mut owners = self.owners.write().await;
        let owner = owners
            .entry(session_id.to_string())
            .or_insert_with(|| stored_owner.unwrap_or_else(|| caller.clone()));
        owner == caller
    }

    async fn check_owner(&self, caller: &Caller, session_id: &str) -> Result<(), Error> {
        match self.owners.read().await.get(session_id) {
            Some(owner) if owner != caller => {
                warn!(session_id, caller = %caller, "Session owned by another caller");
                Err(Error::SessionNotFound(session_id.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn fail(&self, state: RequestState, session_id: &SessionId, err: Error) -> Error {
        state.advance(RequestState::Failed, session_id);
        warn!(session_id = %session_id, from = ?state, error = %err, "Request failed");
        err
    }

    async fn retrieve_context(&self, query: &str) -> String {
        match tokio::time::timeout(self.retrieval_timeout, self.retriever.get_context(query)).await {
            Ok(Ok(context)) => {
                debug!(retriever = self.retriever.name(), chars = context.len(), "Context retrieved");
                context
            }
            Ok(Err(e)) => {
                warn!(retriever = self.retriever.name(), error = %e, "Retrieval failed, continuing without context");
                String::new()
            }
            Err(_) => {
                warn!(
                    retriever = self.retriever.name(),
                    timeout_secs = self.retrieval_timeout.as_secs(),
                    "Retrieval timed out, continuing without context"
                );
                String::new()
            }
        }
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError> {
        debug!(gateway = self.gateway.name(), prior_turns = prompt.prior_turns.len(), "Invoking model");
        match tokio::time::timeout(self.model_timeout, self.gateway.complete(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(format!(
                "no reply within {}s",
                self.model_timeout.as_secs()
            ))),
        }
    }

    async fn recommend(&self, user_message: &str, location: &str) -> Vec<PartnerShop> {
        // No numeric success-rate signal is available at this point.
        if !self.evaluator.should_recommend(user_message, None) {
            return Vec::new();
        }
        if location.trim().is_empty() {
            debug!("Recommendation triggered but no location given");
            return Vec::new();
        }

        match self.evaluator.get_shops_by_location(location).await {
            Ok(shops) => shops,
            Err(e) => {
                warn!(location, error = %e, "Shop lookup failed, returning no shops");
                Vec::new()
            }
        }
    }

    /// Ensure the conversation exists and record the user turn.
    /// Returns the conversation id when mirroring is active for this caller.
    /// Anonymous callers have no durable history.
    async fn mirror_user_turn(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        user_message: &str,
    ) -> Option<String> {
        let store = self.conversations.as_ref()?;
        if caller.user_id().is_none() {
            return None;
        }
        let id = session_id.as_str();

        let ready = ensure_conversation(store.as_ref(), id, caller).await;

        match ready {
            Ok(true) => {
                self.mirror(StoredMessage::new(id, Role::User, user_message)).await;
                Some(id.to_string())
            }
            Ok(false) => {
                warn!(session_id = %session_id, caller = %caller, "Conversation owned by another caller, not mirroring");
                None
            }
            Err(e) => {
                warn!(store = store.name(), error = %e, "Conversation store unavailable, not mirroring");
                None
            }
        }
    }

    async fn mirror(&self, message: StoredMessage) {
        if let Some(store) = &self.conversations {
            if let Err(e) = store.append_message(&message).await {
                warn!(store = store.name(), error = %e, "Failed to persist message");
            }
        }
    }
}

/// Create the conversation on first use. `Ok(false)` when it belongs to
/// someone else.
async fn ensure_conversation(
    store: &dyn ConversationStore,
    id: &str,
    caller: &Caller,
) -> Result<bool, StoreError> {
    let stored = store.create(&Conversation::new(id, caller.clone())).await?;
    Ok(&stored.owner == caller)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use cleaners_memory::{InMemoryConversationStore, InMemorySessionStore};

    struct Harness {
        sessions: Arc<InMemorySessionStore>,
        gateway: Arc<ScriptedGateway>,
        orchestrator: MessageOrchestrator,
    }

    fn harness_with(
        gateway: ScriptedGateway,
        retriever: Arc<dyn KnowledgeRetriever>,
        shops: Arc<dyn ShopDirectory>,
    ) -> Harness {
        let sessions = Arc::new(InMemorySessionStore::default());
        let gateway = Arc::new(gateway);
        let orchestrator = MessageOrchestrator::new(
            sessions.clone(),
            retriever,
            gateway.clone(),
            shops,
        )
        .with_prompts(PromptBuilder::new("PERSONA", "\n\nCONTEXT:\n"));
        Harness {
            sessions,
            gateway,
            orchestrator,
        }
    }

    fn harness(replies: &[&str]) -> Harness {
        harness_with(
            ScriptedGateway::replying(replies),
            Arc::new(FixedRetriever("")),
            Arc::new(FixedShops),
        )
    }

    #[tokio::test]
    async fn empty_message_is_rejected_without_side_effects() {
        let h = harness(&[]);
        let err = h
            .orchestrator
            .process_message(ChatRequest::new("").with_session("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));

        let err = h
            .orchestrator
            .process_message(ChatRequest::new("   \n").with_session("s1"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EmptyInput));

        assert!(h.sessions.get_history("s1").await.unwrap().is_empty());
        assert_eq!(h.sessions.session_count().await, 0);
        assert_eq!(h.gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn missing_session_id_is_generated() {
        let h = harness(&["hello"]);
        let outcome = h
            .orchestrator
            .process_message(ChatRequest::new("hi"))
            .await
            .unwrap();
        assert!(uuid::Uuid::parse_str(outcome.session_id.as_str()).is_ok());
        assert_eq!(
            h.sessions.get_history(outcome.session_id.as_str()).await.unwrap().len(),
            2
        );
    }

    #[tokio::test]
    async fn two_turns_build_alternating_history() {
        let h = harness(&["a1", "a2"]);
        h.orchestrator
            .process_message(ChatRequest::new("q1").with_session("s"))
            .await
            .unwrap();
        let outcome = h
            .orchestrator
            .process_message(ChatRequest::new("q2").with_session("s"))
            .await
            .unwrap();
        assert_eq!(outcome.result.message, "a2");

        let history = h.sessions.get_history("s").await.unwrap();
        assert_eq!(
            history,
            vec![
                SessionMessage::user("q1"),
                SessionMessage::assistant("a1"),
                SessionMessage::user("q2"),
                SessionMessage::assistant("a2"),
            ]
        );

        // The second prompt carries the first exchange as prior turns.
        let prompts = h.gateway.prompts();
        assert!(prompts[0].prior_turns.is_empty());
        assert_eq!(
            prompts[1].prior_turns,
            vec![SessionMessage::user("q1"), SessionMessage::assistant("a1")]
        );
        assert_eq!(prompts[1].user_message, "q2");
    }

    #[tokio::test]
    async fn gateway_failure_keeps_only_user_message() {
        let h = harness_with(
            ScriptedGateway::failing(GatewayError::Transport("connection reset".into())),
            Arc::new(FixedRetriever("")),
            Arc::new(FixedShops),
        );
        let err = h
            .orchestrator
            .process_message(ChatRequest::new("help").with_session("s"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ModelUnavailable(GatewayError::Transport(_))));
        assert_eq!(
            h.sessions.get_history("s").await.unwrap(),
            vec![SessionMessage::user("help")]
        );
    }

    #[tokio::test]
    async fn retrieved_context_is_appended_to_system_prompt() {
        let h = harness_with(
            ScriptedGateway::replying(&["ok"]),
            Arc::new(FixedRetriever("1. Wine\nBlot with cold water")),
            Arc::new(FixedShops),
        );
        h.orchestrator
            .process_message(ChatRequest::new("wine stain").with_session("s"))
            .await
            .unwrap();

        let prompt = &h.gateway.prompts()[0];
        assert_eq!(prompt.system, "PERSONA\n\nCONTEXT:\n1. Wine\nBlot with cold water");
    }

    #[tokio::test]
    async fn retrieval_failure_proceeds_without_context() {
        let h = harness_with(
            ScriptedGateway::replying(&["still answered"]),
            Arc::new(FailingRetriever),
            Arc::new(FixedShops),
        );
        let outcome = h
            .orchestrator
            .process_message(ChatRequest::new("grease").with_session("s"))
            .await
            .unwrap();
        assert_eq!(outcome.result.message, "still answered");
        assert_eq!(h.gateway.prompts()[0].system, "PERSONA");
    }

    #[tokio::test]
    async fn premium_fabric_with_location_recommends_shops() {
        let h = harness(&["맡기시는 게 좋습니다"]);
        let outcome = h
            .orchestrator
            .process_message(
                ChatRequest::new("실크 블라우스에 와인이 묻었어요")
                    .with_session("s")
                    .with_location("06236"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.result.recommended_shops.len(), 1);
        assert_eq!(outcome.result.recommended_shops[0].zipcode, "06236");
    }

    #[tokio::test]
    async fn no_location_means_no_shops() {
        let h = harness(&["ok"]);
        let outcome = h
            .orchestrator
            .process_message(ChatRequest::new("silk shirt").with_session("s"))
            .await
            .unwrap();
        assert!(outcome.result.recommended_shops.is_empty());
    }

    #[tokio::test]
    async fn plain_question_gets_no_shops() {
        let h = harness(&["ok"]);
        let outcome = h
            .orchestrator
            .process_message(
                ChatRequest::new("how do I fold a t-shirt")
                    .with_session("s")
                    .with_location("06236"),
            )
            .await
            .unwrap();
        assert!(outcome.result.recommended_shops.is_empty());
    }

    #[tokio::test]
    async fn lookup_failure_yields_empty_shops() {
        let h = harness_with(
            ScriptedGateway::replying(&["ok"]),
            Arc::new(FixedRetriever("")),
            Arc::new(FailingShops),
        );
        let outcome = h
            .orchestrator
            .process_message(
                ChatRequest::new("cashmere sweater")
                    .with_session("s")
                    .with_location("10001"),
            )
            .await
            .unwrap();
        assert_eq!(outcome.result.message, "ok");
        assert!(outcome.result.recommended_shops.is_empty());
    }

    #[tokio::test]
    async fn stalled_gateway_times_out_as_model_unavailable() {
        let sessions = Arc::new(InMemorySessionStore::default());
        let orchestrator = MessageOrchestrator::new(
            sessions.clone(),
            Arc::new(FixedRetriever("")),
            Arc::new(StalledGateway),
            Arc::new(FixedShops),
        )
        .with_timeouts(Duration::from_millis(20), Duration::from_millis(20));

        let err = orchestrator
            .process_message(ChatRequest::new("hello").with_session("s"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable(GatewayError::Timeout(_))));
        assert_eq!(sessions.get_history("s").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unreachable_session_store_is_surfaced() {
        let gateway = Arc::new(ScriptedGateway::replying(&[]));
        let orchestrator = MessageOrchestrator::new(
            Arc::new(UnreachableSessions),
            Arc::new(FixedRetriever("")),
            gateway.clone(),
            Arc::new(FixedShops),
        );
        let err = orchestrator
            .process_message(ChatRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(gateway.call_count(), 0);

        assert!(matches!(
            orchestrator.clear_session(&Caller::Anonymous, "s").await,
            Err(Error::StoreUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn clear_session_resets_history() {
        let h = harness(&["a1"]);
        h.orchestrator
            .process_message(ChatRequest::new("q1").with_session("s"))
            .await
            .unwrap();
        let anon = Caller::Anonymous;
        h.orchestrator.clear_session(&anon, "s").await.unwrap();
        h.orchestrator.clear_session(&anon, "s").await.unwrap();
        assert!(h.orchestrator.history(&anon, "s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_session_reads_empty_for_anyone() {
        let h = harness(&[]);
        let bob = Caller::user("bob");
        assert!(h.orchestrator.history(&bob, "never-used").await.unwrap().is_empty());
        h.orchestrator.clear_session(&bob, "never-used").await.unwrap();
    }

    #[tokio::test]
    async fn session_is_private_to_its_first_caller() {
        let h = harness(&["a1", "a2"]);
        let amy = Caller::user("amy");
        h.orchestrator
            .process_message(ChatRequest::new("my secret stain").with_session("amy-1").with_caller(amy.clone()))
            .await
            .unwrap();

        for intruder in [Caller::Anonymous, Caller::user("bob")] {
            assert!(matches!(
                h.orchestrator.history(&intruder, "amy-1").await,
                Err(Error::SessionNotFound(_))
            ));
            assert!(matches!(
                h.orchestrator.clear_session(&intruder, "amy-1").await,
                Err(Error::SessionNotFound(_))
            ));
            let err = h
                .orchestrator
                .process_message(
                    ChatRequest::new("what did I ask?").with_session("amy-1").with_caller(intruder),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, Error::SessionNotFound(_)));
        }

        // Only amy's single exchange reached the model or the session.
        assert_eq!(h.gateway.call_count(), 1);
        assert_eq!(
            h.orchestrator.history(&amy, "amy-1").await.unwrap(),
            vec![SessionMessage::user("my secret stain"), SessionMessage::assistant("a1")]
        );
    }

    #[tokio::test]
    async fn stored_conversation_owner_claims_the_session() {
        let store = Arc::new(InMemoryConversationStore::new());
        store
            .create(&Conversation::new("kept", Caller::user("amy")))
            .await
            .unwrap();
        let h = harness(&["a1"]);
        let orchestrator = h
            .orchestrator
            .with_conversation_store(Some(store as Arc<dyn ConversationStore>));

        let err = orchestrator
            .process_message(ChatRequest::new("hi").with_session("kept").with_caller(Caller::user("bob")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));

        let outcome = orchestrator
            .process_message(ChatRequest::new("hi").with_session("kept").with_caller(Caller::user("amy")))
            .await
            .unwrap();
        assert_eq!(outcome.conversation_id.as_deref(), Some("kept"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_turns_on_one_session_are_all_kept() {
        let sessions = Arc::new(InMemorySessionStore::default());
        let store = Arc::new(InMemoryConversationStore::new());
        let orchestrator = Arc::new(
            MessageOrchestrator::new(
                sessions.clone(),
                Arc::new(FixedRetriever("")),
                Arc::new(EchoingGateway),
                Arc::new(FixedShops),
            )
            .with_conversation_store(Some(store.clone() as Arc<dyn ConversationStore>)),
        );
        let amy = Caller::user("amy");

        let turn = |question: &'static str| {
            let orchestrator = Arc::clone(&orchestrator);
            let caller = amy.clone();
            tokio::spawn(async move {
                orchestrator
                    .process_message(ChatRequest::new(question).with_session("shared").with_caller(caller))
                    .await
            })
        };
        let (first, second) = tokio::join!(turn("q1"), turn("q2"));
        let first = first.unwrap().unwrap();
        let second = second.unwrap().unwrap();
        assert_eq!(first.result.message, "re: q1");
        assert_eq!(second.result.message, "re: q2");

        let history = sessions.get_history("shared").await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.iter().filter(|m| m.role == Role::User).count(), 2);
        assert_eq!(history.iter().filter(|m| m.role == Role::Assistant).count(), 2);
        for q in ["q1", "q2"] {
            let asked = history.iter().position(|m| m.content == q).unwrap();
            let answered = history.iter().position(|m| m.content == format!("re: {q}")).unwrap();
            assert!(asked < answered, "reply to {q} precedes its question");
        }

        // Both first turns reached the same durable conversation.
        assert_eq!(first.conversation_id.as_deref(), Some("shared"));
        assert_eq!(second.conversation_id.as_deref(), Some("shared"));
        assert_eq!(store.list_by_user(&amy).await.unwrap().len(), 1);
        assert_eq!(store.messages("shared").await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn turns_are_mirrored_into_conversation_store() {
        let store = Arc::new(InMemoryConversationStore::new());
        let h = harness(&["a1", "a2"]);
        let orchestrator = h
            .orchestrator
            .with_conversation_store(Some(store.clone() as Arc<dyn ConversationStore>));
        let alice = Caller::user("alice");

        for q in ["q1", "q2"] {
            let outcome = orchestrator
                .process_message(ChatRequest::new(q).with_session("conv-1").with_caller(alice.clone()))
                .await
                .unwrap();
            assert_eq!(outcome.conversation_id.as_deref(), Some("conv-1"));
        }

        let listed = store.list_by_user(&alice).await.unwrap();
        assert_eq!(listed.len(), 1);
        let contents: Vec<_> = store
            .messages("conv-1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, ["q1", "a1", "q2", "a2"]);
    }

    #[tokio::test]
    async fn anonymous_turns_are_not_mirrored() {
        let store = Arc::new(InMemoryConversationStore::new());
        let h = harness(&["a1", "a2"]);
        let orchestrator = h
            .orchestrator
            .with_conversation_store(Some(store.clone() as Arc<dyn ConversationStore>));

        for session in ["anon-a", "anon-b"] {
            let outcome = orchestrator
                .process_message(ChatRequest::new("q").with_session(session))
                .await
                .unwrap();
            assert!(outcome.conversation_id.is_none());
        }

        assert!(store.list_by_user(&Caller::Anonymous).await.unwrap().is_empty());
        assert!(store.get("anon-a").await.unwrap().is_none());
    }
}
