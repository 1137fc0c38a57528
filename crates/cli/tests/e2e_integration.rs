//! End-to-end integration tests for the Cleaners chat backend.
//!
//! These tests exercise the full pipeline from user message to reply,
//! including configuration-driven assembly, knowledge retrieval over HTTP,
//! shop recommendation, session memory, durable storage, and the HTTP API.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cleaners_agent::{ChatRequest, MessageOrchestrator};
use cleaners_config::AppConfig;
use cleaners_core::caller::Caller;
use cleaners_core::conversation::ConversationStore;
use cleaners_core::error::{Error, GatewayError};
use cleaners_core::gateway::{Completion, ModelGateway, Prompt};
use cleaners_core::message::Role;
use cleaners_core::session::SessionStore;
use cleaners_gateway::{
    AppState, ChatResponse, KnowledgeCreatedResponse, KnowledgeSearchResponse,
    SessionHistoryResponse, build_router,
};
use cleaners_knowledge::{NoopRetriever, StaticShopDirectory};
use cleaners_memory::{InMemorySessionStore, SqliteConversationStore};
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Mock Gateway ─────────────────────────────────────────────────────────

/// Returns numbered replies and records every prompt.
struct CountingGateway {
    prompts: std::sync::Mutex<Vec<Prompt>>,
}

impl CountingGateway {
    fn new() -> Self {
        Self {
            prompts: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModelGateway for CountingGateway {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError> {
        let mut prompts = self.prompts.lock().unwrap();
        prompts.push(prompt.clone());
        Ok(Completion {
            content: format!("reply #{}", prompts.len()),
            model: "e2e".into(),
            usage: None,
        })
    }
}

fn local_orchestrator(
    gateway: Arc<dyn ModelGateway>,
    sessions: Arc<dyn SessionStore>,
) -> MessageOrchestrator {
    MessageOrchestrator::new(
        sessions,
        Arc::new(NoopRetriever),
        gateway,
        Arc::new(StaticShopDirectory::demo()),
    )
}

/// A configuration whose model, embeddings, and index all point at `server`.
fn config_for(server: &MockServer) -> AppConfig {
    let mut config = AppConfig::default();
    config.model.provider = "openai".into();
    config.model.api_url = Some(server.uri());
    config.model.api_key = Some("sk-e2e".into());
    config.model.timeout_secs = 5;
    config.knowledge.backend = "pinecone".into();
    config.knowledge.index_host = Some(server.uri());
    config.knowledge.api_key = Some("pc-e2e".into());
    config.knowledge.timeout_secs = 5;
    config.knowledge.embedding.api_url = server.uri();
    config.knowledge.embedding.api_key = Some("sk-embed".into());
    config.storage.backend = "memory".into();
    config
}

async fn mount_embeddings(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2, 0.3]}]
        })))
        .mount(server)
        .await;
}

async fn mount_completion(server: &MockServer, reply: &str) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "gpt-4.1",
            "choices": [{"message": {"role": "assistant", "content": reply}}]
        })))
        .mount(server)
        .await;
}

/// The system message of the last chat-completions call the server saw.
async fn last_system_message(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap();
    let request = requests
        .iter()
        .rev()
        .find(|r| r.url.path() == "/chat/completions")
        .expect("no completion request");
    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    body["messages"][0]["content"].as_str().unwrap().to_string()
}

// ── Configuration-driven pipeline ────────────────────────────────────────

#[tokio::test]
async fn e2e_retrieval_grounds_reply_and_recommends_shops() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": [
            {"id": "k1", "score": 0.91, "metadata": {
                "title": "실크 커피 얼룩", "content": "Blot with diluted vinegar.", "success_rate": 40
            }}
        ]})))
        .expect(1)
        .mount(&server)
        .await;
    mount_completion(&server, "실크는 집에서 건드리면 거의 망가집니다.").await;

    let config = config_for(&server);
    let orchestrator = cleaners_gateway::build_orchestrator(&config).await.unwrap();

    let outcome = orchestrator
        .process_message(
            ChatRequest::new("실크 블라우스에 커피를 쏟았어요")
                .with_session("e2e-1")
                .with_location("06236")
                .with_caller(Caller::user("amy")),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result.message, "실크는 집에서 건드리면 거의 망가집니다.");
    assert_eq!(outcome.session_id.as_str(), "e2e-1");
    assert_eq!(outcome.result.recommended_shops.len(), 2);
    assert!(
        outcome
            .result
            .recommended_shops
            .iter()
            .all(|s| s.zipcode == "06236")
    );

    let system = last_system_message(&server).await;
    assert!(system.contains("## 관련 세탁 지식 (검색 결과):"));
    assert!(system.contains("1. 실크 커피 얼룩 (성공률: 40)\nBlot with diluted vinegar."));

    // Both turns were mirrored under the caller.
    let store = orchestrator.conversation_store().unwrap();
    let conversations = store.list_by_user(&Caller::user("amy")).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, "e2e-1");
    let messages = store.messages("e2e-1").await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
}

#[tokio::test]
async fn e2e_index_outage_still_answers_without_context() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(503).set_body_string("index unavailable"))
        .mount(&server)
        .await;
    mount_completion(&server, "찬물로 두드려 주세요.").await;

    let orchestrator = cleaners_gateway::build_orchestrator(&config_for(&server))
        .await
        .unwrap();
    let outcome = orchestrator
        .process_message(ChatRequest::new("면 티셔츠 김치 국물"))
        .await
        .unwrap();

    assert_eq!(outcome.result.message, "찬물로 두드려 주세요.");
    assert!(outcome.result.recommended_shops.is_empty());
    assert!(!last_system_message(&server).await.contains("검색 결과"));
}

#[tokio::test]
async fn e2e_model_outage_records_only_the_user_turn() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": {"message": "upstream overloaded"}
        })))
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config.knowledge.backend = "none".into();
    let orchestrator = cleaners_gateway::build_orchestrator(&config).await.unwrap();

    let err = orchestrator
        .process_message(ChatRequest::new("hello").with_session("down-1"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ModelUnavailable(GatewayError::ApiError { status_code: 500, .. })
    ));

    let history = orchestrator.history(&Caller::Anonymous, "down-1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
}

#[tokio::test]
async fn e2e_config_file_drives_assembly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[model]
provider = "openrouter"
api_key = "sk-or-file"

[session]
max_messages = 4

[recommendation]
premium_fabrics = ["alpaca"]
"#,
    )
    .unwrap();

    let config = AppConfig::load_from(&path).unwrap();
    assert_eq!(config.session.max_messages, 4);
    assert_eq!(config.recommendation.premium_fabrics, vec!["alpaca".to_string()]);

    let orchestrator = cleaners_gateway::build_orchestrator(&config).await.unwrap();
    assert_eq!(orchestrator.gateway().name(), "openrouter");
    assert!(orchestrator.evaluator().should_recommend("Alpaca coat", None));
    assert!(!orchestrator.evaluator().should_recommend("silk scarf", None));
    assert!(orchestrator.conversation_store().is_none());
}

// ── Session memory ───────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_session_window_bounds_prompt_history() {
    let gateway = Arc::new(CountingGateway::new());
    let orchestrator = local_orchestrator(gateway.clone(), Arc::new(InMemorySessionStore::new(4)));

    for i in 1..=5 {
        orchestrator
            .process_message(ChatRequest::new(format!("question {i}")).with_session("win"))
            .await
            .unwrap();
    }

    let history = orchestrator.history(&Caller::Anonymous, "win").await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].content, "question 4");
    assert_eq!(history[3].content, "reply #5");

    // Fifth prompt: window held q3, r3, q4, r4 before q5 evicted q3.
    let last = gateway.prompts().pop().unwrap();
    assert_eq!(last.user_message, "question 5");
    assert_eq!(last.prior_turns.len(), 3);
    assert_eq!(last.prior_turns[0].content, "reply #3");
    assert!(last.prior_turns.iter().all(|m| m.content != "question 5"));
}

#[tokio::test]
async fn e2e_sessions_are_isolated_and_clearable() {
    let gateway = Arc::new(CountingGateway::new());
    let orchestrator = local_orchestrator(gateway.clone(), Arc::new(InMemorySessionStore::default()));

    orchestrator
        .process_message(ChatRequest::new("a").with_session("s-a"))
        .await
        .unwrap();
    orchestrator
        .process_message(ChatRequest::new("b").with_session("s-b"))
        .await
        .unwrap();

    assert!(gateway.prompts()[1].prior_turns.is_empty());

    let anon = Caller::Anonymous;
    orchestrator.clear_session(&anon, "s-a").await.unwrap();
    orchestrator.clear_session(&anon, "s-a").await.unwrap();
    assert!(orchestrator.history(&anon, "s-a").await.unwrap().is_empty());
    assert_eq!(orchestrator.history(&anon, "s-b").await.unwrap().len(), 2);
}

// ── Durable storage ──────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_sqlite_history_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("conversations.db");
    let db = db.to_string_lossy().to_string();

    {
        let store: Arc<dyn ConversationStore> = Arc::new(SqliteConversationStore::new(&db).await.unwrap());
        let orchestrator = local_orchestrator(
            Arc::new(CountingGateway::new()),
            Arc::new(InMemorySessionStore::default()),
        )
        .with_conversation_store(Some(store));

        for text in ["울 코트 보풀", "드라이 맡길까요?"] {
            let outcome = orchestrator
                .process_message(
                    ChatRequest::new(text)
                        .with_session("persist-1")
                        .with_caller(Caller::user("kim")),
                )
                .await
                .unwrap();
            assert_eq!(outcome.conversation_id.as_deref(), Some("persist-1"));
        }
    }

    let reopened = SqliteConversationStore::new(&db).await.unwrap();
    let conversations = reopened.list_by_user(&Caller::user("kim")).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].title, "New Chat");

    let messages = reopened.messages("persist-1").await.unwrap();
    let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["울 코트 보풀", "reply #1", "드라이 맡길까요?", "reply #2"]);
    assert!(reopened.list_by_user(&Caller::Anonymous).await.unwrap().is_empty());
}

// ── HTTP API ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_http_chat_then_history() {
    let orchestrator = Arc::new(local_orchestrator(
        Arc::new(CountingGateway::new()),
        Arc::new(InMemorySessionStore::default()),
    ));
    let config = AppConfig::default();
    let knowledge = Arc::new(cleaners_gateway::build_knowledge_base(&config).await.unwrap());
    let app = build_router(AppState::new(orchestrator, knowledge, config.gateway));

    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({"message": "캐시미어 니트 세탁", "location": "04524"}).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let chat: ChatResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(chat.message, "reply #1");
    assert_eq!(chat.recommended_shops.len(), 2);
    assert!(chat.conversation_id.is_none());

    let request = Request::builder()
        .uri(format!("/api/chat/sessions/{}", chat.session_id))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let history: SessionHistoryResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(history.messages.len(), 2);
    assert_eq!(history.messages[0].role, Role::User);
    assert_eq!(history.messages[1].content, "reply #1");
}

#[tokio::test]
async fn e2e_http_knowledge_is_indexed_and_searchable() {
    let server = MockServer::start().await;
    mount_embeddings(&server).await;
    Mock::given(method("POST"))
        .and(path("/vectors/upsert"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"upsertedCount": 1})))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config_for(&server);
    config
        .gateway
        .api_tokens
        .insert("tok-admin".into(), "admin".into());
    let orchestrator = Arc::new(cleaners_gateway::build_orchestrator(&config).await.unwrap());
    let knowledge = Arc::new(cleaners_gateway::build_knowledge_base(&config).await.unwrap());
    let app = build_router(AppState::new(orchestrator, knowledge, config.gateway.clone()));

    let request = Request::builder()
        .method("POST")
        .uri("/api/knowledge")
        .header("content-type", "application/json")
        .header("authorization", "Bearer tok-admin")
        .body(Body::from(
            json!({
                "title": "울 코트 보풀",
                "content": "보풀 제거기로 한 방향으로 밀어 주세요.",
                "category": "fabric_understanding"
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let created: KnowledgeCreatedResponse = serde_json::from_slice(&bytes).unwrap();

    // The index now answers with the vector that was just upserted.
    let upserts: Vec<_> = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/vectors/upsert")
        .collect();
    let upsert: serde_json::Value = serde_json::from_slice(&upserts[0].body).unwrap();
    assert_eq!(upsert["vectors"][0]["id"], created.id.as_str());
    assert_eq!(upsert["vectors"][0]["metadata"]["category"], "fabric_understanding");

    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"matches": [
            {"id": created.id.clone(), "score": 0.88}
        ]})))
        .mount(&server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/knowledge/search")
        .header("content-type", "application/json")
        .body(Body::from(json!({"query": "코트 보풀", "top_k": 3}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let found: KnowledgeSearchResponse = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(found.count, 1);
    assert_eq!(found.results[0].title, "울 코트 보풀");
    assert_eq!(found.results[0].created_by.as_deref(), Some("admin"));
}

#[tokio::test]
async fn e2e_stalled_model_times_out() {
    struct Stalled;

    #[async_trait::async_trait]
    impl ModelGateway for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<Completion, GatewayError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(GatewayError::Transport("unreachable".into()))
        }
    }

    let orchestrator = local_orchestrator(Arc::new(Stalled), Arc::new(InMemorySessionStore::default()))
        .with_timeouts(Duration::from_millis(50), Duration::from_millis(50));

    let err = orchestrator
        .process_message(ChatRequest::new("hello"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ModelUnavailable(GatewayError::Timeout(_))));
}
