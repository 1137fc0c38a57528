//! `/api` routes: chat, session memory, stored conversations, and the
//! knowledge base.
//!
//! All handlers receive the resolved [`Caller`] from the caller middleware.
//! Conversation routes and knowledge edits need an identified caller.

use axum::{
    Extension, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post},
};
use cleaners_agent::ChatRequest;
use cleaners_core::caller::Caller;
use cleaners_core::conversation::{Conversation, StoredMessage};
use cleaners_core::error::{Error, KnowledgeError};
use cleaners_core::knowledge::KnowledgeItem;
use cleaners_core::message::SessionMessage;
use cleaners_core::shop::PartnerShop;
use cleaners_knowledge::{DEFAULT_SEARCH_TOP_K, KnowledgeDraft};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::SharedState;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route(
            "/chat/sessions/{id}",
            get(session_history_handler).delete(clear_session_handler),
        )
        .route("/conversations", get(list_conversations_handler))
        .route("/conversations/{id}/messages", get(conversation_messages_handler))
        .route("/knowledge", get(list_knowledge_handler).post(create_knowledge_handler))
        .route("/knowledge/search", post(search_knowledge_handler))
        .route("/knowledge/{id}", delete(delete_knowledge_handler))
        .with_state(state)
}

// ── Errors ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// An error already mapped to a status and a stable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing or invalid bearer token")
    }

    fn not_found(what: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", format!("{what} not found"))
    }

    fn storage_disabled() -> Self {
        Self::new(
            StatusCode::NOT_IMPLEMENTED,
            "STORAGE_DISABLED",
            "Conversation storage is not enabled",
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::EmptyInput => {
                Self::new(StatusCode::BAD_REQUEST, "EMPTY_MESSAGE", "Message must not be empty")
            }
            Error::ModelUnavailable(e) => {
                warn!(error = %e, "Model gateway failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "MODEL_UNAVAILABLE",
                    "The assistant is temporarily unavailable. Please try again.",
                )
            }
            Error::StoreUnavailable(e) => {
                error!(error = %e, "Session store failed");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "Session storage is unavailable",
                )
            }
            Error::SessionNotFound(_) => Self::not_found("Session"),
        }
    }
}

impl From<KnowledgeError> for ApiError {
    fn from(err: KnowledgeError) -> Self {
        match err {
            KnowledgeError::Invalid(message) => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_KNOWLEDGE", message)
            }
            KnowledgeError::Index(e) => {
                warn!(error = %e, "Knowledge index failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "KNOWLEDGE_INDEX_UNAVAILABLE",
                    "The knowledge index is temporarily unavailable",
                )
            }
            KnowledgeError::Store(e) => {
                error!(error = %e, "Knowledge catalogue failed");
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "STORE_UNAVAILABLE",
                    "Knowledge storage is unavailable",
                )
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

// ── Request / Response DTOs ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub message: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub timestamp: String,
    pub recommended_shops: Vec<PartnerShop>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub messages: Vec<SessionMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeListResponse {
    pub items: Vec<KnowledgeItem>,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct KnowledgeSearchBody {
    pub query: String,
    #[serde(default)]
    pub top_k: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeSearchResponse {
    pub results: Vec<KnowledgeItem>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct KnowledgeCreatedResponse {
    pub id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// Durable history and knowledge edits need an identified caller.
fn require_user(caller: &Caller) -> Result<(), ApiError> {
    match caller {
        Caller::User(_) => Ok(()),
        Caller::Anonymous => Err(ApiError::unauthorized()),
    }
}

async fn chat_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatResponse>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(Error::EmptyInput.into());
    }

    let max_chars = state.config.max_message_chars;
    if body.message.chars().count() > max_chars {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "MESSAGE_TOO_LONG",
            format!("Message must be at most {max_chars} characters"),
        ));
    }

    let mut request = ChatRequest::new(body.message).with_caller(caller);
    request.session_id = body.session_id.filter(|s| !s.trim().is_empty());
    request.location = body.location;

    let outcome = state.orchestrator.process_message(request).await?;

    Ok(Json(ChatResponse {
        message: outcome.result.message,
        session_id: outcome.session_id.to_string(),
        conversation_id: outcome.conversation_id,
        timestamp: chrono::Utc::now().to_rfc3339(),
        recommended_shops: outcome.result.recommended_shops,
    }))
}

async fn session_history_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let messages = state.orchestrator.history(&caller, &id).await?;
    Ok(Json(SessionHistoryResponse {
        session_id: id,
        messages,
    }))
}

async fn clear_session_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.clear_session(&caller, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_conversations_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    require_user(&caller)?;
    let store = state
        .orchestrator
        .conversation_store()
        .ok_or_else(ApiError::storage_disabled)?;

    let conversations = store
        .list_by_user(&caller)
        .await
        .map_err(Error::StoreUnavailable)?;

    info!(caller = %caller, count = conversations.len(), "Listed conversations");
    Ok(Json(conversations))
}

async fn conversation_messages_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<Vec<StoredMessage>>, ApiError> {
    require_user(&caller)?;
    let store = state
        .orchestrator
        .conversation_store()
        .ok_or_else(ApiError::storage_disabled)?;

    // Another caller's conversation looks the same as a missing one.
    match store.get(&id).await.map_err(Error::StoreUnavailable)? {
        Some(conversation) if conversation.owner == caller => {}
        _ => return Err(ApiError::not_found("Conversation")),
    }

    let messages = store.messages(&id).await.map_err(Error::StoreUnavailable)?;
    Ok(Json(messages))
}

async fn list_knowledge_handler(
    State(state): State<SharedState>,
) -> Result<Json<KnowledgeListResponse>, ApiError> {
    let items = state.knowledge.list().await?;
    Ok(Json(KnowledgeListResponse {
        count: items.len(),
        items,
    }))
}

async fn create_knowledge_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Json(draft): Json<KnowledgeDraft>,
) -> Result<(StatusCode, Json<KnowledgeCreatedResponse>), ApiError> {
    require_user(&caller)?;
    let item = state.knowledge.create(draft, &caller).await?;
    Ok((
        StatusCode::CREATED,
        Json(KnowledgeCreatedResponse {
            id: item.id,
            message: "Knowledge created successfully".into(),
        }),
    ))
}

async fn search_knowledge_handler(
    State(state): State<SharedState>,
    Json(body): Json<KnowledgeSearchBody>,
) -> Result<Json<KnowledgeSearchResponse>, ApiError> {
    let top_k = body.top_k.unwrap_or(DEFAULT_SEARCH_TOP_K);
    let results = state.knowledge.search(&body.query, top_k).await?;
    Ok(Json(KnowledgeSearchResponse {
        count: results.len(),
        results,
    }))
}

async fn delete_knowledge_handler(
    State(state): State<SharedState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    require_user(&caller)?;
    if !state.knowledge.delete(&id).await? {
        return Err(ApiError::not_found("Knowledge item"));
    }
    info!(caller = %caller, id = %id, "Knowledge item removed");
    Ok(Json(MessageResponse {
        message: "Knowledge deleted successfully".into(),
    }))
}
