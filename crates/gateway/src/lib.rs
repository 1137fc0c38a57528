//! HTTP API gateway for Cleaners.
//!
//! Exposes a health check and the `/api` surface on top of a shared
//! [`MessageOrchestrator`] and [`KnowledgeBase`].
//!
//! Layers applied to every route:
//! - Request body size limit (1 MB)
//! - Request timeout (`gateway.request_timeout_secs`, answered with 408)
//! - CORS (when `gateway.enable_cors`)
//! - HTTP trace logging
//!
//! `/api` routes additionally resolve the [`Caller`] from the bearer token.

pub mod api;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::{Json, Response},
    routing::get,
};
use cleaners_agent::MessageOrchestrator;
use cleaners_config::{AppConfig, GatewayConfig};
use cleaners_core::caller::Caller;
use cleaners_knowledge::KnowledgeBase;
use cleaners_memory::InMemorySessionStore;
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

pub use api::{
    ApiError, ChatResponse, ErrorResponse, KnowledgeCreatedResponse, KnowledgeListResponse,
    KnowledgeSearchResponse, SessionHistoryResponse,
};

const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct AppState {
    pub orchestrator: Arc<MessageOrchestrator>,
    pub knowledge: Arc<KnowledgeBase>,
    pub config: GatewayConfig,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        orchestrator: Arc<MessageOrchestrator>,
        knowledge: Arc<KnowledgeBase>,
        config: GatewayConfig,
    ) -> SharedState {
        Arc::new(Self {
            orchestrator,
            knowledge,
            config,
        })
    }
}

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let api = api::api_router(state.clone())
        .layer(middleware::from_fn_with_state(state.clone(), caller_middleware));

    let router = Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(state.config.request_timeout_secs),
        ));

    let router = if state.config.enable_cors {
        router.layer(cors_layer(&state.config.cors_origins))
    } else {
        router
    };

    router.layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600));

    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

/// Assemble the orchestrator and its collaborators from configuration.
pub async fn build_orchestrator(
    config: &AppConfig,
) -> Result<MessageOrchestrator, Box<dyn std::error::Error + Send + Sync>> {
    let gateway = cleaners_providers::build_gateway(config)?;
    let retriever = cleaners_knowledge::build_retriever(config)?;
    let shops = cleaners_knowledge::build_shop_directory(config)?;
    let sessions = Arc::new(InMemorySessionStore::new(config.session.max_messages));
    let conversations = cleaners_memory::open_conversation_store(&config.storage).await?;

    info!(
        gateway = gateway.name(),
        model = %config.model.model,
        retriever = retriever.name(),
        shops = shops.name(),
        storage = conversations.as_ref().map(|s| s.name()).unwrap_or("none"),
        "Orchestrator assembled"
    );

    Ok(MessageOrchestrator::new(sessions, retriever, gateway, shops)
        .configured(config)
        .with_conversation_store(conversations))
}

/// Open the knowledge catalogue and attach the vector index when configured.
pub async fn build_knowledge_base(
    config: &AppConfig,
) -> Result<KnowledgeBase, Box<dyn std::error::Error + Send + Sync>> {
    let repository = cleaners_memory::open_knowledge_repository(&config.storage).await?;
    let knowledge = cleaners_knowledge::build_knowledge_base(config, repository)?;
    info!(
        catalogue = knowledge.repository_name(),
        indexed = knowledge.is_indexed(),
        "Knowledge base assembled"
    );
    Ok(knowledge)
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let knowledge = Arc::new(build_knowledge_base(&config).await?);
    let state = AppState::new(orchestrator, knowledge, config.gateway.clone());

    if state.config.require_auth && state.config.api_tokens.is_empty() {
        warn!("gateway.require_auth is set but no api_tokens are configured; every /api request will be rejected");
    }

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Resolve the caller from `Authorization: Bearer <token>`.
///
/// A known token maps to its user; an unknown token is rejected; no header
/// means an anonymous caller unless `require_auth` is set.
async fn caller_middleware(
    State(state): State<SharedState>,
    mut req: axum::extract::Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    let caller = match token {
        Some(token) => match state.config.api_tokens.get(token) {
            Some(user_id) => Caller::user(user_id.clone()),
            None => {
                warn!("Unauthorized request to /api: unknown bearer token");
                return Err(ApiError::unauthorized());
            }
        },
        None if state.config.require_auth => {
            warn!("Unauthorized request to /api: missing bearer token");
            return Err(ApiError::unauthorized());
        }
        None => Caller::Anonymous,
    };

    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}
