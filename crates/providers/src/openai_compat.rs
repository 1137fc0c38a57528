//! OpenAI-compatible model gateway.
//!
//! Works with OpenRouter, OpenAI, and any endpoint exposing
//! `/chat/completions` and `/embeddings` in the OpenAI format.
//!
//! One request per call: no retries, no streaming. The HTTP client carries
//! a hard timeout so a stalled provider cannot hold a request forever.

use std::time::Duration;

use async_trait::async_trait;
use cleaners_core::error::{GatewayError, RetrievalError};
use cleaners_core::gateway::{Completion, ModelGateway, Prompt, Usage};
use cleaners_core::knowledge::Embedder;
use cleaners_core::message::SessionMessage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Sampling parameters sent with every completion.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "openai/gpt-4.1".into(),
            temperature: 0.7,
            max_tokens: Some(1500),
        }
    }
}

/// A gateway speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatGateway {
    name: String,
    base_url: String,
    api_key: String,
    settings: ModelSettings,
    embedding_model: String,
    extra_headers: Vec<(String, String)>,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            settings: ModelSettings::default(),
            embedding_model: "text-embedding-3-small".into(),
            extra_headers: Vec::new(),
            client,
        }
    }

    /// OpenRouter gateway (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::new("openrouter", OPENROUTER_BASE_URL, api_key, timeout)
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    /// Add a header sent with every request (e.g., OpenRouter's `X-Title`).
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// System prompt, then prior turns, then the current user message.
    fn to_api_messages(prompt: &Prompt) -> Vec<ApiMessage> {
        let mut messages = Vec::with_capacity(prompt.prior_turns.len() + 2);
        messages.push(ApiMessage {
            role: "system".into(),
            content: prompt.system.clone(),
        });
        messages.extend(prompt.prior_turns.iter().map(|m: &SessionMessage| ApiMessage {
            role: m.role.as_str().into(),
            content: m.content.clone(),
        }));
        messages.push(ApiMessage {
            role: "user".into(),
            content: prompt.user_message.clone(),
        });
        messages
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    /// Map a non-200 response to a gateway error.
    async fn error_from_response(response: reqwest::Response) -> GatewayError {
        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return GatewayError::RateLimited { retry_after_secs };
        }

        if status == 401 || status == 403 {
            return GatewayError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            );
        }

        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Provider returned error");
        GatewayError::ApiError {
            status_code: status,
            message: provider_error_message(&body),
        }
    }
}

fn send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

/// Prefer the provider's `error.message` over the raw body.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": self.settings.model,
            "messages": Self::to_api_messages(prompt),
            "temperature": self.settings.temperature,
        });

        if let Some(max_tokens) = self.settings.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(
            provider = %self.name,
            model = %self.settings.model,
            prior_turns = prompt.prior_turns.len(),
            "Sending completion request"
        );

        let response = self.post(&url).json(&body).send().await.map_err(send_error)?;

        if response.status().as_u16() != 200 {
            return Err(Self::error_from_response(response).await);
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        parse_completion(api_response)
    }

    async fn health_check(&self) -> Result<bool, GatewayError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(send_error)?;

        Ok(response.status().is_success())
    }
}

fn parse_completion(api_response: ApiResponse) -> Result<Completion, GatewayError> {
    let choice = api_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| GatewayError::InvalidResponse("No choices in response".into()))?;

    let usage = api_response.usage.map(|u| Usage {
        prompt_tokens: u.prompt_tokens,
        completion_tokens: u.completion_tokens,
        total_tokens: u.total_tokens,
    });

    Ok(Completion {
        content: choice.message.content.unwrap_or_default(),
        model: api_response.model,
        usage,
    })
}

#[async_trait]
impl Embedder for OpenAiCompatGateway {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        let url = format!("{}/embeddings", self.base_url);

        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
            "encoding_format": "float",
        });

        debug!(provider = %self.name, model = %self.embedding_model, "Sending embedding request");

        let response = self
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        if response.status().as_u16() != 200 {
            let err = Self::error_from_response(response).await;
            return Err(RetrievalError::EmbeddingFailed(err.to_string()));
        }

        let api_resp: EmbeddingApiResponse = response.json().await.map_err(|e| {
            RetrievalError::EmbeddingFailed(format!("Failed to parse embedding response: {e}"))
        })?;

        api_resp
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| RetrievalError::EmbeddingFailed("No embedding in response".into()))
    }
}

// --- OpenAI wire format ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}
