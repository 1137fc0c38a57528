//! Model gateway trait — the abstraction over hosted completion providers.
//!
//! A gateway receives one fully assembled [`Prompt`] and returns a single
//! completion. It performs no retries; timeouts are imposed by the
//! implementation's HTTP client and by the caller.
//!
//! Implementations: OpenAI-compatible endpoints (OpenRouter, OpenAI).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;
use crate::message::SessionMessage;

/// Everything the model sees for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    /// Persona instructions, with retrieved context appended when present.
    pub system: String,

    /// Earlier turns of the session, oldest first.
    pub prior_turns: Vec<SessionMessage>,

    /// The message being answered.
    pub user_message: String,
}

/// A completed model reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,

    /// Which model actually responded (may differ from requested).
    pub model: String,

    pub usage: Option<Usage>,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Human-readable provider name (e.g., "openrouter").
    fn name(&self) -> &str;

    /// Send the prompt and wait for a single completion.
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, GatewayError>;

    /// Check that the provider is reachable.
    async fn health_check(&self) -> Result<bool, GatewayError> {
        Ok(true)
    }
}
