//! Builds the configured model gateway and embedder.

use std::sync::Arc;
use std::time::Duration;

use cleaners_config::{AppConfig, EmbeddingConfig};
use cleaners_core::error::GatewayError;
use cleaners_core::gateway::ModelGateway;
use tracing::info;

use crate::openai_compat::{ModelSettings, OpenAiCompatGateway, OPENAI_BASE_URL, OPENROUTER_BASE_URL};

/// Default base URL for a provider name.
pub fn default_base_url(provider: &str) -> Option<&'static str> {
    match provider {
        "openrouter" => Some(OPENROUTER_BASE_URL),
        "openai" => Some(OPENAI_BASE_URL),
        _ => None,
    }
}

/// Build the completion gateway from configuration.
pub fn build_gateway(config: &AppConfig) -> Result<Arc<dyn ModelGateway>, GatewayError> {
    let model = &config.model;

    let api_key = model.api_key.clone().ok_or_else(|| {
        GatewayError::NotConfigured(format!(
            "no API key for provider '{}' (set model.api_key or OPENROUTER_API_KEY)",
            model.provider
        ))
    })?;

    let base_url = model
        .api_url
        .clone()
        .or_else(|| default_base_url(&model.provider).map(String::from))
        .ok_or_else(|| {
            GatewayError::NotConfigured(format!("no base URL for provider '{}'", model.provider))
        })?;

    let mut gateway = OpenAiCompatGateway::new(
        model.provider.clone(),
        base_url,
        api_key,
        Duration::from_secs(model.timeout_secs),
    )
    .with_settings(ModelSettings {
        model: model.model.clone(),
        temperature: model.temperature,
        max_tokens: Some(model.max_tokens),
    });

    if model.provider == "openrouter" {
        if let Some(referer) = &model.referer {
            gateway = gateway.with_header("HTTP-Referer", referer.clone());
        }
        gateway = gateway.with_header("X-Title", model.app_title.clone());
    }

    info!(provider = %model.provider, model = %model.model, "Model gateway ready");
    Ok(Arc::new(gateway))
}

/// Build the embeddings client used by vector search.
pub fn build_embedder(
    config: &EmbeddingConfig,
    timeout: Duration,
) -> Result<OpenAiCompatGateway, GatewayError> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        GatewayError::NotConfigured(
            "no embeddings API key (set knowledge.embedding.api_key or OPENAI_API_KEY)".into(),
        )
    })?;

    Ok(
        OpenAiCompatGateway::new("embeddings", config.api_url.clone(), api_key, timeout)
            .with_embedding_model(config.model.clone()),
    )
}
