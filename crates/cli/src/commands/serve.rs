//! `cleaners serve` — Start the HTTP API server.

use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err(super::chat::MISSING_KEY_HINT.into());
    }

    println!("🧺 Cleaners Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {} via {}", config.model.model, config.model.provider);
    println!("   Auth:      {}", if config.gateway.require_auth { "required" } else { "optional" });

    cleaners_gateway::start(config).await?;

    Ok(())
}
