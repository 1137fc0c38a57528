//! `cleaners doctor` — Diagnose configuration and model reachability.

use std::path::Path;

use cleaners_config::AppConfig;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    println!("🩺 Cleaners Doctor — System Diagnostics");
    println!("=======================================\n");

    let mut issues = 0;
    let path = super::config_path(config_path);

    if path.exists() {
        println!("  ✅ Config file found: {}", path.display());
    } else {
        println!("  ⚠️  No config file at {} (defaults in use; run `cleaners init`)", path.display());
    }

    let config = match AppConfig::load_with_env(&path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. See above for details.");
            return Ok(());
        }
    };

    println!("     Model:       {} via {}", config.model.model, config.model.provider);
    println!("     Knowledge:   {}", config.knowledge.backend);
    println!("     Shops:       {}", config.recommendation.directory);
    println!("     Storage:     {}", config.storage.backend);
    println!("     Session cap: {} messages", config.session.max_messages);

    if config.has_api_key() {
        println!("  ✅ Model API key configured");
        match cleaners_providers::build_gateway(&config) {
            Ok(gateway) => match gateway.health_check().await {
                Ok(true) => println!("  ✅ Model gateway reachable ({})", gateway.name()),
                Ok(false) => {
                    println!("  ⚠️  Model gateway answered but reported unhealthy");
                    issues += 1;
                }
                Err(e) => {
                    println!("  ❌ Model gateway check failed: {e}");
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ Model gateway misconfigured: {e}");
                issues += 1;
            }
        }
    } else {
        println!("  ❌ No model API key — set OPENROUTER_API_KEY or model.api_key");
        issues += 1;
    }

    if config.knowledge.backend == "pinecone" {
        match cleaners_knowledge::build_retriever(&config) {
            Ok(_) => println!("  ✅ Knowledge retriever configured"),
            Err(e) => {
                println!("  ❌ Knowledge retriever misconfigured: {e}");
                issues += 1;
            }
        }
    }

    if let Err(e) = cleaners_memory::open_conversation_store(&config.storage).await {
        println!("  ❌ Conversation storage unavailable: {e}");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
