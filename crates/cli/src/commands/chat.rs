//! `cleaners chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;

use cleaners_agent::{ChatRequest, MessageOrchestrator, RecommendationResult};
use cleaners_core::caller::Caller;
use cleaners_core::message::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

pub const MISSING_KEY_HINT: &str = "No model API key found. Set OPENROUTER_API_KEY (or CLEANERS_API_KEY), \
or add model.api_key to ~/.cleaners/config.toml (see `cleaners init`).";

pub async fn run(
    config_path: Option<&Path>,
    message: Option<String>,
    location: Option<String>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = super::load_config(config_path)?;

    if !config.has_api_key() {
        return Err(MISSING_KEY_HINT.into());
    }

    let orchestrator = cleaners_gateway::build_orchestrator(&config).await?;

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let outcome = orchestrator
            .process_message(request(&msg, None, location.as_deref()))
            .await;
        eprint!("\r              \r");
        println!("{}", render(&outcome?.result));
        return Ok(());
    }

    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║        Cleaners — 세탁 장인 상담 모드         ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Model:     {}", config.model.model);
    println!("  Knowledge: {}", config.knowledge.backend);
    println!("  Location:  {}", location.as_deref().unwrap_or("(none)"));
    println!();
    println!("  Type your question and press Enter.");
    println!("  '/clear' starts a new session, 'exit' or Ctrl+C quits.");
    println!();

    repl(&orchestrator, location.as_deref()).await?;

    println!();
    println!("  Goodbye! 👋");
    println!();
    Ok(())
}

async fn repl(
    orchestrator: &MessageOrchestrator,
    location: Option<&str>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut session = SessionId::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "exit" | "quit" => break,
            "/clear" => {
                orchestrator
                    .clear_session(&Caller::Anonymous, session.as_str())
                    .await?;
                session = SessionId::new();
                println!("  (new session)");
            }
            text => {
                eprint!("  ...");
                let outcome = orchestrator
                    .process_message(request(text, Some(&session), location))
                    .await;
                eprint!("\r     \r");
                match outcome {
                    Ok(outcome) => {
                        println!();
                        for line in render(&outcome.result).lines() {
                            println!("  Master > {line}");
                        }
                        println!();
                    }
                    Err(e) => {
                        eprintln!("  [Error] {e}");
                        println!();
                    }
                }
            }
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn request(message: &str, session: Option<&SessionId>, location: Option<&str>) -> ChatRequest {
    let mut request = ChatRequest::new(message);
    if let Some(session) = session {
        request = request.with_session(session.as_str());
    }
    if let Some(location) = location {
        request = request.with_location(location);
    }
    request
}

/// Reply text followed by any recommended shops.
fn render(result: &RecommendationResult) -> String {
    let mut out = result.message.clone();
    if !result.recommended_shops.is_empty() {
        out.push_str("\n\n추천 세탁소:");
        for shop in &result.recommended_shops {
            out.push_str(&format!("\n- {} (★ {:.1})", shop.name, shop.rating));
            if !shop.specialties.is_empty() {
                out.push_str(&format!(" · {}", shop.specialties.join(", ")));
            }
        }
    }
    out
}
