//! `cleaners init` — Write a default config file.

use std::path::Path;

use cleaners_config::AppConfig;

pub async fn run(
    config_path: Option<&Path>,
    force: bool,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let path = super::config_path(config_path);

    println!("🧺 Cleaners — Setup");
    println!("===================\n");

    if path.exists() && !force {
        println!("⚠️  Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.\n");
        return Ok(());
    }

    write_default(&path)?;
    println!("✅ Created config at: {}", path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set OPENROUTER_API_KEY or add model.api_key to the file");
    println!("   2. Optionally set PINECONE_API_KEY and knowledge.index_host for retrieval");
    println!("   3. Run: cleaners chat\n");

    Ok(())
}

fn write_default(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, AppConfig::default_toml())
}
