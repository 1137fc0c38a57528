pub mod chat;
pub mod doctor;
pub mod init;
pub mod serve;

use std::path::{Path, PathBuf};

use cleaners_config::AppConfig;

/// The config file to use: `--config` if given, else the default location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, String> {
    AppConfig::load_with_env(&config_path(explicit)).map_err(|e| format!("Failed to load config: {e}"))
}
