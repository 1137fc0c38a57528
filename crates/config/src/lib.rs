//! Configuration loading, validation, and management for Cleaners.
//!
//! Loads configuration from `~/.cleaners/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use cleaners_core::PartnerShop;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.cleaners/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Hosted completion model
    #[serde(default)]
    pub model: ModelConfig,

    /// Persona and prompt assembly
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Short-term session memory
    #[serde(default)]
    pub session: SessionConfig,

    /// Knowledge retrieval (vector search)
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Shop recommendation policy and directory
    #[serde(default)]
    pub recommendation: RecommendationConfig,

    /// Durable conversation storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// --- model ---

#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "openrouter", "openai", or "custom" (requires `api_url`)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the provider's default base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Sent as `HTTP-Referer` to OpenRouter
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,

    /// Sent as `X-Title` to OpenRouter
    #[serde(default = "default_app_title")]
    pub app_title: String,
}

fn default_provider() -> String {
    "openrouter".into()
}
fn default_model() -> String {
    "openai/gpt-4.1".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_model_timeout() -> u64 {
    60
}
fn default_app_title() -> String {
    "Cleaners".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_model_timeout(),
            referer: None,
            app_title: default_app_title(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("referer", &self.referer)
            .field("app_title", &self.app_title)
            .finish()
    }
}

// --- assistant ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Replaces the built-in laundry-master persona
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Inserted between the persona and retrieved context
    #[serde(default = "default_context_heading")]
    pub context_heading: String,
}

fn default_context_heading() -> String {
    "\n\n## 관련 세탁 지식 (검색 결과):\n".into()
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            context_heading: default_context_heading(),
        }
    }
}

// --- session ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Messages kept per session; older ones are evicted first
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    10
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
        }
    }
}

// --- knowledge ---

#[derive(Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// "none" or "pinecone"
    #[serde(default = "default_knowledge_backend")]
    pub backend: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Pinecone index host, e.g. `https://laundry-xxxx.svc.pinecone.io`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Exact-match metadata filter applied to every query
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub filter: HashMap<String, String>,

    #[serde(default = "default_retrieval_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

fn default_knowledge_backend() -> String {
    "none".into()
}
fn default_top_k() -> usize {
    3
}
fn default_retrieval_timeout() -> u64 {
    30
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            backend: default_knowledge_backend(),
            api_key: None,
            index_host: None,
            namespace: None,
            top_k: default_top_k(),
            filter: HashMap::new(),
            timeout_secs: default_retrieval_timeout(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl std::fmt::Debug for KnowledgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeConfig")
            .field("backend", &self.backend)
            .field("api_key", &redact(&self.api_key))
            .field("index_host", &self.index_host)
            .field("namespace", &self.namespace)
            .field("top_k", &self.top_k)
            .field("filter", &self.filter)
            .field("timeout_secs", &self.timeout_secs)
            .field("embedding", &self.embedding)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_url")]
    pub api_url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_url: default_embedding_url(),
            api_key: None,
            model: default_embedding_model(),
        }
    }
}

impl std::fmt::Debug for EmbeddingConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .finish()
    }
}

// --- recommendation ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationConfig {
    /// A reported success rate strictly between 0 and this value triggers
    /// a recommendation
    #[serde(default = "default_success_rate_threshold")]
    pub success_rate_threshold: i32,

    #[serde(default = "default_premium_fabrics")]
    pub premium_fabrics: Vec<String>,

    #[serde(default = "default_stale_stain_phrases")]
    pub stale_stain_phrases: Vec<String>,

    #[serde(default = "default_professional_phrases")]
    pub professional_phrases: Vec<String>,

    /// "static" or "pinecone"
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Partner index host for the "pinecone" directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_index_host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partner_namespace: Option<String>,

    #[serde(default = "default_max_shops")]
    pub max_shops: usize,

    /// Shops served by the "static" directory. Empty means the demo list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shops: Vec<PartnerShop>,
}

fn default_success_rate_threshold() -> i32 {
    60
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_premium_fabrics() -> Vec<String> {
    strings(&[
        "실크", "silk", "캐시미어", "cashmere", "가죽", "leather", "울", "wool", "린넨", "linen",
        "벨벳", "velvet", "스웨이드", "suede", "모피", "fur",
    ])
}

fn default_stale_stain_phrases() -> Vec<String> {
    strings(&[
        "며칠",
        "일주일",
        "몇일",
        "오래",
        "48시간",
        "2일",
        "3일",
        "이틀",
        "사흘",
        "나흘",
        "a few days",
        "a week",
        "48 hours",
        "2 days",
        "3 days",
    ])
}

fn default_professional_phrases() -> Vec<String> {
    strings(&[
        "맡기",
        "세탁소",
        "전문",
        "드라이클리닝",
        "드라이 클리닝",
        "맡길까",
        "맡기면",
        "클리닝",
        "업체",
        "dry cleaning",
        "dry cleaner",
        "professional",
        "drop off",
    ])
}

fn default_directory() -> String {
    "static".into()
}
fn default_max_shops() -> usize {
    3
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            success_rate_threshold: default_success_rate_threshold(),
            premium_fabrics: default_premium_fabrics(),
            stale_stain_phrases: default_stale_stain_phrases(),
            professional_phrases: default_professional_phrases(),
            directory: default_directory(),
            partner_index_host: None,
            partner_namespace: None,
            max_shops: default_max_shops(),
            shops: Vec::new(),
        }
    }
}

// --- storage ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "none", "memory", or "sqlite"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite database file; defaults to `~/.cleaners/conversations.db`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "none".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl StorageConfig {
    pub fn sqlite_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| AppConfig::config_dir().join("conversations.db"))
    }
}

// --- gateway ---

#[derive(Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Reject requests without a known bearer token
    #[serde(default)]
    pub require_auth: bool,

    /// Bearer token → user id
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub api_tokens: HashMap<String, String>,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Allowed CORS origins; empty allows any
    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_max_message_chars() -> usize {
    1000
}
fn default_request_timeout() -> u64 {
    90
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            require_auth: false,
            api_tokens: HashMap::new(),
            max_message_chars: default_max_message_chars(),
            request_timeout_secs: default_request_timeout(),
            cors_origins: Vec::new(),
            enable_cors: true,
        }
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("port", &self.port)
            .field("host", &self.host)
            .field("require_auth", &self.require_auth)
            .field("api_tokens", &format!("[{} REDACTED]", self.api_tokens.len()))
            .field("max_message_chars", &self.max_message_chars)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("cors_origins", &self.cors_origins)
            .field("enable_cors", &self.enable_cors)
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.cleaners/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `CLEANERS_API_KEY`, then `OPENROUTER_API_KEY` (model key, if unset)
    /// - `CLEANERS_MODEL` or `OPENROUTER_MODEL`
    /// - `PINECONE_API_KEY`, `OPENAI_API_KEY` (embeddings)
    /// - `DATABASE_URL` (enables sqlite storage at that path)
    /// - `CLEANERS_PORT`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.model.api_key.is_none() {
            self.model.api_key = var("CLEANERS_API_KEY").or_else(|| var("OPENROUTER_API_KEY"));
        }
        if let Some(model) = var("CLEANERS_MODEL").or_else(|| var("OPENROUTER_MODEL")) {
            self.model.model = model;
        }
        if self.knowledge.api_key.is_none() {
            self.knowledge.api_key = var("PINECONE_API_KEY");
        }
        if self.knowledge.embedding.api_key.is_none() {
            self.knowledge.embedding.api_key = var("OPENAI_API_KEY");
        }
        if let Some(url) = var("DATABASE_URL") {
            let path = url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:")
                .to_string();
            self.storage.backend = "sqlite".into();
            self.storage.path = Some(PathBuf::from(path));
        }
        if let Some(port) = var("CLEANERS_PORT") {
            self.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CLEANERS_PORT is not a port: {port}"))
            })?;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".cleaners")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !matches!(self.model.provider.as_str(), "openrouter" | "openai" | "custom") {
            return Err(ConfigError::ValidationError(format!(
                "unknown model.provider '{}'",
                self.model.provider
            )));
        }

        if self.model.provider == "custom" && self.model.api_url.is_none() {
            return Err(ConfigError::ValidationError(
                "model.api_url is required for the custom provider".into(),
            ));
        }

        if self.session.max_messages == 0 {
            return Err(ConfigError::ValidationError(
                "session.max_messages must be at least 1".into(),
            ));
        }

        if !matches!(self.knowledge.backend.as_str(), "none" | "pinecone") {
            return Err(ConfigError::ValidationError(format!(
                "unknown knowledge.backend '{}'",
                self.knowledge.backend
            )));
        }

        if self.recommendation.success_rate_threshold <= 0 {
            return Err(ConfigError::ValidationError(
                "recommendation.success_rate_threshold must be > 0".into(),
            ));
        }

        if !matches!(self.recommendation.directory.as_str(), "static" | "pinecone") {
            return Err(ConfigError::ValidationError(format!(
                "unknown recommendation.directory '{}'",
                self.recommendation.directory
            )));
        }

        if !matches!(self.storage.backend.as_str(), "none" | "memory" | "sqlite") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage.backend '{}'",
                self.storage.backend
            )));
        }

        if self.gateway.max_message_chars == 0 {
            return Err(ConfigError::ValidationError(
                "gateway.max_message_chars must be at least 1".into(),
            ));
        }

        // A zero timeout fails every call immediately.
        for (name, secs) in [
            ("model.timeout_secs", self.model.timeout_secs),
            ("knowledge.timeout_secs", self.knowledge.timeout_secs),
            ("gateway.request_timeout_secs", self.gateway.request_timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::ValidationError(format!("{name} must be at least 1")));
            }
        }

        Ok(())
    }

    /// Check if a model API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
