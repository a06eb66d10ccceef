//! Configuration loading, validation, and management for codeloop.
//!
//! Loads configuration from `~/.codeloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.codeloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Long-term store and short-term window settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Code execution settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Cache and re-embedding settings
    #[serde(default)]
    pub feedback: FeedbackConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_model() -> String {
    "llama3.1:8b-instruct-fp16".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("memory", &self.memory)
            .field("executor", &self.executor)
            .field("feedback", &self.feedback)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Directory holding the persisted similarity store
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Number of recent queries kept in the short-term window
    #[serde(default = "default_short_term_capacity")]
    pub short_term_capacity: usize,

    /// Neighbours retrieved per query
    #[serde(default = "default_search_k")]
    pub search_k: usize,

    /// "ollama", "openai", any configured provider name, or "hash"
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Output dimension of the offline "hash" embedder
    #[serde(default = "default_hash_dimension")]
    pub hash_dimension: usize,
}

fn default_store_dir() -> PathBuf {
    PathBuf::from("vectorstore")
}
fn default_short_term_capacity() -> usize {
    5
}
fn default_search_k() -> usize {
    4
}
fn default_embedding_provider() -> String {
    "ollama".into()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}
fn default_hash_dimension() -> usize {
    256
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            short_term_capacity: default_short_term_capacity(),
            search_k: default_search_k(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
            hash_dimension: default_hash_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Interpreter binary the generated code is handed to
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra arguments placed before the script path
    #[serde(default)]
    pub args: Vec<String>,

    /// Wall-clock ceiling per code block
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fence tags recognized as executable code
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Line-comment marker used for error annotations
    #[serde(default = "default_comment_prefix")]
    pub comment_prefix: String,
}

fn default_interpreter() -> String {
    "python3".into()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_languages() -> Vec<String> {
    vec!["python".into(), "py".into(), "python3".into()]
}
fn default_comment_prefix() -> String {
    "#".into()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: vec![],
            timeout_secs: default_timeout_secs(),
            languages: default_languages(),
            comment_prefix: default_comment_prefix(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Directory receiving one file per executed code block
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// File extension for cache files (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Characters per re-embedded slice
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}
fn default_extension() -> String {
    "py".into()
}
fn default_chunk_size() -> usize {
    512
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            extension: default_extension(),
            chunk_size: default_chunk_size(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.codeloop/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `CODELOOP_API_KEY` (highest priority)
    /// - `OPENAI_API_KEY`
    /// - `OPENROUTER_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        // Environment variable overrides (highest priority)
        if config.api_key.is_none() {
            config.api_key = std::env::var("CODELOOP_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENROUTER_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("CODELOOP_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("CODELOOP_MODEL") {
            config.default_model = model;
        }

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

    /// Get the configuration directory path (`$CODELOOP_HOME` or `~/.codeloop`).
    pub fn config_dir() -> PathBuf {
        std::env::var("CODELOOP_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| dirs_home().join(".codeloop"))
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.memory.short_term_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "memory.short_term_capacity must be > 0".into(),
            ));
        }

        if self.memory.search_k == 0 {
            return Err(ConfigError::ValidationError(
                "memory.search_k must be > 0".into(),
            ));
        }

        if self.memory.embedding_provider == "hash" && self.memory.hash_dimension == 0 {
            return Err(ConfigError::ValidationError(
                "memory.hash_dimension must be > 0".into(),
            ));
        }

        if self.executor.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "executor.timeout_secs must be > 0".into(),
            ));
        }

        if self.executor.languages.iter().all(|l| l.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "executor.languages must name at least one fence tag".into(),
            ));
        }

        if self.feedback.chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "feedback.chunk_size must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            memory: MemoryConfig::default(),
            executor: ExecutorConfig::default(),
            feedback: FeedbackConfig::default(),
            providers: HashMap::new(),
        }
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
