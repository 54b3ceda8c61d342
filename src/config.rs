//! TOML configuration.
//!
//! ```toml
//! [github]
//! token_env = "GITHUB_TOKEN"
//!
//! [llm]
//! provider = "anthropic"
//! model = "claude-sonnet-4-20250514"
//!
//! [cache]
//! backend = "sqlite"
//! path = "./data/scout.sqlite"
//!
//! [server]
//! bind = "127.0.0.1:7340"
//! ```
//!
//! Credentials never live in the file; only the names of the environment
//! variables holding them do.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ScoutError;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GithubConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl GithubConfig {
    /// Reads the bearer credential from the configured environment variable.
    pub fn token(&self) -> std::result::Result<String, ScoutError> {
        match std::env::var(&self.token_env) {
            Ok(token) if !token.trim().is_empty() => Ok(token),
            _ => Err(ScoutError::MissingCredential(self.token_env.clone())),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("repo-scout/", env!("CARGO_PKG_VERSION")).to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Endpoint override, e.g. a local OpenAI-compatible gateway.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_answer_max_tokens")]
    pub answer_max_tokens: u32,
    #[serde(default = "default_routing_max_tokens")]
    pub routing_max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            api_key_env: None,
            answer_max_tokens: default_answer_max_tokens(),
            routing_max_tokens: default_routing_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    /// Environment variable holding the API key, defaulting per provider.
    pub fn key_env(&self) -> String {
        match &self.api_key_env {
            Some(name) => name.clone(),
            None if self.provider == "anthropic" => "ANTHROPIC_API_KEY".to_string(),
            None => "OPENAI_API_KEY".to_string(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_answer_max_tokens() -> u32 {
    2048
}
fn default_routing_max_tokens() -> u32 {
    512
}
fn default_llm_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Upper bound on `cache.ttl_secs`: one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

fn default_backend() -> String {
    "memory".to_string()
}
fn default_ttl_secs() -> u64 {
    1800
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7340".to_string()
}

impl Config {
    /// All-defaults configuration used when no file is present.
    pub fn minimal() -> Self {
        Self::default()
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.llm.provider.as_str() {
        "disabled" | "openai" | "anthropic" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be disabled, openai, or anthropic.",
            other
        ),
    }

    if config.llm.is_enabled() && config.llm.model.is_none() {
        anyhow::bail!(
            "llm.model must be specified when provider is '{}'",
            config.llm.provider
        );
    }

    if config.llm.answer_max_tokens == 0 || config.llm.routing_max_tokens == 0 {
        anyhow::bail!("llm token ceilings must be > 0");
    }

    match config.cache.backend.as_str() {
        "memory" => {}
        "sqlite" => {
            if config.cache.path.is_none() {
                anyhow::bail!("cache.path must be set when backend is 'sqlite'");
            }
        }
        other => anyhow::bail!(
            "Unknown cache backend: '{}'. Must be memory or sqlite.",
            other
        ),
    }

    if config.cache.ttl_secs == 0 || config.cache.ttl_secs > MAX_TTL_SECS {
        anyhow::bail!(
            "cache.ttl_secs must be between 1 and {} (got {})",
            MAX_TTL_SECS,
            config.cache.ttl_secs
        );
    }

    Ok(())
}
