//! Configuration management for prompt-relay.
//!
//! Loads settings from `~/.config/prompt-relay/config.toml` with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_FREE_MODEL: &str = "deepseek";

/// Largest chat request body accepted, in bytes (25 MiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Origins always allowed to call the relay cross-origin.
pub const LOCAL_ORIGINS: &[&str] = &["http://localhost:3000", "http://127.0.0.1:3000"];

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request body limit for chat completions, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// Where completion requests are forwarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origin: Option<String>,
    /// Allow every origin (development mode).
    #[serde(default)]
    pub development: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    #[serde(default = "default_free_models")]
    pub free_models: Vec<String>,
    #[serde(default = "default_model")]
    pub default_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_verbosity")]
    pub log_verbosity: LogVerbosity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogVerbosity {
    Minimal,
    #[default]
    Compact,
    Verbose,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 3000 }
fn default_max_body_bytes() -> usize { DEFAULT_MAX_BODY_BYTES }
fn default_free_models() -> Vec<String> { vec![DEFAULT_FREE_MODEL.to_string()] }
fn default_model() -> String { DEFAULT_FREE_MODEL.to_string() }
fn default_verbosity() -> LogVerbosity { LogVerbosity::Compact }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            free_models: default_free_models(),
            default_model: default_model(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_verbosity: default_verbosity(),
        }
    }
}

/// Split a comma-delimited model list, trimming entries and dropping empties.
pub fn parse_model_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

impl UpstreamConfig {
    /// Configured backend URL, treating an empty string as unset.
    pub fn backend_url(&self) -> Option<&str> {
        self.backend_url.as_deref().filter(|url| !url.is_empty())
    }

    /// Configured server-side API key, treating an empty string as unset.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }
}

impl CorsConfig {
    /// Whether a preflight from `origin` gets its origin echoed back.
    pub fn is_allowed(&self, origin: &str) -> bool {
        if self.development {
            return true;
        }
        if origin.is_empty() {
            return false;
        }
        self.allowed_origin.as_deref() == Some(origin) || LOCAL_ORIGINS.contains(&origin)
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("prompt-relay")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config with environment overrides applied (convenience method).
    pub fn load_with_env() -> Self {
        Self::load().unwrap_or_default().with_env_overrides()
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("LLM_BACKEND_URL") {
            self.upstream.backend_url = non_empty(url);
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            self.upstream.api_key = non_empty(key);
        }
        if let Ok(origin) = std::env::var("ALLOWED_ORIGIN") {
            self.cors.allowed_origin = non_empty(origin);
        }
        if let Ok(env) = std::env::var("APP_ENV") {
            self.cors.development = env == "development";
        }
        if let Ok(models) = std::env::var("FREE_MODELS") {
            self.catalog.free_models = parse_model_list(&models);
        }
        if let Ok(model) = std::env::var("DEFAULT_MODEL") {
            self.catalog.default_model = model;
        }
        if let Ok(val) = std::env::var("PROMPT_RELAY_PORT") {
            if let Ok(port) = val.parse() {
                self.gateway.port = port;
            }
        }
        self
    }

    /// Save config to file.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::Io)?;
        }
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&path, content).map_err(ConfigError::Io)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
