//! Configuration loading, validation, and management for DeepDive.
//!
//! Loads configuration from `~/.deepdive/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use deepdive_core::RetryConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Store backends understood by [`StoreConfig::backend`].
pub const STORE_BACKENDS: [&str; 3] = ["memory", "file", "sqlite"];

/// The root configuration structure.
///
/// Maps directly to `~/.deepdive/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Provider used for every stage
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used for every stage
    #[serde(default = "default_model")]
    pub default_model: String,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub store: StoreConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}

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
            .field("pipeline", &self.pipeline)
            .field("store", &self.store)
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

/// Stage execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pause between successive gathering calls, in milliseconds
    #[serde(default = "default_courtesy_delay_ms")]
    pub courtesy_delay_ms: u64,

    /// Capacity of the in-process event bus
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Backoff applied to every remote call a stage makes
    #[serde(default = "default_stage_retry")]
    pub retry: RetryConfig,
}

fn default_courtesy_delay_ms() -> u64 {
    2_000
}
fn default_event_capacity() -> usize {
    256
}
fn default_stage_retry() -> RetryConfig {
    RetryConfig {
        max_retries: 5,
        initial_delay_ms: 2_000,
        ..RetryConfig::default()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            courtesy_delay_ms: default_courtesy_delay_ms(),
            event_capacity: default_event_capacity(),
            retry: default_stage_retry(),
        }
    }
}

/// Where research records and artifacts are persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// One of `memory`, `file`, `sqlite`
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// Backing file; defaults to a file under the config directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_store_backend() -> String {
    "file".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The configured path, or the per-backend default.
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        let file = match self.backend.as_str() {
            "sqlite" => "research.db",
            _ => "research.json",
        };
        AppConfig::config_dir().join(file)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.deepdive/config.toml).
    ///
    /// Also checks environment variables:
    /// - `DEEPDIVE_API_KEY` (highest priority), `GEMINI_API_KEY`, `GOOGLE_API_KEY`
    /// - `DEEPDIVE_PROVIDER`
    /// - `DEEPDIVE_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
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

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.api_key.is_none() {
            self.api_key = lookup("DEEPDIVE_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("GOOGLE_API_KEY"));
        }

        if let Some(provider) = lookup("DEEPDIVE_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("DEEPDIVE_MODEL") {
            self.default_model = model;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deepdive")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let retry = &self.pipeline.retry;
        if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "pipeline.retry.backoff_multiplier must be a finite number >= 1.0".into(),
            ));
        }

        if retry.max_delay_ms < retry.initial_delay_ms {
            return Err(ConfigError::ValidationError(
                "pipeline.retry.max_delay_ms must be >= initial_delay_ms".into(),
            ));
        }

        if self.pipeline.event_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.event_capacity must be > 0".into(),
            ));
        }

        if !STORE_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown store backend '{}' (expected one of: {})",
                self.store.backend,
                STORE_BACKENDS.join(", ")
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for the `config` command).
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
            pipeline: PipelineConfig::default(),
            store: StoreConfig::default(),
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
