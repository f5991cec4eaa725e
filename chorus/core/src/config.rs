//! TOML Configuration File Support
//!
//! Centralized configuration loading for chorus, from a TOML file at
//! `~/.config/chorus/config.toml`.
//!
//! # Configuration Priority
//!
//! Values are resolved with the following priority (highest first):
//! 1. CLI arguments (through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [backend]
//! base_url = "http://localhost:5050"
//! request_timeout_secs = 300
//! api_token = "..."
//!
//! [chat]
//! models = ["gemini", "deepseek"]
//! summary_model = "gemini"
//! llm_anonymous = true
//! cancel_policy = "abort_read"
//! message_capacity = 256
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::streaming::CancelPolicy;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where the configuration came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Backend connection settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendSettings {
    /// Base URL of the chorus backend
    pub base_url: String,
    /// Bearer token, if any
    pub api_token: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
    /// Timeout for session list and history calls in seconds
    pub request_timeout_secs: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5050".to_string(),
            api_token: None,
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

/// Per-send request parameters and engine tuning
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatConfig {
    /// Providers queried for every prompt
    pub models: Vec<String>,
    /// Provider that writes the combined answer
    pub summary_model: String,
    /// Ask the backend not to retain identifying data
    pub llm_anonymous: bool,
    /// What happens to the body read on cancellation
    pub cancel_policy: CancelPolicy,
    /// Capacity of the Conductor message channel
    pub message_capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            models: vec!["gemini".to_string(), "deepseek".to_string()],
            summary_model: "gemini".to_string(),
            llm_anonymous: true,
            cancel_policy: CancelPolicy::default(),
            message_capacity: 256,
        }
    }
}

/// Fully resolved configuration
#[derive(Clone, Debug)]
pub struct ChorusConfig {
    /// `[backend]` section
    pub backend: BackendSettings,
    /// `[chat]` section
    pub chat: ChatConfig,
    /// Highest-priority source that contributed a value
    source: ConfigSource,
    /// File the configuration was read from
    config_file_path: Option<PathBuf>,
}

impl Default for ChorusConfig {
    fn default() -> Self {
        Self {
            backend: BackendSettings::default(),
            chat: ChatConfig::default(),
            source: ConfigSource::Default,
            config_file_path: None,
        }
    }
}

impl ChorusConfig {
    /// Get where the configuration came from
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Get the file the configuration was read from
    #[must_use]
    pub fn config_file_path(&self) -> Option<&PathBuf> {
        self.config_file_path.as_ref()
    }

    /// Check the resolved values
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an empty model list, a blank
    /// base URL, or a zero message capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.base_url must not be empty".to_string(),
            ));
        }
        if self.chat.models.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::ValidationError(
                "chat.models must name at least one provider".to_string(),
            ));
        }
        if self.chat.message_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "chat.message_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Backend section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendToml {
    /// Base URL of the backend
    pub base_url: Option<String>,
    /// Bearer token
    pub api_token: Option<String>,
    /// Connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// History request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// Chat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatToml {
    /// Providers queried for every prompt
    pub models: Option<Vec<String>>,
    /// Provider that writes the combined answer
    pub summary_model: Option<String>,
    /// Anonymous mode
    pub llm_anonymous: Option<bool>,
    /// Cancellation policy
    pub cancel_policy: Option<CancelPolicy>,
    /// Message channel capacity
    pub message_capacity: Option<usize>,
}

/// Root of the TOML configuration file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChorusToml {
    /// `[backend]`
    pub backend: BackendToml,
    /// `[chat]`
    pub chat: ChatToml,
}

// =============================================================================
// Loading
// =============================================================================

/// Default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/chorus/config.toml`, or `None` when the platform
/// has no config directory.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("chorus").join("config.toml"))
}

/// Load configuration from the default path and the process environment
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config() -> Result<ChorusConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// A missing file is not an error; defaults are used.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ChorusConfig, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration with an explicit environment lookup
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config_with_env<F>(path: Option<PathBuf>, env: F) -> Result<ChorusConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = ChorusConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ChorusToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config, env);

    Ok(config)
}

fn apply_toml_config(config: &mut ChorusConfig, toml: &ChorusToml) {
    let backend = &toml.backend;
    if let Some(ref url) = backend.base_url {
        config.backend.base_url.clone_from(url);
    }
    if let Some(ref token) = backend.api_token {
        config.backend.api_token = non_blank(token);
    }
    if let Some(secs) = backend.connect_timeout_secs {
        config.backend.connect_timeout_secs = secs;
    }
    if let Some(secs) = backend.request_timeout_secs {
        config.backend.request_timeout_secs = secs;
    }

    let chat = &toml.chat;
    if let Some(ref models) = chat.models {
        config.chat.models.clone_from(models);
    }
    if let Some(ref model) = chat.summary_model {
        config.chat.summary_model.clone_from(model);
    }
    if let Some(anonymous) = chat.llm_anonymous {
        config.chat.llm_anonymous = anonymous;
    }
    if let Some(policy) = chat.cancel_policy {
        config.chat.cancel_policy = policy;
    }
    if let Some(capacity) = chat.message_capacity {
        config.chat.message_capacity = capacity;
    }
}

fn apply_env_config<F>(config: &mut ChorusConfig, env: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = env("CHORUS_BACKEND_URL") {
        config.backend.base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(token) = env("CHORUS_API_TOKEN") {
        config.backend.api_token = non_blank(&token);
        config.source = ConfigSource::Env;
    }
    if let Some(timeout) = env("CHORUS_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.backend.request_timeout_secs = secs;
            config.source = ConfigSource::Env;
        }
    }

    if let Some(models) = env("CHORUS_MODELS") {
        config.chat.models = split_models(&models);
        config.source = ConfigSource::Env;
    }
    if let Some(model) = env("CHORUS_SUMMARY_MODEL") {
        config.chat.summary_model = model;
        config.source = ConfigSource::Env;
    }
    if let Some(anonymous) = env("CHORUS_LLM_ANONYMOUS") {
        config.chat.llm_anonymous = anonymous != "0" && anonymous.to_lowercase() != "false";
        config.source = ConfigSource::Env;
    }
    if let Some(policy) = env("CHORUS_CANCEL_POLICY") {
        match policy.parse::<CancelPolicy>() {
            Ok(policy) => {
                config.chat.cancel_policy = policy;
                config.source = ConfigSource::Env;
            }
            Err(e) => tracing::warn!(error = %e, "Ignoring CHORUS_CANCEL_POLICY"),
        }
    }
}

/// Split a comma-separated model list, dropping blanks
fn split_models(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// =============================================================================
// CLI Overrides
// =============================================================================

/// Values supplied on the command line; applied last
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    base_url: Option<String>,
    api_token: Option<String>,
    models: Option<Vec<String>>,
    summary_model: Option<String>,
    llm_anonymous: Option<bool>,
    cancel_policy: Option<CancelPolicy>,
}

impl ConfigOverrides {
    /// Create an empty override set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the backend URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the bearer token
    #[must_use]
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Override the model list
    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = Some(models);
        self
    }

    /// Override the summary model
    #[must_use]
    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = Some(model.into());
        self
    }

    /// Override anonymous mode
    #[must_use]
    pub fn with_llm_anonymous(mut self, anonymous: bool) -> Self {
        self.llm_anonymous = Some(anonymous);
        self
    }

    /// Override the cancellation policy
    #[must_use]
    pub fn with_cancel_policy(mut self, policy: CancelPolicy) -> Self {
        self.cancel_policy = Some(policy);
        self
    }

    /// Check if nothing is overridden
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.base_url.is_none()
            && self.api_token.is_none()
            && self.models.is_none()
            && self.summary_model.is_none()
            && self.llm_anonymous.is_none()
            && self.cancel_policy.is_none()
    }

    /// Apply the overrides to a resolved configuration
    pub fn apply(&self, config: &mut ChorusConfig) {
        if self.is_empty() {
            return;
        }
        if let Some(ref url) = self.base_url {
            config.backend.base_url.clone_from(url);
        }
        if let Some(ref token) = self.api_token {
            config.backend.api_token = non_blank(token);
        }
        if let Some(ref models) = self.models {
            config.chat.models.clone_from(models);
        }
        if let Some(ref model) = self.summary_model {
            config.chat.summary_model.clone_from(model);
        }
        if let Some(anonymous) = self.llm_anonymous {
            config.chat.llm_anonymous = anonymous;
        }
        if let Some(policy) = self.cancel_policy {
            config.chat.cancel_policy = policy;
        }
        config.source = ConfigSource::Cli;
    }
}
