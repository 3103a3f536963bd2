//! TOML Configuration File Support
//!
//! Centralized configuration for provider clients, read from
//! `~/.config/local-llm/providers.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. CLI arguments (via [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! - `$XDG_CONFIG_HOME/local-llm/providers.toml` (typically `~/.config/local-llm/providers.toml`)
//!
//! # Example Configuration
//!
//! ```toml
//! active = "ollama"
//!
//! [ollama]
//! base_url = "http://localhost:11434"
//! timeout_secs = 120
//! max_retries = 3
//!
//! [lm_studio]
//! base_url = "http://localhost:1234"
//! retry_base_delay_ms = 500
//! retry_max_delay_ms = 4000
//!
//! [llama_cpp]
//! base_url = "http://gpu-box.local:8080"
//! ```
//!
//! # Environment Variables
//!
//! - `LOCAL_LLM_PROVIDER`: active provider (`ollama`, `lm-studio`, `llama-cpp`)
//! - `OLLAMA_HOST`: Ollama address, `host`, `host:port` or a full URL
//! - `LMSTUDIO_BASE_URL`, `LLAMACPP_BASE_URL`: base URLs
//! - `LOCAL_LLM_TIMEOUT_SECS`, `LOCAL_LLM_MAX_RETRIES`: applied to every provider

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::ProviderKind;
use crate::transport::RetryPolicy;

/// Default timeout for the native protocol (model loads can be slow)
pub const DEFAULT_OLLAMA_TIMEOUT: Duration = Duration::from_secs(120);

/// Default timeout for OpenAI-compatible runtimes
pub const DEFAULT_OPENAI_COMPAT_TIMEOUT: Duration = Duration::from_secs(60);

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

/// Tracks where a configuration value came from
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
// Per-Client Configuration
// =============================================================================

/// Settings of one client instance
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Base URL of the runtime, without a trailing slash
    pub base_url: String,

    /// Per-attempt timeout; also bounds each idle read while streaming
    pub timeout: Duration,

    /// Retry policy for transport failures
    pub retry: RetryPolicy,
}

impl ProviderConfig {
    /// Defaults for a provider kind
    #[must_use]
    pub fn for_kind(kind: ProviderKind) -> Self {
        let timeout = match kind {
            ProviderKind::Ollama => DEFAULT_OLLAMA_TIMEOUT,
            ProviderKind::LmStudio | ProviderKind::LlamaCpp => DEFAULT_OPENAI_COMPAT_TIMEOUT,
        };

        Self {
            base_url: format!("http://localhost:{}", kind.default_port()),
            timeout,
            retry: RetryPolicy::default(),
        }
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = trim_base_url(&base_url.into());
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the total number of attempts per call
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_attempts = max_retries;
        self
    }

    /// Set the retry policy
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Check the values a client cannot work with
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` for a non-HTTP base URL or a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ConfigError::ValidationError(format!(
                "base_url must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn trim_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Turn `host`, `host:port` or a full URL into a base URL
///
/// Follows the `OLLAMA_HOST` convention: a missing scheme means `http`, a
/// missing port means `default_port`.
#[must_use]
pub fn normalize_base_url(raw: &str, default_port: u16) -> String {
    let raw = trim_base_url(raw);
    if raw.contains("://") {
        return raw;
    }
    if raw.contains(':') {
        format!("http://{raw}")
    } else {
        format!("http://{raw}:{default_port}")
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// One provider section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderToml {
    /// Base URL of the runtime
    pub base_url: Option<String>,

    /// Per-attempt timeout in seconds
    pub timeout_secs: Option<u64>,

    /// Total attempts per call
    pub max_retries: Option<u32>,

    /// Delay before the first retry in milliseconds
    pub retry_base_delay_ms: Option<u64>,

    /// Maximum delay between retries in milliseconds
    pub retry_max_delay_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersToml {
    /// Provider used when the caller does not pick one
    pub active: Option<String>,

    /// Ollama section
    pub ollama: ProviderToml,

    /// LM Studio section
    pub lm_studio: ProviderToml,

    /// llama.cpp server section
    pub llama_cpp: ProviderToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Configuration of every known provider
///
/// Use [`load_config`] to load it with proper priority handling.
#[derive(Clone, Debug)]
pub struct ProvidersConfigFile {
    /// Provider used when the caller does not pick one
    pub active: ProviderKind,

    /// Ollama client settings
    pub ollama: ProviderConfig,

    /// LM Studio client settings
    pub lm_studio: ProviderConfig,

    /// llama.cpp server client settings
    pub llama_cpp: ProviderConfig,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    /// Source of configuration values
    source: ConfigSource,
}

impl Default for ProvidersConfigFile {
    fn default() -> Self {
        Self {
            active: ProviderKind::Ollama,
            ollama: ProviderConfig::for_kind(ProviderKind::Ollama),
            lm_studio: ProviderConfig::for_kind(ProviderKind::LmStudio),
            llama_cpp: ProviderConfig::for_kind(ProviderKind::LlamaCpp),
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ProvidersConfigFile {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings of one provider
    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> &ProviderConfig {
        match kind {
            ProviderKind::Ollama => &self.ollama,
            ProviderKind::LmStudio => &self.lm_studio,
            ProviderKind::LlamaCpp => &self.llama_cpp,
        }
    }

    /// Mutable settings of one provider
    pub fn get_mut(&mut self, kind: ProviderKind) -> &mut ProviderConfig {
        match kind {
            ProviderKind::Ollama => &mut self.ollama,
            ProviderKind::LmStudio => &mut self.lm_studio,
            ProviderKind::LlamaCpp => &mut self.llama_cpp,
        }
    }

    /// Settings of the active provider
    #[must_use]
    pub fn active_config(&self) -> &ProviderConfig {
        self.get(self.active)
    }

    /// Get the primary source of this configuration
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Validate every provider section
    ///
    /// # Errors
    ///
    /// Returns the first `ValidationError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in ProviderKind::ALL {
            self.get(kind).validate().map_err(|e| match e {
                ConfigError::ValidationError(msg) => {
                    ConfigError::ValidationError(format!("[{}] {msg}", kind.section()))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/local-llm/providers.toml` or
/// `~/.config/local-llm/providers.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("local-llm").join("providers.toml"))
}

/// Load configuration from all sources with proper priority
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if the
/// resulting values are invalid. A missing config file is not an error.
pub fn load_config() -> Result<ProvidersConfigFile, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path and the process environment
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting values are invalid.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ProvidersConfigFile, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// Load configuration from a specific path and an explicit environment lookup
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed, or
/// if the resulting values are invalid.
pub fn load_config_with_env<E>(
    path: Option<PathBuf>,
    env: E,
) -> Result<ProvidersConfigFile, ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    // Start with defaults
    let mut config = ProvidersConfigFile::default();

    // Try to load from file
    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ProvidersToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config)?;
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

    // Apply environment variables (overrides file values)
    apply_env_config(&mut config, env)?;

    config.validate()?;
    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(
    config: &mut ProvidersConfigFile,
    toml: &ProvidersToml,
) -> Result<(), ConfigError> {
    if let Some(ref active) = toml.active {
        config.active = parse_kind(active)?;
    }

    apply_provider_toml(&mut config.ollama, &toml.ollama);
    apply_provider_toml(&mut config.lm_studio, &toml.lm_studio);
    apply_provider_toml(&mut config.llama_cpp, &toml.llama_cpp);
    Ok(())
}

fn apply_provider_toml(config: &mut ProviderConfig, section: &ProviderToml) {
    if let Some(ref url) = section.base_url {
        config.base_url = trim_base_url(url);
    }
    if let Some(secs) = section.timeout_secs {
        config.timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = section.max_retries {
        config.retry.max_attempts = retries;
    }
    if let Some(ms) = section.retry_base_delay_ms {
        config.retry.base_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = section.retry_max_delay_ms {
        config.retry.max_delay = Duration::from_millis(ms);
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config<E>(config: &mut ProvidersConfigFile, env: E) -> Result<(), ConfigError>
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(active) = env("LOCAL_LLM_PROVIDER") {
        config.active = parse_kind(&active)?;
        config.source = ConfigSource::Env;
    }

    if let Some(host) = env("OLLAMA_HOST") {
        config.ollama.base_url =
            normalize_base_url(&host, ProviderKind::Ollama.default_port());
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("LMSTUDIO_BASE_URL") {
        config.lm_studio.base_url = trim_base_url(&url);
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env("LLAMACPP_BASE_URL") {
        config.llama_cpp.base_url = trim_base_url(&url);
        config.source = ConfigSource::Env;
    }

    if let Some(timeout) = env("LOCAL_LLM_TIMEOUT_SECS") {
        if let Ok(secs) = timeout.parse::<u64>() {
            for kind in ProviderKind::ALL {
                config.get_mut(kind).timeout = Duration::from_secs(secs);
            }
            config.source = ConfigSource::Env;
        }
    }
    if let Some(retries) = env("LOCAL_LLM_MAX_RETRIES") {
        if let Ok(n) = retries.parse::<u32>() {
            for kind in ProviderKind::ALL {
                config.get_mut(kind).retry.max_attempts = n;
            }
            config.source = ConfigSource::Env;
        }
    }

    Ok(())
}

fn parse_kind(raw: &str) -> Result<ProviderKind, ConfigError> {
    raw.parse()
        .map_err(|_| ConfigError::ValidationError(format!("unknown provider {raw:?}")))
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`] to apply command-line argument overrides.
/// Base URL, timeout and retries apply to the active provider (after the
/// active override, if any).
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Active provider override
    pub active: Option<ProviderKind>,

    /// Base URL override
    pub base_url: Option<String>,

    /// Timeout override (seconds)
    pub timeout_secs: Option<u64>,

    /// Max retries override
    pub max_retries: Option<u32>,
}

impl ConfigOverrides {
    /// Create a new empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set active provider override
    #[must_use]
    pub fn with_active(mut self, kind: ProviderKind) -> Self {
        self.active = Some(kind);
        self
    }

    /// Set base URL override
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set timeout override
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set max retries override
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Whether no override is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_none()
            && self.base_url.is_none()
            && self.timeout_secs.is_none()
            && self.max_retries.is_none()
    }

    /// Apply overrides to a configuration
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if an override makes the configuration invalid.
    pub fn apply(&self, config: &mut ProvidersConfigFile) -> Result<(), ConfigError> {
        if self.is_empty() {
            return Ok(());
        }
        config.source = ConfigSource::Cli;

        if let Some(kind) = self.active {
            config.active = kind;
        }

        let active = config.get_mut(config.active);
        if let Some(ref url) = self.base_url {
            active.base_url = trim_base_url(url);
        }
        if let Some(secs) = self.timeout_secs {
            active.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.max_retries {
            active.retry.max_attempts = retries;
        }

        config.validate()
    }
}

// =============================================================================
// Tests
// =============================================================================
