//! Provider Factory
//!
//! Picks the client implementation for a runtime kind, so callers can work
//! with `Box<dyn LocalProvider>` and never name a concrete client.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ollama::OllamaClient;
use super::openai_compat::OpenAiCompatClient;
use super::traits::LocalProvider;
use crate::config::{ProviderConfig, ProvidersConfigFile};
use crate::types::ProviderStatus;

/// Local runtimes this crate can talk to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Ollama, native protocol
    Ollama,
    /// LM Studio, OpenAI-compatible protocol
    LmStudio,
    /// llama.cpp server, OpenAI-compatible protocol
    LlamaCpp,
}

impl ProviderKind {
    /// Every kind, in display order
    pub const ALL: [Self; 3] = [Self::Ollama, Self::LmStudio, Self::LlamaCpp];

    /// Identifier used in config files and on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LmStudio => "lm-studio",
            Self::LlamaCpp => "llama-cpp",
        }
    }

    /// Human-readable runtime name
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Ollama => "Ollama",
            Self::LmStudio => "LM Studio",
            Self::LlamaCpp => "llama.cpp",
        }
    }

    /// Port the runtime listens on out of the box
    #[must_use]
    pub fn default_port(self) -> u16 {
        match self {
            Self::Ollama => 11434,
            Self::LmStudio => 1234,
            Self::LlamaCpp => 8080,
        }
    }

    /// Name of the TOML section holding this kind's settings
    #[must_use]
    pub fn section(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::LmStudio => "lm_studio",
            Self::LlamaCpp => "llama_cpp",
        }
    }

    /// Whether the runtime can download and delete models through its API
    #[must_use]
    pub fn manages_models(self) -> bool {
        matches!(self, Self::Ollama)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing a provider kind
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider {0:?} (expected ollama, lm-studio or llama-cpp)")]
pub struct UnknownProviderKind(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProviderKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "lm-studio" | "lm_studio" | "lmstudio" => Ok(Self::LmStudio),
            "llama-cpp" | "llama_cpp" | "llamacpp" | "llama.cpp" => Ok(Self::LlamaCpp),
            _ => Err(UnknownProviderKind(s.to_string())),
        }
    }
}

/// Create a provider client for a runtime kind
///
/// # Example
///
/// ```ignore
/// use provider_core::{create_provider, ProviderConfig, ProviderKind};
///
/// let config = ProviderConfig::for_kind(ProviderKind::LmStudio);
/// let provider = create_provider(ProviderKind::LmStudio, &config);
/// let models = provider.list_models().await?;
/// ```
#[must_use]
pub fn create_provider(kind: ProviderKind, config: &ProviderConfig) -> Box<dyn LocalProvider> {
    tracing::debug!(kind = %kind, base_url = %config.base_url, "Creating provider");
    match kind {
        ProviderKind::Ollama => Box::new(OllamaClient::new(config)),
        ProviderKind::LmStudio | ProviderKind::LlamaCpp => {
            Box::new(OpenAiCompatClient::new(kind, config))
        }
    }
}

/// Create the client for the configured active provider
#[must_use]
pub fn create_active_provider(config: &ProvidersConfigFile) -> Box<dyn LocalProvider> {
    create_provider(config.active, config.active_config())
}

/// Query the status of every known provider concurrently
///
/// Offline runtimes are reported with [`ProviderStatus::offline`].
pub async fn probe_all(config: &ProvidersConfigFile) -> Vec<(ProviderKind, ProviderStatus)> {
    let providers: Vec<Box<dyn LocalProvider>> = ProviderKind::ALL
        .iter()
        .map(|&kind| create_provider(kind, config.get(kind)))
        .collect();

    let statuses = futures::future::join_all(providers.iter().map(|p| p.status())).await;

    let results: Vec<(ProviderKind, ProviderStatus)> = providers
        .iter()
        .map(|p| p.kind())
        .zip(statuses)
        .collect();

    tracing::debug!(
        running = results.iter().filter(|(_, s)| s.running).count(),
        "Probed local providers"
    );
    results
}
