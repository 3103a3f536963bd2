//! Model Catalog Helpers
//!
//! Presentation helpers for model-management screens: byte formatting and a
//! short list of models known to run well on consumer hardware.

use serde::Serialize;

use crate::types::ModelInfo;

/// A model suggested to users who have none installed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RecommendedModel {
    /// Pullable model name (with tag)
    pub name: &'static str,
    /// One-line description
    pub description: &'static str,
    /// Approximate download size, for display
    pub size: &'static str,
}

impl RecommendedModel {
    /// Whether `installed` contains this model
    ///
    /// An untagged installed name matches the `:latest` tag and vice versa.
    #[must_use]
    pub fn is_installed(&self, installed: &[ModelInfo]) -> bool {
        let wanted = canonical_name(self.name);
        installed
            .iter()
            .any(|m| canonical_name(&m.name) == wanted || canonical_name(&m.model) == wanted)
    }
}

fn canonical_name(name: &str) -> String {
    if name.contains(':') {
        name.to_string()
    } else {
        format!("{name}:latest")
    }
}

/// Models suggested for a first download, smallest first
pub const RECOMMENDED_MODELS: &[RecommendedModel] = &[
    RecommendedModel {
        name: "llama3.2:1b",
        description: "Meta Llama 3.2 1B, fast responses on any machine",
        size: "1.3 GB",
    },
    RecommendedModel {
        name: "qwen2.5:3b",
        description: "Qwen 2.5 3B, strong multilingual assistant",
        size: "1.9 GB",
    },
    RecommendedModel {
        name: "llama3.2:3b",
        description: "Meta Llama 3.2 3B, balanced quality and speed",
        size: "2.0 GB",
    },
    RecommendedModel {
        name: "mistral:7b",
        description: "Mistral 7B, solid general-purpose model",
        size: "4.1 GB",
    },
    RecommendedModel {
        name: "qwen2.5-coder:7b",
        description: "Qwen 2.5 Coder 7B, code generation and review",
        size: "4.7 GB",
    },
    RecommendedModel {
        name: "nomic-embed-text",
        description: "Nomic embedding model for semantic search",
        size: "274 MB",
    },
];

/// Recommended models not yet present in `installed`
#[must_use]
pub fn missing_recommendations(installed: &[ModelInfo]) -> Vec<RecommendedModel> {
    RECOMMENDED_MODELS
        .iter()
        .filter(|r| !r.is_installed(installed))
        .copied()
        .collect()
}

/// Format a byte count with binary units (`1.5 GB`)
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
