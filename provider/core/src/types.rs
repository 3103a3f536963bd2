//! Shared Types
//!
//! Data shapes shared by every provider client. These are backend-neutral:
//! the wire structs of each protocol live next to their client and are mapped
//! into these before reaching the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RequestId;

// ============================================================================
// Messages
// ============================================================================

/// Author of a chat message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that frame the conversation
    System,
    /// The human side of the conversation
    User,
    /// The model side of the conversation
    Assistant,
}

impl Role {
    /// Wire name of the role
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who wrote the message
    pub role: Role,
    /// Text content
    pub content: String,
    /// Base64-encoded image attachments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
}

impl ChatMessage {
    /// Create a message with the given role and content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            images: Vec::new(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Attach a base64-encoded image
    #[must_use]
    pub fn with_image(mut self, base64: impl Into<String>) -> Self {
        self.images.push(base64.into());
        self
    }
}

// ============================================================================
// Chat Requests
// ============================================================================

/// Parameters for a chat call
///
/// Sampling values are passed through untouched; the backend is the one that
/// rejects malformed values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Target model id
    pub model: String,
    /// Conversation history, oldest first
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature
    pub temperature: Option<f32>,
    /// Nucleus sampling cutoff
    pub top_p: Option<f32>,
    /// Top-k sampling cutoff
    pub top_k: Option<u32>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Caller-chosen id for cancellation; a fresh one is generated when unset
    #[serde(skip)]
    pub request_id: Option<RequestId>,
}

impl ChatOptions {
    /// Create options targeting a model with an empty conversation
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Default::default()
        }
    }

    /// Append one message
    #[must_use]
    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Replace the conversation
    #[must_use]
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set top-p
    #[must_use]
    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Set top-k
    #[must_use]
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Add a stop sequence
    #[must_use]
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    /// Pin the request id so the call can be cancelled while it runs
    #[must_use]
    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }
}

// ============================================================================
// Chat Results
// ============================================================================

/// Why generation stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// Natural end or a stop sequence
    Stop,
    /// Token limit reached
    Length,
}

impl FinishReason {
    /// Map a backend-reported reason; anything but `length` counts as a stop
    #[must_use]
    pub fn from_wire(reason: Option<&str>) -> Self {
        match reason {
            Some("length") => Self::Length,
            _ => Self::Stop,
        }
    }
}

/// Token accounting for one call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u64,
    /// Tokens generated
    pub completion_tokens: u64,
    /// Always `prompt_tokens + completion_tokens`
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Build usage from its two parts; the total is derived
    #[must_use]
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Result of a single-shot chat call
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Final text
    pub content: String,
    /// Model that produced the answer
    pub model: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Why generation stopped
    pub finish_reason: FinishReason,
    /// The answer as an assistant message, ready to append to the history
    pub message: ChatMessage,
}

impl ChatResponse {
    pub(crate) fn new(
        content: String,
        model: String,
        usage: TokenUsage,
        finish_reason: FinishReason,
    ) -> Self {
        let message = ChatMessage::assistant(content.clone());
        Self {
            content,
            model,
            usage,
            finish_reason,
            message,
        }
    }
}

/// One increment of a streamed chat answer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text added by this chunk (may be empty)
    pub delta: String,
    /// Set on the single final chunk of a stream
    pub done: bool,
    /// Model producing the stream
    pub model: String,
    /// Finish reason, terminal chunk only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Token usage, terminal chunk only and only when the backend reports it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl StreamChunk {
    /// A non-terminal chunk
    pub fn delta(model: impl Into<String>, delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            done: false,
            model: model.into(),
            finish_reason: None,
            usage: None,
        }
    }

    /// An empty terminal chunk
    pub fn terminal(model: impl Into<String>, finish_reason: FinishReason) -> Self {
        Self {
            delta: String::new(),
            done: true,
            model: model.into(),
            finish_reason: Some(finish_reason),
            usage: None,
        }
    }
}

// ============================================================================
// Model Management
// ============================================================================

/// Progress event emitted while a model downloads
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    /// Backend status label ("pulling manifest", "downloading", "success"...)
    pub status: String,
    /// Bytes downloaded so far for `digest`
    pub completed: u64,
    /// Total bytes for `digest`
    pub total: u64,
    /// Layer being downloaded, when the event is about a layer
    pub digest: Option<String>,
}

impl PullProgress {
    /// Completion ratio in `0.0..=1.0`, if the total is known
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> Option<f64> {
        (self.total > 0).then(|| (self.completed as f64 / self.total as f64).min(1.0))
    }
}

/// Optional descriptive metadata of a model
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDetails {
    /// Model family ("llama", "qwen2"...)
    pub family: Option<String>,
    /// Parameter size as reported ("7B", "270M"...)
    pub parameter_size: Option<String>,
    /// Quantization level ("Q4_K_M"...)
    pub quantization_level: Option<String>,
    /// Weight file format ("gguf"...)
    pub format: Option<String>,
}

impl ModelDetails {
    /// Parse `parameter_size` into a parameter count
    ///
    /// Accepts an optional `K`, `M`, `B` or `T` suffix and a fractional mantissa,
    /// e.g. `"8.0B"` is 8 billion.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn parameter_count(&self) -> Option<u64> {
        let raw = self.parameter_size.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }

        let (number, multiplier) = match raw.chars().last()?.to_ascii_uppercase() {
            'K' => (&raw[..raw.len() - 1], 1e3),
            'M' => (&raw[..raw.len() - 1], 1e6),
            'B' => (&raw[..raw.len() - 1], 1e9),
            'T' => (&raw[..raw.len() - 1], 1e12),
            _ => (raw, 1.0),
        };

        let value: f64 = number.trim().parse().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        Some((value * multiplier).round() as u64)
    }
}

/// A model installed on (or served by) a backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Display name
    pub name: String,
    /// Canonical model id used in requests
    pub model: String,
    /// Size in bytes; 0 when the backend does not report it
    pub size: u64,
    /// Content digest; empty when the backend does not report it
    pub digest: String,
    /// Last-modified timestamp as reported by the backend
    pub modified_at: String,
    /// Descriptive metadata, when available
    pub details: Option<ModelDetails>,
}

impl ModelInfo {
    /// Parse `modified_at` as an RFC 3339 timestamp
    #[must_use]
    pub fn modified_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.modified_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

// ============================================================================
// Status
// ============================================================================

/// Best-effort snapshot of a backend
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    /// Whether the backend answered
    pub running: bool,
    /// Runtime version, if reported
    pub version: Option<String>,
    /// Model currently loaded in memory, if reported
    pub loaded_model: Option<String>,
    /// Number of installed/served models
    pub models_count: usize,
}

impl ProviderStatus {
    /// Snapshot used whenever the backend cannot be queried
    #[must_use]
    pub fn offline() -> Self {
        Self::default()
    }
}
