//! Provider Core - Local Inference Provider Abstraction
//!
//! A client library for locally running LLM runtimes. One capability
//! contract, [`LocalProvider`], covers every runtime regardless of the wire
//! protocol it speaks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          Caller                                  │
//! │            Box<dyn LocalProvider>  /  RequestId                  │
//! └───────────────┬──────────────────────────────────┬───────────────┘
//!                 │ chat / chat_stream / pull ...    │ cancel(id)
//! ┌───────────────┴──────────────────┐  ┌────────────┴───────────────┐
//! │  OllamaClient  OpenAiCompatClient│  │      RequestRegistry       │
//! └───────────────┬──────────────────┘  │  RequestId → Cancellation  │
//!                 │                     └────────────┬───────────────┘
//! ┌───────────────┴──────────────────┐               │ token
//! │        RetryingTransport         │◄──────────────┘
//! │ timeout + exponential backoff    │
//! └───────────────┬──────────────────┘
//!                 │ body bytes
//! ┌───────────────┴──────────────────┐
//! │ NdjsonDecoder  EventFrameDecoder │ ──► StreamChunk / PullProgress
//! └──────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`LocalProvider`]: The capability contract
//! - [`OllamaClient`]: Native Ollama protocol
//! - [`OpenAiCompatClient`]: LM Studio and llama.cpp server
//! - [`ChatOptions`] / [`ChatResponse`] / [`StreamChunk`]: Chat shapes
//! - [`ProviderError`]: Typed failures
//!
//! # Quick Start
//!
//! ```ignore
//! use provider_core::{load_config, create_active_provider, ChatMessage, ChatOptions};
//!
//! let config = load_config()?;
//! let provider = create_active_provider(&config);
//!
//! if provider.is_available().await {
//!     let options = ChatOptions::new("llama3.2").with_message(ChatMessage::user("Hi"));
//!     let reply = provider.chat(&options).await?;
//!     println!("{} ({} tokens)", reply.content, reply.usage.total_tokens);
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: Provider trait, clients and factory
//! - [`transport`]: Retrying HTTP transport and response handling
//! - [`decode`]: Streaming frame decoders
//! - [`registry`]: In-flight request tracking and cancellation
//! - [`config`]: TOML / environment / CLI configuration
//! - [`catalog`]: Model catalog presentation helpers
//! - [`types`]: Shared data shapes
//! - [`error`]: Error types

#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod error;
pub mod registry;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use backend::{
    create_active_provider, create_provider, probe_all, ChatStream, LocalProvider, OllamaClient,
    OpenAiCompatClient, ProgressSink, ProviderKind, UnknownProviderKind,
};
pub use catalog::{format_bytes, RecommendedModel, RECOMMENDED_MODELS};
pub use config::{
    load_config, load_config_from_path, ConfigError, ConfigOverrides, ConfigSource,
    ProviderConfig, ProvidersConfigFile,
};
pub use error::{ProviderError, Result, TransportFailure};
pub use registry::{RequestGuard, RequestId, RequestRegistry};
pub use transport::{RetryPolicy, RetryingTransport};
pub use types::{
    ChatMessage, ChatOptions, ChatResponse, FinishReason, ModelDetails, ModelInfo,
    ProviderStatus, PullProgress, Role, StreamChunk, TokenUsage,
};
