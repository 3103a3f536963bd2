//! Local Runtime Clients
//!
//! This module provides access to locally running LLM runtimes through the
//! common [`LocalProvider`] trait.
//!
//! # Available Clients
//!
//! - [`OllamaClient`]: Ollama's native protocol (NDJSON streaming, model management)
//! - [`OpenAiCompatClient`]: LM Studio and llama.cpp server (`data:` event streaming)
//!
//! # Usage
//!
//! ```ignore
//! use futures::StreamExt;
//! use provider_core::{ChatMessage, ChatOptions, LocalProvider, OllamaClient};
//!
//! let client = OllamaClient::local();
//! let options = ChatOptions::new("llama3.2").with_message(ChatMessage::user("Hello!"));
//! let mut stream = client.chat_stream(&options)?;
//! while let Some(chunk) = stream.next().await {
//!     print!("{}", chunk?.delta);
//! }
//! ```

mod base;
mod factory;
mod ollama;
mod openai_compat;
mod stream;
mod traits;

pub use factory::{
    create_active_provider, create_provider, probe_all, ProviderKind, UnknownProviderKind,
};
pub use ollama::OllamaClient;
pub use openai_compat::OpenAiCompatClient;
pub use stream::ChatStream;
pub use traits::{LocalProvider, ProgressSink, AVAILABILITY_TIMEOUT};
