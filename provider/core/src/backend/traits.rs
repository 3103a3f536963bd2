//! Local Provider Trait
//!
//! The capability contract every local runtime client implements. Callers
//! hold a `Box<dyn LocalProvider>` (see [`create_provider`]) and never see
//! which wire protocol is underneath.
//!
//! # Failure Model
//!
//! - `is_available` and `status` never fail; they report `false` or an
//!   offline snapshot instead
//! - Every other call returns [`ProviderError`]
//! - Operations a backend cannot perform fail with `InvalidRequest` before
//!   touching the network
//!
//! [`create_provider`]: super::create_provider

use std::time::Duration;

use async_trait::async_trait;

use super::factory::ProviderKind;
use super::stream::ChatStream;
use crate::error::{ProviderError, Result};
use crate::registry::RequestId;
use crate::types::{ChatOptions, ChatResponse, ModelInfo, ProviderStatus, PullProgress};

/// Timeout of the single probe behind `is_available`
pub const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(2);

/// Receiver for pull progress events
pub type ProgressSink<'a> = &'a mut (dyn FnMut(PullProgress) + Send);

/// Local inference provider
///
/// Implement this trait to add support for another local runtime.
#[async_trait]
pub trait LocalProvider: Send + Sync {
    /// Display name of the runtime (e.g., "Ollama", "LM Studio")
    fn name(&self) -> &str;

    /// Which runtime this client talks to
    fn kind(&self) -> ProviderKind;

    /// Base URL requests are sent to
    fn base_url(&self) -> &str;

    /// Per-attempt timeout
    fn timeout(&self) -> Duration;

    /// Total attempts per call
    fn max_retries(&self) -> u32;

    /// Check whether the runtime answers, with a short single probe
    async fn is_available(&self) -> bool;

    /// Best-effort snapshot of the runtime
    async fn status(&self) -> ProviderStatus;

    /// List installed (or served) models
    async fn list_models(&self) -> Result<Vec<ModelInfo>>;

    /// Download a model, reporting progress to `on_progress` until it completes
    async fn pull_model(&self, name: &str, on_progress: ProgressSink<'_>) -> Result<()>;

    /// Remove an installed model
    async fn delete_model(&self, name: &str) -> Result<()>;

    /// Send a conversation and wait for the complete answer
    async fn chat(&self, options: &ChatOptions) -> Result<ChatResponse>;

    /// Send a conversation and receive the answer incrementally
    ///
    /// The request is registered immediately; the HTTP call starts on the
    /// first poll of the returned stream.
    fn chat_stream(&self, options: &ChatOptions) -> Result<ChatStream>;

    /// Compute an embedding vector
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;

    /// Cancel one in-flight call; `false` if it is not in flight
    fn cancel(&self, id: &RequestId) -> bool;

    /// Cancel every in-flight call on this client, returning how many were cancelled
    fn cancel_all(&self) -> usize;

    /// Ids of the calls currently in flight
    fn in_flight(&self) -> Vec<RequestId>;

    /// Whether a call is still in flight
    fn is_in_flight(&self, id: &RequestId) -> bool {
        self.in_flight().contains(id)
    }

    /// Check if a specific model is available
    async fn has_model(&self, model: &str) -> Result<bool> {
        let models = self.list_models().await?;
        Ok(models.iter().any(|m| m.name == model || m.model == model))
    }

    /// Get information about a specific model
    async fn model_info(&self, model: &str) -> Result<Option<ModelInfo>> {
        let models = self.list_models().await?;
        Ok(models
            .into_iter()
            .find(|m| m.name == model || m.model == model))
    }
}

/// Fail an operation the runtime has no endpoint for
pub(crate) fn unsupported<T>(backend: &str, operation: &str) -> Result<T> {
    tracing::debug!(backend, operation, "Rejecting unsupported operation");
    Err(ProviderError::unsupported(backend, operation))
}
