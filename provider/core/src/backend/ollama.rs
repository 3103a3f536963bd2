//! Ollama Client
//!
//! Client for Ollama's native REST protocol.
//!
//! # Ollama API
//!
//! - `GET /api/tags` - Installed models
//! - `GET /api/version` - Runtime version
//! - `GET /api/ps` - Models loaded in memory
//! - `POST /api/pull` - Download a model (NDJSON progress)
//! - `DELETE /api/delete` - Remove a model
//! - `POST /api/chat` - Chat completions (NDJSON when streaming)
//! - `POST /api/embeddings` - Embedding vectors
//!
//! Streaming bodies are one JSON object per line. Token counts only appear
//! on the final (`"done": true`) line.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::base::ClientBase;
use super::factory::ProviderKind;
use super::stream::{chat_stream, BodyReader, ChatStream, ChunkMapper};
use super::traits::{LocalProvider, ProgressSink};
use crate::config::ProviderConfig;
use crate::decode::NdjsonDecoder;
use crate::error::{ProviderError, Result};
use crate::registry::RequestId;
use crate::transport::check_status;
use crate::types::{
    ChatMessage, ChatOptions, ChatResponse, FinishReason, ModelDetails, ModelInfo,
    ProviderStatus, PullProgress, StreamChunk, TokenUsage,
};

/// Status reported by the final pull frame
const PULL_SUCCESS: &str = "success";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<SamplingOptions>,
}

impl ChatRequest {
    fn from_options(options: &ChatOptions, stream: bool) -> Self {
        Self {
            model: options.model.clone(),
            messages: options.messages.clone(),
            stream,
            options: SamplingOptions::from_options(options),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct SamplingOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl SamplingOptions {
    fn from_options(options: &ChatOptions) -> Option<Self> {
        let sampling = Self {
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            num_predict: options.max_tokens,
            stop: options.stop.clone(),
        };

        let empty = sampling.temperature.is_none()
            && sampling.top_p.is_none()
            && sampling.top_k.is_none()
            && sampling.num_predict.is_none()
            && sampling.stop.is_empty();
        (!empty).then_some(sampling)
    }
}

#[derive(Debug, Deserialize)]
struct ChatFrame {
    #[serde(default)]
    model: String,
    #[serde(default)]
    message: Option<FrameMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatFrame {
    fn usage(&self) -> Option<TokenUsage> {
        if self.prompt_eval_count.is_none() && self.eval_count.is_none() {
            return None;
        }
        Some(TokenUsage::new(
            self.prompt_eval_count.unwrap_or(0),
            self.eval_count.unwrap_or(0),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct FrameMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct PullFrame {
    #[serde(default)]
    status: String,
    #[serde(default)]
    digest: Option<String>,
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    completed: Option<u64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    digest: String,
    #[serde(default)]
    modified_at: String,
    #[serde(default)]
    details: Option<TagDetails>,
}

#[derive(Debug, Deserialize)]
struct TagDetails {
    #[serde(default)]
    family: Option<String>,
    #[serde(default)]
    parameter_size: Option<String>,
    #[serde(default)]
    quantization_level: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

impl From<TagModel> for ModelInfo {
    fn from(tag: TagModel) -> Self {
        Self {
            model: tag.model.unwrap_or_else(|| tag.name.clone()),
            name: tag.name,
            size: tag.size,
            digest: tag.digest,
            modified_at: tag.modified_at,
            details: tag.details.map(|d| ModelDetails {
                family: d.family,
                parameter_size: d.parameter_size,
                quantization_level: d.quantization_level,
                format: d.format,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct RunningResponse {
    #[serde(default)]
    models: Vec<RunningModel>,
}

#[derive(Debug, Deserialize)]
struct RunningModel {
    name: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

// ============================================================================
// Chunk Mapping
// ============================================================================

/// One NDJSON chat frame in, one chunk out
struct NativeChunks {
    model: String,
}

impl ChunkMapper for NativeChunks {
    type Frame = ChatFrame;

    fn map(&mut self, frame: ChatFrame) -> Result<Option<StreamChunk>> {
        let usage = frame.usage();
        if let Some(error) = frame.error {
            return Err(ProviderError::Generation(error));
        }

        let model = if frame.model.is_empty() {
            self.model.clone()
        } else {
            frame.model
        };
        let delta = frame.message.map(|m| m.content).unwrap_or_default();

        if !frame.done {
            return Ok(Some(StreamChunk::delta(model, delta)));
        }

        Ok(Some(StreamChunk {
            delta,
            done: true,
            model,
            finish_reason: Some(FinishReason::from_wire(frame.done_reason.as_deref())),
            usage,
        }))
    }

    fn finish(&mut self) -> Option<StreamChunk> {
        tracing::warn!(model = %self.model, "Ollama stream ended without a final frame");
        Some(StreamChunk::terminal(self.model.clone(), FinishReason::Stop))
    }
}

/// Classify a pull error message
fn pull_error(name: &str, message: String) -> ProviderError {
    let lower = message.to_lowercase();
    if lower.contains("not found") || lower.contains("does not exist") {
        ProviderError::ModelNotFound(name.to_string())
    } else {
        ProviderError::Generation(message)
    }
}

// ============================================================================
// Client
// ============================================================================

/// Ollama client
#[derive(Clone, Debug)]
pub struct OllamaClient {
    base: ClientBase,
}

impl OllamaClient {
    /// Create a client from explicit settings
    #[must_use]
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            base: ClientBase::new(ProviderKind::Ollama, config),
        }
    }

    /// Create a client for `http://localhost:11434` with default settings
    #[must_use]
    pub fn local() -> Self {
        Self::new(&ProviderConfig::for_kind(ProviderKind::Ollama))
    }

    /// Change the base URL
    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base.set_base_url(base_url);
    }

    /// Change the per-attempt timeout
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.base.set_timeout(timeout);
    }

    /// Change the total number of attempts per call
    pub fn set_max_retries(&mut self, max_retries: u32) {
        self.base.set_max_retries(max_retries);
    }
}

impl Default for OllamaClient {
    fn default() -> Self {
        Self::local()
    }
}

#[async_trait]
impl LocalProvider for OllamaClient {
    fn name(&self) -> &str {
        self.base.kind().label()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn base_url(&self) -> &str {
        self.base.base_url()
    }

    fn timeout(&self) -> Duration {
        self.base.timeout()
    }

    fn max_retries(&self) -> u32 {
        self.base.max_retries()
    }

    async fn is_available(&self) -> bool {
        self.base.probe("/api/tags").await
    }

    async fn status(&self) -> ProviderStatus {
        let (version, tags, running) = tokio::join!(
            self.base.probe_json::<VersionResponse>("/api/version"),
            self.base.probe_json::<TagsResponse>("/api/tags"),
            self.base.probe_json::<RunningResponse>("/api/ps"),
        );

        if version.is_none() && tags.is_none() {
            tracing::debug!(base_url = %self.base.base_url(), "Ollama is offline");
            return ProviderStatus::offline();
        }

        ProviderStatus {
            running: true,
            version: version.map(|v| v.version),
            loaded_model: running.and_then(|r| r.models.into_iter().next().map(|m| m.name)),
            models_count: tags.map_or(0, |t| t.models.len()),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let tags: TagsResponse = self.base.get_json("/api/tags").await?;
        Ok(tags.models.into_iter().map(ModelInfo::from).collect())
    }

    async fn pull_model(&self, name: &str, on_progress: ProgressSink<'_>) -> Result<()> {
        let guard = self.base.register(None)?;
        let url = self.base.url("/api/pull");
        let body = serde_json::json!({ "model": name, "stream": true });

        tracing::info!(model = name, "Pulling model");

        let response = self
            .base
            .transport()
            .send(guard.token(), |http| http.post(&url).json(&body))
            .await?;
        let response =
            check_status(response, Some(name), guard.token(), self.base.timeout()).await?;

        let mut reader = BodyReader::new(
            response,
            NdjsonDecoder::<PullFrame>::new(),
            self.base.timeout(),
        );
        // Highest `completed` seen per layer; progress never goes backwards
        let mut high_water: HashMap<String, u64> = HashMap::new();

        while let Some(frame) = reader.next_frame(guard.token()).await? {
            if let Some(error) = frame.error {
                tracing::warn!(model = name, error = %error, "Pull failed");
                return Err(pull_error(name, error));
            }

            let mut completed = frame.completed.unwrap_or(0);
            if let Some(ref digest) = frame.digest {
                let seen = high_water.entry(digest.clone()).or_insert(0);
                completed = completed.max(*seen);
                *seen = completed;
            }

            let finished = frame.status == PULL_SUCCESS;
            on_progress(PullProgress {
                status: frame.status,
                completed,
                total: frame.total.unwrap_or(0),
                digest: frame.digest,
            });

            if finished {
                tracing::info!(model = name, "Pull complete");
                return Ok(());
            }
        }

        Err(ProviderError::Generation(format!(
            "pull of {name} ended before completion"
        )))
    }

    async fn delete_model(&self, name: &str) -> Result<()> {
        let guard = self.base.register(None)?;
        let url = self.base.url("/api/delete");
        let body = serde_json::json!({ "model": name });

        let response = self
            .base
            .transport()
            .send(guard.token(), |http| http.delete(&url).json(&body))
            .await?;
        check_status(response, Some(name), guard.token(), self.base.timeout()).await?;

        tracing::info!(model = name, "Model deleted");
        Ok(())
    }

    async fn chat(&self, options: &ChatOptions) -> Result<ChatResponse> {
        let request = ChatRequest::from_options(options, false);
        let frame: ChatFrame = self
            .base
            .post_json("/api/chat", &request, &options.model, options.request_id)
            .await?;

        let usage = frame.usage().unwrap_or_default();
        if let Some(error) = frame.error {
            return Err(ProviderError::Generation(error));
        }

        let model = if frame.model.is_empty() {
            options.model.clone()
        } else {
            frame.model
        };
        let content = frame.message.map(|m| m.content).unwrap_or_default();

        tracing::debug!(
            model = %model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "Chat complete"
        );

        Ok(ChatResponse::new(
            content,
            model,
            usage,
            FinishReason::from_wire(frame.done_reason.as_deref()),
        ))
    }

    fn chat_stream(&self, options: &ChatOptions) -> Result<ChatStream> {
        let guard = self.base.register(options.request_id)?;
        let token = guard.token().clone();
        let transport = self.base.transport().clone();
        let url = self.base.url("/api/chat");
        let request = ChatRequest::from_options(options, true);
        let model = options.model.clone();

        let connect = async move {
            let response = transport
                .send(&token, |http| http.post(&url).json(&request))
                .await?;
            let timeout = transport.timeout();
            check_status(response, Some(&request.model), &token, timeout).await
        };

        Ok(chat_stream(
            guard,
            connect,
            NdjsonDecoder::<ChatFrame>::new(),
            self.base.timeout(),
            NativeChunks { model },
        ))
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            model,
            prompt: text,
        };
        let response: EmbeddingResponse = self
            .base
            .post_json("/api/embeddings", &request, model, None)
            .await?;

        if response.embedding.is_empty() {
            return Err(ProviderError::Generation(format!(
                "{model} returned an empty embedding"
            )));
        }
        Ok(response.embedding)
    }

    fn cancel(&self, id: &RequestId) -> bool {
        self.base.registry().cancel(id)
    }

    fn cancel_all(&self) -> usize {
        self.base.registry().cancel_all()
    }

    fn in_flight(&self) -> Vec<RequestId> {
        self.base.registry().ids()
    }

    fn is_in_flight(&self, id: &RequestId) -> bool {
        self.base.registry().contains(id)
    }
}
