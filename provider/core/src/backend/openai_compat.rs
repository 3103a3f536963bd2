//! OpenAI-Compatible Client
//!
//! Client for runtimes exposing the OpenAI REST surface: LM Studio and the
//! llama.cpp server.
//!
//! # Endpoints
//!
//! - `GET /v1/models` - Served models
//! - `POST /v1/chat/completions` - Chat completions (`data:` events when streaming)
//! - `POST /v1/embeddings` - Embedding vectors
//!
//! These runtimes manage model files themselves, so `pull_model` and
//! `delete_model` fail with `InvalidRequest` without touching the network.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use serde::{Deserialize, Serialize};

use super::base::ClientBase;
use super::factory::ProviderKind;
use super::stream::{chat_stream, ChatStream, ChunkMapper};
use super::traits::{unsupported, LocalProvider, ProgressSink};
use crate::config::ProviderConfig;
use crate::decode::{EventFrame, EventFrameDecoder};
use crate::error::{ProviderError, Result};
use crate::registry::RequestId;
use crate::transport::check_status;
use crate::types::{
    ChatMessage, ChatOptions, ChatResponse, FinishReason, ModelInfo, ProviderStatus,
    StreamChunk, TokenUsage,
};

/// MIME type assumed for raw base64 image attachments
const DEFAULT_IMAGE_MIME: &str = "image/png";

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: Vec<String>,
}

impl CompletionRequest {
    fn from_options(options: &ChatOptions, stream: bool) -> Self {
        Self {
            model: options.model.clone(),
            messages: options.messages.iter().map(WireMessage::from).collect(),
            stream,
            temperature: options.temperature,
            top_p: options.top_p,
            top_k: options.top_k,
            max_tokens: options.max_tokens,
            stop: options.stop.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

impl From<&ChatMessage> for WireMessage {
    fn from(message: &ChatMessage) -> Self {
        let content = if message.images.is_empty() {
            WireContent::Text(message.content.clone())
        } else {
            let mut parts = vec![ContentPart::Text {
                text: message.content.clone(),
            }];
            parts.extend(message.images.iter().map(|image| ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: data_url(image),
                },
            }));
            WireContent::Parts(parts)
        };

        Self {
            role: message.role.as_str(),
            content,
        }
    }
}

fn data_url(image: &str) -> String {
    if image.starts_with("data:") {
        image.to_string()
    } else {
        format!("data:{DEFAULT_IMAGE_MIME};base64,{image}")
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl From<WireUsage> for TokenUsage {
    fn from(usage: WireUsage) -> Self {
        TokenUsage::new(usage.prompt_tokens, usage.completion_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct StreamFrame {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<ChoiceMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
    #[serde(default)]
    created: Option<i64>,
}

impl From<ModelEntry> for ModelInfo {
    fn from(entry: ModelEntry) -> Self {
        let modified_at = entry
            .created
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
            .unwrap_or_default();

        Self {
            name: entry.id.clone(),
            model: entry.id,
            size: 0,
            digest: String::new(),
            modified_at,
            details: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    embedding: Vec<f32>,
}

fn error_text(error: &serde_json::Value) -> String {
    error
        .as_str()
        .or_else(|| error.get("message").and_then(serde_json::Value::as_str))
        .map_or_else(|| error.to_string(), str::to_string)
}

// ============================================================================
// Chunk Mapping
// ============================================================================

/// Event frames in, chunks out
///
/// Role-only and empty frames are skipped. The first frame with a finish
/// reason becomes the terminal chunk.
struct EventChunks {
    model: String,
}

impl ChunkMapper for EventChunks {
    type Frame = EventFrame<StreamFrame>;

    fn map(&mut self, frame: EventFrame<StreamFrame>) -> Result<Option<StreamChunk>> {
        let frame = match frame {
            EventFrame::Data(frame) => frame,
            EventFrame::Done => {
                return Ok(Some(StreamChunk::terminal(
                    self.model.clone(),
                    FinishReason::Stop,
                )))
            }
        };

        if let Some(ref error) = frame.error {
            return Err(ProviderError::Generation(error_text(error)));
        }

        let model = if frame.model.is_empty() {
            self.model.clone()
        } else {
            frame.model
        };
        let usage = frame.usage.map(TokenUsage::from);
        let (delta, finish_reason) = frame
            .choices
            .into_iter()
            .next()
            .map(|choice| {
                let delta = choice.delta.and_then(|d| d.content).unwrap_or_default();
                (delta, choice.finish_reason)
            })
            .unwrap_or_default();

        if let Some(reason) = finish_reason {
            return Ok(Some(StreamChunk {
                delta,
                done: true,
                model,
                finish_reason: Some(FinishReason::from_wire(Some(&reason))),
                usage,
            }));
        }

        if delta.is_empty() {
            return Ok(None);
        }
        Ok(Some(StreamChunk::delta(model, delta)))
    }

    fn finish(&mut self) -> Option<StreamChunk> {
        tracing::warn!(model = %self.model, "Event stream ended without a sentinel");
        Some(StreamChunk::terminal(self.model.clone(), FinishReason::Stop))
    }
}

// ============================================================================
// Client
// ============================================================================

/// OpenAI-compatible client
#[derive(Clone, Debug)]
pub struct OpenAiCompatClient {
    base: ClientBase,
}

impl OpenAiCompatClient {
    /// Create a client for a runtime kind from explicit settings
    #[must_use]
    pub fn new(kind: ProviderKind, config: &ProviderConfig) -> Self {
        Self {
            base: ClientBase::new(kind, config),
        }
    }

    /// Create a client for LM Studio on its default local port
    #[must_use]
    pub fn lm_studio() -> Self {
        Self::new(
            ProviderKind::LmStudio,
            &ProviderConfig::for_kind(ProviderKind::LmStudio),
        )
    }

    /// Create a client for a llama.cpp server on its default local port
    #[must_use]
    pub fn llama_cpp() -> Self {
        Self::new(
            ProviderKind::LlamaCpp,
            &ProviderConfig::for_kind(ProviderKind::LlamaCpp),
        )
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

#[async_trait]
impl LocalProvider for OpenAiCompatClient {
    fn name(&self) -> &str {
        self.base.kind().label()
    }

    fn kind(&self) -> ProviderKind {
        self.base.kind()
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
        self.base.probe("/v1/models").await
    }

    async fn status(&self) -> ProviderStatus {
        let Some(list) = self.base.probe_json::<ModelList>("/v1/models").await else {
            tracing::debug!(
                backend = self.name(),
                base_url = %self.base.base_url(),
                "Backend is offline"
            );
            return ProviderStatus::offline();
        };

        ProviderStatus {
            running: true,
            version: None,
            models_count: list.data.len(),
            loaded_model: list.data.into_iter().next().map(|m| m.id),
        }
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let list: ModelList = self.base.get_json("/v1/models").await?;
        Ok(list.data.into_iter().map(ModelInfo::from).collect())
    }

    async fn pull_model(&self, _name: &str, _on_progress: ProgressSink<'_>) -> Result<()> {
        unsupported(self.name(), "pulling models")
    }

    async fn delete_model(&self, _name: &str) -> Result<()> {
        unsupported(self.name(), "deleting models")
    }

    async fn chat(&self, options: &ChatOptions) -> Result<ChatResponse> {
        let request = CompletionRequest::from_options(options, false);
        let response: CompletionResponse = self
            .base
            .post_json(
                "/v1/chat/completions",
                &request,
                &options.model,
                options.request_id,
            )
            .await?;

        let usage = response.usage.map(TokenUsage::from).unwrap_or_default();
        let model = if response.model.is_empty() {
            options.model.clone()
        } else {
            response.model
        };
        let Some(choice) = response.choices.into_iter().next() else {
            return Err(ProviderError::Generation(format!(
                "{model} returned no choices"
            )));
        };

        let content = choice.message.and_then(|m| m.content).unwrap_or_default();
        tracing::debug!(
            backend = self.name(),
            model = %model,
            total_tokens = usage.total_tokens,
            "Chat complete"
        );

        Ok(ChatResponse::new(
            content,
            model,
            usage,
            FinishReason::from_wire(choice.finish_reason.as_deref()),
        ))
    }

    fn chat_stream(&self, options: &ChatOptions) -> Result<ChatStream> {
        let guard = self.base.register(options.request_id)?;
        let token = guard.token().clone();
        let transport = self.base.transport().clone();
        let url = self.base.url("/v1/chat/completions");
        let request = CompletionRequest::from_options(options, true);
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
            EventFrameDecoder::<StreamFrame>::new(),
            self.base.timeout(),
            EventChunks { model },
        ))
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest { model, input: text };
        let response: EmbeddingResponse = self
            .base
            .post_json("/v1/embeddings", &request, model, None)
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ProviderError::Generation(format!("{model} returned no embedding")))
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
