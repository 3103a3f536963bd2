//! Streaming Responses
//!
//! Glue between a response body, a [`FrameDecoder`] and the caller:
//!
//! ```text
//! bytes_stream() ──► BodyReader<D> ──► ChunkMapper ──► ChatStream
//!                    (idle timeout,    (wire frame →   (Stream of
//!                     cancellation)     StreamChunk)    StreamChunk)
//! ```
//!
//! A [`ChatStream`] yields exactly one terminal chunk, last. Cancellation
//! ends it without an error item.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream};
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::decode::FrameDecoder;
use crate::error::{ProviderError, Result, TransportFailure};
use crate::registry::{RequestGuard, RequestId};
use crate::types::StreamChunk;

// ============================================================================
// Body Reader
// ============================================================================

/// Decoded frames pulled from a streaming response body
pub(crate) struct BodyReader<D> {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: D,
    idle_timeout: Duration,
    eof: bool,
}

impl<D: FrameDecoder> BodyReader<D> {
    pub(crate) fn new(response: reqwest::Response, decoder: D, idle_timeout: Duration) -> Self {
        Self {
            body: response.bytes_stream().boxed(),
            decoder,
            idle_timeout,
            eof: false,
        }
    }

    /// Next frame, or `None` once the body has ended
    ///
    /// # Errors
    ///
    /// - `Cancelled` if `cancel` fires while waiting for bytes
    /// - `Timeout` if no bytes arrive within the idle timeout
    /// - `Connection` if the body read fails
    pub(crate) async fn next_frame(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<D::Frame>> {
        loop {
            if let Some(frame) = self.decoder.next_frame() {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ProviderError::Cancelled),
                next = tokio::time::timeout(self.idle_timeout, self.body.next()) => next,
            };

            match next {
                Err(_) => return Err(ProviderError::Timeout(self.idle_timeout)),
                Ok(None) => {
                    self.eof = true;
                    return Ok(self.decoder.finish());
                }
                Ok(Some(Err(e))) => {
                    return Err(ProviderError::Connection {
                        attempts: 1,
                        source: TransportFailure::Interrupted(e.to_string()),
                    })
                }
                Ok(Some(Ok(bytes))) => self.decoder.push(&bytes),
            }
        }
    }
}

// ============================================================================
// Chunk Mapping
// ============================================================================

/// Protocol-specific translation of wire frames into chunks
pub(crate) trait ChunkMapper: Send + 'static {
    /// Wire frame produced by the decoder
    type Frame;

    /// Map one frame; `Ok(None)` skips it
    fn map(&mut self, frame: Self::Frame) -> Result<Option<StreamChunk>>;

    /// Body ended before a terminal chunk; returns the chunk to close with
    fn finish(&mut self) -> Option<StreamChunk>;
}

// ============================================================================
// Chat Stream
// ============================================================================

/// Incremental chat answer
///
/// Yields `Result<StreamChunk, ProviderError>`. The stream is finite, ends
/// right after the chunk with `done == true`, and cannot be restarted.
/// Dropping it settles the request.
pub struct ChatStream {
    id: RequestId,
    inner: BoxStream<'static, Result<StreamChunk>>,
}

impl ChatStream {
    /// Id to pass to `cancel`
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.id
    }
}

impl fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatStream").field("id", &self.id).finish()
    }
}

impl Stream for ChatStream {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

/// Build a lazy chat stream
///
/// `connect` performs the HTTP call (with retries) and runs on first poll.
pub(crate) fn chat_stream<D, M, C>(
    guard: RequestGuard,
    connect: C,
    decoder: D,
    idle_timeout: Duration,
    mapper: M,
) -> ChatStream
where
    D: FrameDecoder + Send + 'static,
    D::Frame: Send,
    M: ChunkMapper<Frame = D::Frame>,
    C: Future<Output = Result<reqwest::Response>> + Send + 'static,
{
    let id = guard.id();
    let pump = Pump {
        token: guard.token().clone(),
        guard: Some(guard),
        connect: Some(connect.boxed()),
        decoder: Some(decoder),
        reader: None,
        idle_timeout,
        mapper,
    };

    let inner = futures::stream::unfold(pump, |mut pump| async move {
        pump.next_item().await.map(|item| (item, pump))
    })
    .fuse()
    .boxed();

    ChatStream { id, inner }
}

struct Pump<D, M> {
    token: CancellationToken,
    /// Held until the stream settles
    guard: Option<RequestGuard>,
    connect: Option<BoxFuture<'static, Result<reqwest::Response>>>,
    decoder: Option<D>,
    reader: Option<BodyReader<D>>,
    idle_timeout: Duration,
    mapper: M,
}

impl<D, M> Pump<D, M>
where
    D: FrameDecoder + Send + 'static,
    M: ChunkMapper<Frame = D::Frame>,
{
    async fn next_item(&mut self) -> Option<Result<StreamChunk>> {
        let id = self.guard.as_ref()?.id();

        let item = match self.advance().await {
            Ok(Some(chunk)) if !chunk.done => return Some(Ok(chunk)),
            Ok(Some(chunk)) => {
                tracing::debug!(request_id = %id, "Stream complete");
                Some(Ok(chunk))
            }
            Ok(None) => None,
            Err(ProviderError::Cancelled) => {
                tracing::debug!(request_id = %id, "Stream cancelled");
                None
            }
            Err(e) => {
                tracing::warn!(request_id = %id, error = %e, "Stream failed");
                Some(Err(e))
            }
        };

        // Terminal state: settle the request
        self.guard = None;
        self.reader = None;
        item
    }

    async fn advance(&mut self) -> Result<Option<StreamChunk>> {
        if let Some(connect) = self.connect.take() {
            let response = connect.await?;
            if let Some(decoder) = self.decoder.take() {
                self.reader = Some(BodyReader::new(response, decoder, self.idle_timeout));
            }
        }

        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        loop {
            match reader.next_frame(&self.token).await? {
                Some(frame) => {
                    if let Some(chunk) = self.mapper.map(frame)? {
                        return Ok(Some(chunk));
                    }
                }
                None => return Ok(self.mapper.finish()),
            }
        }
    }
}
