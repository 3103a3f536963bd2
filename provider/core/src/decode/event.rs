//! Event-frame decoder (`data:` lines with a sentinel)
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"choices":[{"delta":{"content":"lo"},"finish_reason":"stop"}]}
//!
//! data: [DONE]
//! ```
//!
//! Only single-line `data:` payloads are decoded, which is what
//! OpenAI-compatible runtimes emit. Comments (`:`), other field names and
//! blank separators are ignored.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::{FrameDecoder, LineBuffer, MAX_LINE_SIZE};

/// Payload marking the end of an event stream
pub const DONE_SENTINEL: &str = "[DONE]";

const DATA_PREFIX: &[u8] = b"data:";

/// One decoded event
#[derive(Debug, Clone, PartialEq)]
pub enum EventFrame<T> {
    /// A JSON payload
    Data(T),
    /// The sentinel; nothing follows it
    Done,
}

/// Decoder for `data:`-prefixed event streams
#[derive(Debug)]
pub struct EventFrameDecoder<T> {
    lines: LineBuffer,
    skipped: usize,
    finished: bool,
    _frame: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for EventFrameDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> EventFrameDecoder<T> {
    /// Create a decoder with the default line limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LineBuffer::new(MAX_LINE_SIZE),
            skipped: 0,
            finished: false,
            _frame: PhantomData,
        }
    }

    /// Number of malformed `data:` payloads skipped so far
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Whether the sentinel has been seen
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn parse(&mut self, line: &[u8]) -> Option<EventFrame<T>> {
        let payload = line.strip_prefix(DATA_PREFIX)?;
        let Ok(payload) = std::str::from_utf8(payload) else {
            self.skipped += 1;
            return None;
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            self.finished = true;
            return Some(EventFrame::Done);
        }
        if payload.is_empty() {
            return None;
        }

        match serde_json::from_str(payload) {
            Ok(frame) => Some(EventFrame::Data(frame)),
            Err(e) => {
                self.skipped += 1;
                tracing::debug!(error = %e, "Skipping malformed event frame");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> FrameDecoder for EventFrameDecoder<T> {
    type Frame = EventFrame<T>;

    fn push(&mut self, data: &[u8]) {
        if !self.finished {
            self.lines.push(data);
        }
    }

    fn next_frame(&mut self) -> Option<EventFrame<T>> {
        while !self.finished {
            let line = self.lines.next_line()?;
            if let Some(frame) = self.parse(&line) {
                return Some(frame);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<EventFrame<T>> {
        if self.finished {
            return None;
        }
        let rest = self.lines.take_remainder()?;
        self.parse(&rest)
    }
}
