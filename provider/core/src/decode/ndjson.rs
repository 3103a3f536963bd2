//! Newline-delimited JSON decoder

use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use super::{FrameDecoder, LineBuffer, MAX_LINE_SIZE};

/// Decoder for bodies made of one JSON object per line
///
/// Each line is parsed on its own; blank and malformed lines are skipped.
#[derive(Debug)]
pub struct NdjsonDecoder<T> {
    lines: LineBuffer,
    skipped: usize,
    _frame: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    /// Create a decoder with the default line limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_SIZE)
    }

    /// Create a decoder with a custom line limit
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            lines: LineBuffer::new(max_line),
            skipped: 0,
            _frame: PhantomData,
        }
    }

    /// Number of malformed lines skipped so far
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn parse(&mut self, line: &[u8]) -> Option<T> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }

        match serde_json::from_slice(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.skipped += 1;
                tracing::debug!(error = %e, len = line.len(), "Skipping malformed NDJSON line");
                None
            }
        }
    }
}

impl<T: DeserializeOwned> FrameDecoder for NdjsonDecoder<T> {
    type Frame = T;

    fn push(&mut self, data: &[u8]) {
        self.lines.push(data);
    }

    fn next_frame(&mut self) -> Option<T> {
        while let Some(line) = self.lines.next_line() {
            if let Some(frame) = self.parse(&line) {
                return Some(frame);
            }
        }
        None
    }

    fn finish(&mut self) -> Option<T> {
        let rest = self.lines.take_remainder()?;
        self.parse(&rest)
    }
}
