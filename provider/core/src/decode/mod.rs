//! Frame Decoders
//!
//! Streaming bodies arrive as arbitrary byte chunks. The decoders here buffer
//! those chunks and hand out complete frames, keeping wire framing out of the
//! chat and model-management code.
//!
//! Two wire formats are supported:
//!
//! - [`NdjsonDecoder`]: one JSON object per line (native protocol)
//! - [`EventFrameDecoder`]: `data:` lines ending with a `[DONE]` sentinel
//!   (OpenAI-compatible protocol)
//!
//! Both skip malformed frames instead of failing the stream.
//!
//! # Usage
//!
//! ```ignore
//! let mut decoder = NdjsonDecoder::<serde_json::Value>::new();
//! decoder.push(b"{\"a\":1}\n{\"a\"");
//! assert!(decoder.next_frame().is_some());
//! assert!(decoder.next_frame().is_none()); // waiting for the rest
//! ```

mod event;
mod ndjson;

pub use event::{EventFrame, EventFrameDecoder, DONE_SENTINEL};
pub use ndjson::NdjsonDecoder;

/// Maximum line length (10 MB)
///
/// A line longer than this is dropped rather than buffered without bound.
pub const MAX_LINE_SIZE: usize = 10 * 1024 * 1024;

/// Minimum buffer capacity for decoders
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Incremental decoder for one streaming wire format
pub trait FrameDecoder {
    /// Decoded frame type
    type Frame;

    /// Append bytes read from the body
    fn push(&mut self, data: &[u8]);

    /// Next complete frame, or `None` if more bytes are needed
    fn next_frame(&mut self) -> Option<Self::Frame>;

    /// Flush a trailing frame left without a newline once the body has ended
    fn finish(&mut self) -> Option<Self::Frame>;
}

/// Newline splitter shared by both decoders
///
/// Works on bytes so a multi-byte UTF-8 sequence split across two chunks is
/// reassembled before anything looks at it.
#[derive(Debug)]
pub(crate) struct LineBuffer {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Position already searched for a newline
    scan_pos: usize,
    max_line: usize,
    /// Dropping an oversized line until its newline shows up
    discarding: bool,
}

impl LineBuffer {
    pub(crate) fn new(max_line: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            scan_pos: 0,
            max_line,
            discarding: false,
        }
    }

    pub(crate) fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.scan_pos -= self.read_pos;
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Next complete line without its `\n` / `\r\n` terminator
    pub(crate) fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let from = self.scan_pos.max(self.read_pos);
            let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') else {
                self.scan_pos = self.buffer.len();
                if self.available() > self.max_line {
                    tracing::warn!(
                        buffered = self.available(),
                        max = self.max_line,
                        "Dropping oversized stream line"
                    );
                    self.discarding = true;
                    self.reset();
                }
                return None;
            };

            let start = self.read_pos;
            let end = from + offset;
            self.read_pos = end + 1;
            self.scan_pos = self.read_pos;

            if self.discarding {
                self.discarding = false;
                continue;
            }

            return Some(strip_cr(&self.buffer[start..end]).to_vec());
        }
    }

    /// Whatever is left once the body has ended
    pub(crate) fn take_remainder(&mut self) -> Option<Vec<u8>> {
        let rest = if self.discarding || self.available() == 0 {
            None
        } else {
            Some(strip_cr(&self.buffer[self.read_pos..]).to_vec())
        };
        self.discarding = false;
        self.reset();
        rest
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.scan_pos = 0;
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_across_chunks() {
        let mut lines = LineBuffer::new(MAX_LINE_SIZE);
        lines.push(b"first\nsec");
        assert_eq!(lines.next_line(), Some(b"first".to_vec()));
        assert_eq!(lines.next_line(), None);

        lines.push(b"ond\r\nthird");
        assert_eq!(lines.next_line(), Some(b"second".to_vec()));
        assert_eq!(lines.next_line(), None);
        assert_eq!(lines.take_remainder(), Some(b"third".to_vec()));
        assert_eq!(lines.take_remainder(), None);
    }

    #[test]
    fn test_empty_lines_are_returned() {
        let mut lines = LineBuffer::new(MAX_LINE_SIZE);
        lines.push(b"\n\na\n");
        assert_eq!(lines.next_line(), Some(Vec::new()));
        assert_eq!(lines.next_line(), Some(Vec::new()));
        assert_eq!(lines.next_line(), Some(b"a".to_vec()));
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut lines = LineBuffer::new(8);
        lines.push(b"0123456789abcdef");
        assert_eq!(lines.next_line(), None);

        lines.push(b"still the same line\nnext\n");
        assert_eq!(lines.next_line(), Some(b"next".to_vec()));
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn test_compaction_keeps_partial_line() {
        let mut lines = LineBuffer::new(MAX_LINE_SIZE);
        let line = vec![b'x'; MIN_BUFFER_CAPACITY];
        for _ in 0..4 {
            lines.push(&line);
            lines.push(b"\n");
            assert_eq!(lines.next_line().map(|l| l.len()), Some(MIN_BUFFER_CAPACITY));
        }

        lines.push(b"par");
        assert_eq!(lines.next_line(), None);
        lines.push(&line);
        lines.push(b"tial\n");
        let last = lines.next_line().unwrap();
        assert!(last.starts_with(b"par"));
        assert!(last.ends_with(b"tial"));
    }
}
