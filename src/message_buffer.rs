//! Bounded accumulator for messages that span more than one fragment.
//!
//! [`MessageBuffer`] collects immutable segments in arrival order and keeps a
//! running total against an optional cap. It exists only on the
//! multi-fragment path; single-fragment messages decode straight from the
//! receive segment. Text materialization streams the segments through an
//! incremental UTF-8 decoder so code points split across fragment boundaries
//! decode intact.

use std::num::NonZeroUsize;

use bytes::Bytes;
use thiserror::Error;

/// Raised when an append would push the accumulated length past the cap.
///
/// The buffer is unusable for the message afterwards; the connection treats
/// this as fatal rather than truncating.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("message length {attempted} exceeds limit {limit}")]
pub struct MessageBufferFull {
    /// Total length the rejected append would have produced.
    pub attempted: usize,
    /// Configured maximum message length.
    pub limit: NonZeroUsize,
}

/// Append-only, length-bounded segment accumulator.
#[derive(Debug, Default)]
pub struct MessageBuffer {
    segments: Vec<Bytes>,
    total_len: usize,
    max_len: Option<NonZeroUsize>,
}

impl MessageBuffer {
    /// Create a buffer bounded by `max_len`, or unbounded when `None`.
    #[must_use]
    pub fn new(max_len: Option<NonZeroUsize>) -> Self {
        Self {
            segments: Vec::new(),
            total_len: 0,
            max_len,
        }
    }

    /// Append one fragment's bytes.
    ///
    /// # Errors
    ///
    /// Returns [`MessageBufferFull`] when the total length would exceed the
    /// cap (a length-counter overflow counts as exceeding it).
    pub fn append(&mut self, segment: &[u8]) -> Result<(), MessageBufferFull> {
        let attempted = self
            .total_len
            .checked_add(segment.len())
            .unwrap_or(usize::MAX);
        if let Some(limit) = self.max_len {
            if attempted > limit.get() {
                return Err(MessageBufferFull { attempted, limit });
            }
        }
        self.total_len = attempted;
        self.segments.push(Bytes::copy_from_slice(segment));
        Ok(())
    }

    /// Accumulated length in bytes.
    #[must_use]
    pub fn len(&self) -> usize { self.total_len }

    /// True before the first non-empty append.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.total_len == 0 }

    /// Concatenate all segments into one exact-length byte vector.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(self.total_len);
        for segment in &self.segments {
            payload.extend_from_slice(segment);
        }
        payload
    }

    /// Decode all segments as one UTF-8 string.
    ///
    /// Code points split across segment boundaries are carried over and
    /// decoded whole. Invalid or incomplete sequences become U+FFFD, never
    /// an error.
    #[must_use]
    pub fn into_text(self) -> String {
        let mut decoder = Utf8Stream::new(self.total_len);
        for segment in &self.segments {
            decoder.feed(segment);
        }
        decoder.finish()
    }
}

const fn utf8_sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

const fn is_continuation(byte: u8) -> bool { byte & 0xC0 == 0x80 }

/// Incremental UTF-8 decoder carrying at most one partial code point between
/// chunks.
struct Utf8Stream {
    out: String,
    carry: [u8; 4],
    carry_len: usize,
}

impl Utf8Stream {
    fn new(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            carry: [0; 4],
            carry_len: 0,
        }
    }

    fn feed(&mut self, mut chunk: &[u8]) {
        chunk = self.complete_carry(chunk);
        loop {
            match std::str::from_utf8(chunk) {
                Ok(valid) => {
                    self.out.push_str(valid);
                    return;
                }
                Err(err) => {
                    let (valid, after) = chunk.split_at(err.valid_up_to());
                    if let Ok(prefix) = std::str::from_utf8(valid) {
                        self.out.push_str(prefix);
                    }
                    match err.error_len() {
                        Some(bad) => {
                            self.out.push(char::REPLACEMENT_CHARACTER);
                            chunk = &after[bad..];
                        }
                        None => {
                            // incomplete trailing sequence; carry into the
                            // next chunk
                            self.carry[..after.len()].copy_from_slice(after);
                            self.carry_len = after.len();
                            return;
                        }
                    }
                }
            }
        }
    }

    fn complete_carry<'a>(&mut self, mut chunk: &'a [u8]) -> &'a [u8] {
        if self.carry_len == 0 {
            return chunk;
        }
        let width = utf8_sequence_len(self.carry[0]);
        while self.carry_len < width && !chunk.is_empty() && is_continuation(chunk[0]) {
            self.carry[self.carry_len] = chunk[0];
            self.carry_len += 1;
            chunk = &chunk[1..];
        }
        if self.carry_len == width {
            match std::str::from_utf8(&self.carry[..width]) {
                Ok(decoded) => self.out.push_str(decoded),
                Err(_) => self.out.push(char::REPLACEMENT_CHARACTER),
            }
            self.carry_len = 0;
        } else if !chunk.is_empty() {
            // next byte cannot continue the carried sequence
            self.out.push(char::REPLACEMENT_CHARACTER);
            self.carry_len = 0;
        }
        chunk
    }

    fn finish(mut self) -> String {
        if self.carry_len > 0 {
            self.out.push(char::REPLACEMENT_CHARACTER);
        }
        self.out
    }
}
