//! Three-tier message reassembly against the duplex socket.
//!
//! [`read_message`] turns a run of physical reads into one complete
//! [`Message`]. The tiers optimize for the overwhelmingly common short
//! message: a zero-length probe resolves close frames and empty final
//! fragments with no buffer at all, a single pooled read decodes the
//! dominant one-fragment case without the accumulator, and only a message
//! that genuinely spans fragments pays for a [`MessageBuffer`].

use std::num::NonZeroUsize;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    buffer_pool::BufferPool,
    frame::{FrameKind, ReceiveOutcome},
    message::Message,
    message_buffer::{MessageBuffer, MessageBufferFull},
    socket::{DuplexSocket, TransportError},
};

/// Failure while reassembling one inbound message.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The accumulated message length exceeded the configured cap.
    #[error("message too large: {attempted} bytes exceeds limit {limit}")]
    MessageTooLarge {
        /// Length the message would have reached.
        attempted: usize,
        /// Configured maximum.
        limit: NonZeroUsize,
    },
    /// A continuation fragment's kind differed from the first fragment's.
    #[error("frame kind mismatch: message began as {expected}, continuation was {found}")]
    FrameTypeMismatch {
        /// Kind fixed by the first fragment.
        expected: FrameKind,
        /// Kind reported by the offending continuation.
        found: FrameKind,
    },
    /// The socket reported a frame kind outside {binary, text, close}.
    #[error("unknown frame kind: opcode {opcode:#x}")]
    UnknownFrameKind {
        /// Raw opcode reported by the socket layer.
        opcode: u8,
    },
    /// The physical receive itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<MessageBufferFull> for ReadError {
    fn from(err: MessageBufferFull) -> Self {
        Self::MessageTooLarge {
            attempted: err.attempted,
            limit: err.limit,
        }
    }
}

/// Read one complete message from `socket`.
///
/// Fragments are pulled until a final fragment (or a close frame) arrives.
/// A close frame read mid-message aborts reassembly and yields
/// [`Message::Close`] immediately; close frames are never themselves
/// fragmented in this protocol.
///
/// # Errors
///
/// Fails with [`ReadError::MessageTooLarge`] when the accumulated length
/// would exceed `max_message_size`, [`ReadError::FrameTypeMismatch`] when a
/// continuation changes kind, and [`ReadError::Transport`] for cancellation,
/// disposal, or lower-level faults during a physical receive.
pub async fn read_message<S>(
    socket: &S,
    pool: &BufferPool,
    buffer_size: usize,
    max_message_size: Option<NonZeroUsize>,
    cancel: &CancellationToken,
) -> Result<Message, ReadError>
where
    S: DuplexSocket + ?Sized,
{
    // Tier 1: probe with an empty buffer. Close frames and zero-length
    // final fragments resolve without allocating a segment.
    let probe = socket.receive(&mut [], cancel).await?;
    if let Some(message) = single_read_message(probe, None) {
        return Ok(message);
    }

    // Tier 2: one pooled read. Most messages fit a single fragment and
    // decode straight from this segment.
    let mut segment = pool.allocate(buffer_size);
    let first = socket.receive(&mut segment, cancel).await?;
    if let Some(message) = single_read_message(first, Some(&segment[..first.bytes_read])) {
        return Ok(message);
    }

    // Tier 3: the message spans fragments. The kind is fixed by the first
    // fragment; every continuation must match it.
    let kind = first.kind;
    let mut buffer = MessageBuffer::new(max_message_size);
    buffer.append(&segment[..first.bytes_read])?;

    loop {
        let next = socket.receive(&mut segment, cancel).await?;
        if next.kind == FrameKind::Close {
            return Ok(Message::Close);
        }
        if next.kind != kind {
            return Err(ReadError::FrameTypeMismatch {
                expected: kind,
                found: next.kind,
            });
        }
        buffer.append(&segment[..next.bytes_read])?;
        if next.is_final {
            return Ok(materialize(kind, buffer));
        }
    }
}

/// Decode a read that completes a message on its own, or `None` when more
/// fragments are pending.
fn single_read_message(outcome: ReceiveOutcome, payload: Option<&[u8]>) -> Option<Message> {
    if outcome.kind == FrameKind::Close {
        return Some(Message::Close);
    }
    if !outcome.is_final {
        return None;
    }
    let message = match (outcome.kind, payload) {
        (FrameKind::Binary, None) => Message::empty_binary(),
        (FrameKind::Text, None) => Message::empty_text(),
        (FrameKind::Binary, Some(bytes)) => Message::Binary(bytes.to_vec()),
        (FrameKind::Text, Some(bytes)) => Message::Text(String::from_utf8_lossy(bytes).into_owned()),
        (FrameKind::Close, _) => Message::Close,
    };
    Some(message)
}

fn materialize(kind: FrameKind, buffer: MessageBuffer) -> Message {
    match kind {
        FrameKind::Binary => Message::Binary(buffer.into_bytes()),
        FrameKind::Text => Message::Text(buffer.into_text()),
        // a close frame never opens a fragment series; tier 1 and the
        // mid-stream check both short-circuit before this point
        FrameKind::Close => Message::Close,
    }
}
