//! Boundary trait for the duplex socket consumed by the transport core.
//!
//! The hosting layer performs the HTTP upgrade and hands an already-open
//! socket to the [`Connection`](crate::connection::Connection). The core only
//! ever drives it through [`DuplexSocket`]: one reader, one writer, and a
//! state query treated as append-only evidence; the core never invents
//! socket state.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::frame::{CloseReason, FrameKind, ReceiveOutcome};

/// State reported by the underlying socket primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SocketState {
    /// Handshake still in progress.
    Connecting,
    /// Fully open in both directions.
    Open,
    /// We sent a close frame and await the peer's.
    CloseSent,
    /// The peer sent a close frame we have not yet acknowledged.
    CloseReceived,
    /// Close handshake finished in both directions.
    Closed,
    /// Torn down without a handshake.
    Aborted,
}

impl SocketState {
    /// True once our side has sent (or can no longer send) a close frame.
    ///
    /// Guards close-output enqueueing: a connection in one of these states
    /// must not queue another close operation.
    #[must_use]
    pub const fn is_closed_or_close_sent(self) -> bool {
        matches!(self, Self::Closed | Self::CloseSent | Self::Aborted)
    }
}

/// Failure surfaced by a physical receive, send, or close operation.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The cancellation signal fired while the operation was pending.
    #[error("operation cancelled")]
    Cancelled,
    /// The socket handle was torn down concurrently. Always benign.
    #[error("socket handle disposed")]
    Disposed,
    /// Opaque lower-level fault from the socket primitive.
    #[error("transport fault: {0}")]
    Io(#[from] std::io::Error),
}

/// An already-open, possibly-fragmented duplex message stream.
///
/// Implemented by the hosting layer, consumed (never owned beyond one
/// connection's lifetime) by the transport core. Reads and writes are
/// logically independent directions: the receive loop is the sole reader and
/// the send queue the sole writer, each with at most one operation in flight,
/// so implementations need no internal ordering of their own.
#[async_trait]
pub trait DuplexSocket: Send + Sync + 'static {
    /// Receive the next frame fragment into `buffer`.
    ///
    /// A zero-length `buffer` probes for the next frame without consuming
    /// payload bytes; close frames and zero-length final fragments resolve
    /// on such a probe.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Cancelled`] when `cancel` fires first,
    /// [`TransportError::Disposed`] when the handle was torn down, or
    /// [`TransportError::Io`] for lower-level faults.
    async fn receive(
        &self,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<ReceiveOutcome, TransportError>;

    /// Transmit one frame fragment.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the write fails.
    async fn send(
        &self,
        payload: &[u8],
        kind: FrameKind,
        is_final: bool,
    ) -> Result<(), TransportError>;

    /// Send a close frame on the output side without waiting for the peer.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the close frame cannot be written.
    async fn close_output(&self, reason: CloseReason) -> Result<(), TransportError>;

    /// Current socket state.
    fn state(&self) -> SocketState;
}
