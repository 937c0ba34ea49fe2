//! Connection lifecycle controller.
//!
//! One [`Connection`] owns a socket handle for that handle's entire life:
//! it runs the receive loop, dispatches complete messages to the embedder's
//! handler, serializes every outbound write through the send queue, and
//! drives the close handshake with a bounded grace period. Terminal
//! conditions are classified as normal-close, cancelled, or fatal; only
//! fatal ones reach the handler's error callback, and every path converges
//! on exactly one close callback.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use bytes::Bytes;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    buffer_pool::BufferPool,
    config::ConnectionConfig,
    frame::{CloseReason, FrameKind},
    handler::ConnectionHandler,
    message::Message,
    reader::{ReadError, read_message},
    send_queue::{Completion, SendQueue},
    socket::{DuplexSocket, SocketState, TransportError},
};

/// The controller's own view of the connection, distinct from the raw
/// socket state. Terminal once [`Closed`](LifecycleState::Closed).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed; the open callback has not fired yet.
    Opening = 0,
    /// The receive loop is pulling messages.
    Receiving = 1,
    /// A close frame is queued; awaiting the peer or the grace timer.
    ClosingLocal = 2,
    /// Terminal. No transition out.
    Closed = 3,
}

impl LifecycleState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Opening,
            1 => Self::Receiving,
            2 => Self::ClosingLocal,
            _ => Self::Closed,
        }
    }
}

/// Fatal condition delivered to [`ConnectionHandler::on_error`].
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Receive-side failure that terminated the connection.
    #[error("receive failed: {0}")]
    Read(#[from] ReadError),
    /// Cancellation surfaced while the external disconnect signal was not
    /// set.
    #[error("cancelled without the disconnect signal being set")]
    UnexpectedCancellation,
}

/// Decides whether a transport fault is fatal (`true`) or a known
/// peer-went-away signature to close on silently (`false`).
pub type FatalClassifier = Arc<dyn Fn(&std::io::Error) -> bool + Send + Sync>;

/// Treat connection-reset signatures as a normal close; everything unknown
/// is fatal.
fn default_fatal_classifier(error: &std::io::Error) -> bool {
    !matches!(
        error.kind(),
        std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
    )
}

/// Lifecycle controller for one duplex socket.
pub struct Connection<S> {
    socket: Arc<S>,
    pool: BufferPool,
    config: ConnectionConfig,
    send_queue: SendQueue,
    is_fatal: FatalClassifier,
    state: AtomicU8,
}

impl<S: DuplexSocket> Connection<S> {
    /// Build a controller around an already-open socket handle.
    ///
    /// Must be called from within a tokio runtime; the send queue's worker
    /// task is spawned here.
    #[must_use]
    pub fn new(socket: Arc<S>, pool: BufferPool, config: ConnectionConfig) -> Self {
        Self {
            socket,
            pool,
            config,
            send_queue: SendQueue::new(),
            is_fatal: Arc::new(default_fatal_classifier),
            state: AtomicU8::new(LifecycleState::Opening as u8),
        }
    }

    /// Replace the fatal/non-fatal transport-fault predicate.
    #[must_use]
    pub fn with_fatal_classifier(mut self, classifier: FatalClassifier) -> Self {
        self.is_fatal = classifier;
        self
    }

    /// The controller's current view of the connection.
    pub fn lifecycle(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn advance(&self, state: LifecycleState) {
        self.state.store(state as u8, Ordering::Release);
        log::debug!("connection state: {state:?}");
    }

    /// Queue one frame for transmission.
    ///
    /// A no-op when the socket is not open: nothing is queued and the
    /// returned handle resolves `Ok` immediately. The queued operation
    /// re-checks the socket before writing, so a send that races the close
    /// handshake degrades to a no-op rather than an error.
    pub fn send(&self, payload: Bytes, kind: FrameKind, end_of_message: bool) -> Completion {
        if self.socket.state() != SocketState::Open {
            return Completion::ready();
        }
        let socket = Arc::clone(&self.socket);
        self.send_queue.enqueue(async move {
            if socket.state() != SocketState::Open {
                return Ok(());
            }
            socket.send(&payload, kind, end_of_message).await
        })
    }

    /// Queue a complete text message.
    pub fn send_text(&self, text: impl Into<String>) -> Completion {
        let payload = Bytes::from(text.into().into_bytes());
        self.send(payload, FrameKind::Text, true)
    }

    /// Queue a complete binary message.
    pub fn send_binary(&self, payload: Bytes) -> Completion {
        self.send(payload, FrameKind::Binary, true)
    }

    /// Queue a close frame on the output side.
    ///
    /// A no-op when a close was already sent or the socket is gone, so
    /// calling this twice enqueues at most one close operation; the queued
    /// operation re-checks the socket state before writing.
    pub fn close(&self) -> Completion {
        if self.socket.state().is_closed_or_close_sent() {
            return Completion::ready();
        }
        let socket = Arc::clone(&self.socket);
        self.send_queue.enqueue(async move {
            if socket.state().is_closed_or_close_sent() {
                return Ok(());
            }
            socket.close_output(CloseReason::normal()).await
        })
    }

    /// Drive the connection until it closes.
    ///
    /// Fires `on_open`, dispatches every reassembled message in read order,
    /// performs the close handshake when the peer closes, and classifies
    /// the terminal condition. `on_close` fires exactly once, always, as
    /// the very last action, even when open, a message handler, or the
    /// close-output failed. Cancelling `cancel` stops the loop at the next
    /// iteration boundary.
    pub async fn run<H: ConnectionHandler>(&self, handler: &mut H, cancel: CancellationToken) {
        handler.on_open();
        self.advance(LifecycleState::Receiving);

        if let Some(error) = self.receive_until_closed(handler, &cancel).await {
            handler.on_error(&error);
        }

        self.advance(LifecycleState::Closed);
        handler.on_close();
    }

    async fn receive_until_closed<H: ConnectionHandler>(
        &self,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> Option<ConnectionError> {
        while !cancel.is_cancelled() {
            let next = read_message(
                self.socket.as_ref(),
                &self.pool,
                self.config.read_buffer_size,
                self.config.max_message_size,
                cancel,
            )
            .await;

            match next {
                Ok(Message::Text(text)) => handler.on_message_text(text),
                Ok(Message::Binary(payload)) => handler.on_message_binary(payload),
                Ok(Message::Close) => {
                    self.advance(LifecycleState::ClosingLocal);
                    self.acknowledge_close().await;
                    return None;
                }
                Err(error) => return self.classify(error, cancel),
            }
        }
        None
    }

    /// Queue our close frame acknowledging the peer's, then race it against
    /// the grace timer. Whichever finishes first wins; the queue itself is
    /// not cancelled, so an abandoned close keeps flushing in the
    /// background.
    async fn acknowledge_close(&self) {
        let completion = self.close();
        tokio::select! {
            _ = completion => {}
            () = tokio::time::sleep(self.config.close_grace) => {
                debug!("close-output missed the grace period; abandoning the connection");
            }
        }
    }

    fn classify(
        &self,
        error: ReadError,
        cancel: &CancellationToken,
    ) -> Option<ConnectionError> {
        match error {
            ReadError::Transport(TransportError::Cancelled) => {
                // the token attached to a cancellation error is unreliable;
                // trust only the signal itself
                if cancel.is_cancelled() {
                    None
                } else {
                    Some(ConnectionError::UnexpectedCancellation)
                }
            }
            ReadError::Transport(TransportError::Disposed) => None,
            ReadError::Transport(TransportError::Io(fault)) => {
                if (self.is_fatal)(&fault) {
                    Some(ConnectionError::Read(ReadError::Transport(
                        TransportError::Io(fault),
                    )))
                } else {
                    debug!(%fault, "peer went away; closing quietly");
                    None
                }
            }
            protocol_violation => Some(ConnectionError::Read(protocol_violation)),
        }
    }
}
