//! Strictly ordered execution of outbound socket operations.
//!
//! The underlying socket forbids concurrent writes, so every send and
//! close-output for a connection goes through one [`SendQueue`]. A single
//! worker task drains the queue in submission order; the queue's discipline,
//! not thread affinity, is what guarantees at most one operation in flight.
//! A failed operation is logged where it ran and reported only on its own
//! [`Completion`] handle; it never stalls the queue or later enqueuers.

use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

use crate::socket::TransportError;

/// Failure of one queued operation, observable only by its issuer.
#[derive(Debug, Error)]
pub enum SendTaskError {
    /// The operation body failed against the socket.
    #[error("socket operation failed: {0}")]
    Transport(#[from] TransportError),
    /// The queue was torn down before the operation ran.
    #[error("send queue torn down before the operation ran")]
    Abandoned,
}

type BoxedOp = Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send>>;

struct QueuedOp {
    op: BoxedOp,
    done: oneshot::Sender<Result<(), SendTaskError>>,
}

/// FIFO of pending socket writes for one connection.
///
/// Dropping the queue closes intake; the worker finishes already-enqueued
/// operations as detached background cleanup, then exits.
pub struct SendQueue {
    ops: mpsc::UnboundedSender<QueuedOp>,
}

impl SendQueue {
    /// Create the queue and spawn its worker task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let (ops, mut rx) = mpsc::unbounded_channel::<QueuedOp>();
        tokio::spawn(async move {
            while let Some(queued) = rx.recv().await {
                let result = queued.op.await.map_err(SendTaskError::from);
                if let Err(error) = &result {
                    warn!(%error, "queued socket operation failed");
                }
                // the issuer may have dropped its handle; that is fine
                let _ = queued.done.send(result);
            }
        });
        Self { ops }
    }

    /// Append `op` to the queue.
    ///
    /// `op` runs only after every previously enqueued operation has finished
    /// (successfully or not) and before any later one begins. The returned
    /// handle resolves when this specific operation is done; the caller
    /// never waits for the whole queue.
    pub fn enqueue<F>(&self, op: F) -> Completion
    where
        F: Future<Output = Result<(), TransportError>> + Send + 'static,
    {
        let (done, handle) = oneshot::channel();
        let queued = QueuedOp {
            op: Box::pin(op),
            done,
        };
        if self.ops.send(queued).is_err() {
            return Completion::failed(SendTaskError::Abandoned);
        }
        Completion::pending(handle)
    }
}

impl Default for SendQueue {
    fn default() -> Self { Self::new() }
}

enum CompletionState {
    Ready(Option<Result<(), SendTaskError>>),
    Pending(oneshot::Receiver<Result<(), SendTaskError>>),
}

/// Handle resolving when one queued operation has finished.
///
/// Awaiting is optional; an unobserved failure has already been logged by
/// the worker.
#[must_use = "await the completion to observe the operation's outcome"]
pub struct Completion {
    state: CompletionState,
}

impl Completion {
    /// A handle for an operation that was skipped as a no-op.
    pub(crate) fn ready() -> Self {
        Self {
            state: CompletionState::Ready(Some(Ok(()))),
        }
    }

    pub(crate) fn failed(error: SendTaskError) -> Self {
        Self {
            state: CompletionState::Ready(Some(Err(error))),
        }
    }

    fn pending(handle: oneshot::Receiver<Result<(), SendTaskError>>) -> Self {
        Self {
            state: CompletionState::Pending(handle),
        }
    }
}

impl Future for Completion {
    type Output = Result<(), SendTaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            // polled again after resolving; there is nothing further to report
            CompletionState::Ready(slot) => slot.take().map_or(Poll::Pending, Poll::Ready),
            CompletionState::Pending(handle) => {
                let received = futures::ready!(Pin::new(handle).poll(cx));
                Poll::Ready(received.unwrap_or(Err(SendTaskError::Abandoned)))
            }
        }
    }
}
