//! Application-facing connection events.
//!
//! One [`ConnectionHandler`] implementation receives every event of one
//! connection, replacing a bag of independently settable callbacks with a
//! single capability: a partially wired handler cannot exist. Every
//! operation defaults to a no-op, so embedders implement only what they
//! care about. All callbacks run synchronously on the connection's own
//! task, in event order.

use crate::connection::ConnectionError;

/// Events delivered by a [`Connection`](crate::connection::Connection).
pub trait ConnectionHandler {
    /// The connection is open; fired once before the first message.
    fn on_open(&mut self) {}

    /// A complete text message arrived.
    fn on_message_text(&mut self, text: String) { let _ = text; }

    /// A complete binary message arrived.
    fn on_message_binary(&mut self, payload: Vec<u8>) { let _ = payload; }

    /// A fatal condition terminated the connection. Fired at most once,
    /// always before [`on_close`](Self::on_close); benign disconnects skip
    /// it entirely.
    fn on_error(&mut self, error: &ConnectionError) { let _ = error; }

    /// The connection reached its terminal state. Fired exactly once on
    /// every path, fatal or clean, as the very last event.
    fn on_close(&mut self) {}
}

/// Handler that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHandler;

impl ConnectionHandler for NoopHandler {}
