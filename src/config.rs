//! Per-connection configuration, fixed at construction.

use std::{num::NonZeroUsize, time::Duration};

/// Default receive segment size. Most messages are very short, so fragments
/// are read through small pooled buffers.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 2 * 1024;

/// Default grace period granted to the outbound close frame before the
/// connection is abandoned.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_millis(250);

/// Settings governing one connection's receive and close behaviour.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionConfig {
    /// Hard cap on a reassembled incoming message; unbounded when `None`.
    pub max_message_size: Option<NonZeroUsize>,
    /// Size of the pooled segment used for each physical receive.
    pub read_buffer_size: usize,
    /// How long a queued close-output may take before the close handshake
    /// gives up on it.
    pub close_grace: Duration,
}

impl ConnectionConfig {
    /// Cap incoming messages at `limit` bytes.
    #[must_use]
    pub const fn with_max_message_size(mut self, limit: NonZeroUsize) -> Self {
        self.max_message_size = Some(limit);
        self
    }

    /// Use `size`-byte receive segments.
    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Grant the outbound close frame `grace` to flush.
    #[must_use]
    pub const fn with_close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = grace;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_message_size: None,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}
