#![doc(html_root_url = "https://docs.rs/wsframe/latest")]
//! Public API for the `wsframe` library.
//!
//! This crate turns a raw, possibly-fragmented duplex WebSocket stream into
//! complete typed messages and serializes all outbound writes onto the same
//! socket. It provides the frame reassembler, the ordered send queue, the
//! buffer pool, and the connection lifecycle controller; the HTTP upgrade
//! and any higher-level routing protocol belong to the hosting layer.

pub mod buffer_pool;
pub mod config;
pub mod connection;
pub mod frame;
pub mod handler;
pub mod message;
pub mod message_buffer;
pub mod reader;
pub mod send_queue;
pub mod socket;

pub use buffer_pool::{BufferPool, PooledSegment};
pub use config::ConnectionConfig;
pub use connection::{Connection, ConnectionError, FatalClassifier, LifecycleState};
pub use frame::{CloseReason, FrameKind, ReceiveOutcome};
pub use handler::{ConnectionHandler, NoopHandler};
pub use message::Message;
pub use message_buffer::{MessageBuffer, MessageBufferFull};
pub use reader::{ReadError, read_message};
pub use send_queue::{Completion, SendQueue, SendTaskError};
pub use socket::{DuplexSocket, SocketState, TransportError};
