//! Shared utilities for integration tests.
//!
//! Provides [`ScriptedSocket`], a fake duplex socket fed a script of receive
//! outcomes that records every write in call order, and
//! [`RecordingHandler`], which captures connection events for assertions.

// Items in this shared module may not be used by all test binaries that import it.
#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use std::{
    collections::VecDeque,
    sync::Mutex,
    time::Duration,
};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use wsframe::{
    CloseReason,
    ConnectionError,
    ConnectionHandler,
    DuplexSocket,
    FrameKind,
    ReceiveOutcome,
    SocketState,
    TransportError,
};

/// One scripted receive outcome.
pub enum ScriptStep {
    /// Deliver a data fragment.
    Read {
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    },
    /// Deliver the peer's close frame (and move to `CloseReceived`).
    CloseFrame,
    /// Fail the receive with the given error.
    Fail(TransportError),
}

/// Behaviour of one `send` call, in submission order.
pub struct SendPlan {
    pub delay: Duration,
    pub fail: bool,
}

/// Behaviour of the next `close_output` call.
pub struct ClosePlan {
    pub delay: Duration,
    pub fail: bool,
}

/// A write observed on the socket, in execution order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteRecord {
    Frame {
        payload: Vec<u8>,
        kind: FrameKind,
        is_final: bool,
    },
    Close(CloseReason),
}

/// Scripted fake socket: receives come from the script, writes are recorded.
///
/// When the script runs dry, a receive parks until the cancellation signal
/// fires, like a real socket with no inbound traffic.
#[derive(Default)]
pub struct ScriptedSocket {
    script: Mutex<VecDeque<ScriptStep>>,
    writes: Mutex<Vec<WriteRecord>>,
    state: Mutex<Option<SocketState>>,
    send_plans: Mutex<VecDeque<SendPlan>>,
    close_plan: Mutex<Option<ClosePlan>>,
}

impl ScriptedSocket {
    pub fn open() -> Self {
        let socket = Self::default();
        socket.set_state(SocketState::Open);
        socket
    }

    pub fn set_state(&self, state: SocketState) {
        *self.state.lock().unwrap() = Some(state);
    }

    /// Append one raw receive outcome.
    pub fn push_read(&self, payload: &[u8], kind: FrameKind, is_final: bool) {
        self.script.lock().unwrap().push_back(ScriptStep::Read {
            payload: payload.to_vec(),
            kind,
            is_final,
        });
    }

    /// Append a complete single-fragment message: the empty probe read
    /// followed by the final fragment.
    pub fn push_message(&self, payload: &[u8], kind: FrameKind) {
        self.push_read(&[], kind, false);
        self.push_read(payload, kind, true);
    }

    pub fn push_close_frame(&self) {
        self.script.lock().unwrap().push_back(ScriptStep::CloseFrame);
    }

    pub fn push_failure(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(ScriptStep::Fail(error));
    }

    /// Plan the behaviour of the next `send`, in submission order.
    pub fn plan_send(&self, delay: Duration, fail: bool) {
        self.send_plans
            .lock()
            .unwrap()
            .push_back(SendPlan { delay, fail });
    }

    /// Plan the behaviour of the next `close_output`.
    pub fn plan_close(&self, delay: Duration, fail: bool) {
        *self.close_plan.lock().unwrap() = Some(ClosePlan { delay, fail });
    }

    /// Snapshot of the writes applied so far, in execution order.
    pub fn writes(&self) -> Vec<WriteRecord> { self.writes.lock().unwrap().clone() }

    /// Number of close-output attempts that reached the socket.
    pub fn close_attempts(&self) -> usize {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|write| matches!(write, WriteRecord::Close(_)))
            .count()
    }
}

#[async_trait]
impl DuplexSocket for ScriptedSocket {
    async fn receive(
        &self,
        buffer: &mut [u8],
        cancel: &CancellationToken,
    ) -> Result<ReceiveOutcome, TransportError> {
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(ScriptStep::Read {
                payload,
                kind,
                is_final,
            }) => {
                if !payload.is_empty() {
                    assert!(
                        payload.len() <= buffer.len(),
                        "script fragment larger than the receive buffer"
                    );
                    buffer[..payload.len()].copy_from_slice(&payload);
                }
                Ok(ReceiveOutcome::data(kind, payload.len(), is_final))
            }
            Some(ScriptStep::CloseFrame) => {
                self.set_state(SocketState::CloseReceived);
                Ok(ReceiveOutcome::close())
            }
            Some(ScriptStep::Fail(error)) => Err(error),
            None => {
                cancel.cancelled().await;
                Err(TransportError::Cancelled)
            }
        }
    }

    async fn send(
        &self,
        payload: &[u8],
        kind: FrameKind,
        is_final: bool,
    ) -> Result<(), TransportError> {
        let plan = self.send_plans.lock().unwrap().pop_front();
        if let Some(plan) = plan {
            tokio::time::sleep(plan.delay).await;
            if plan.fail {
                return Err(TransportError::Io(std::io::Error::other("planned send failure")));
            }
        }
        self.writes.lock().unwrap().push(WriteRecord::Frame {
            payload: payload.to_vec(),
            kind,
            is_final,
        });
        Ok(())
    }

    async fn close_output(&self, reason: CloseReason) -> Result<(), TransportError> {
        // record the attempt up front so a slow close is still observable
        self.writes.lock().unwrap().push(WriteRecord::Close(reason));
        let plan = self.close_plan.lock().unwrap().take();
        if let Some(plan) = plan {
            tokio::time::sleep(plan.delay).await;
            if plan.fail {
                return Err(TransportError::Io(std::io::Error::other(
                    "planned close failure",
                )));
            }
        }
        self.set_state(SocketState::CloseSent);
        Ok(())
    }

    fn state(&self) -> SocketState {
        self.state.lock().unwrap().unwrap_or(SocketState::Connecting)
    }
}

/// Connection event captured by [`RecordingHandler`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    Open,
    Text(String),
    Binary(Vec<u8>),
    Error(String),
    Close,
}

/// Handler that appends every event to a list for later assertions.
#[derive(Default)]
pub struct RecordingHandler {
    pub events: Vec<Event>,
}

impl RecordingHandler {
    pub fn closes(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Close))
            .count()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Error(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

impl ConnectionHandler for RecordingHandler {
    fn on_open(&mut self) { self.events.push(Event::Open); }

    fn on_message_text(&mut self, text: String) { self.events.push(Event::Text(text)); }

    fn on_message_binary(&mut self, payload: Vec<u8>) { self.events.push(Event::Binary(payload)); }

    fn on_error(&mut self, error: &ConnectionError) {
        self.events.push(Event::Error(error.to_string()));
    }

    fn on_close(&mut self) { self.events.push(Event::Close); }
}
