//! Server-side handle for one live WebSocket session

use crate::error::SendError;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;

pub type ConnectionId = u32;

/// Transport state of a connection.
///
/// Transitions only move forward: `Connecting -> Open -> Closing -> Closed`,
/// with `Closing` skipped when the peer closes first. A closed connection is
/// never reopened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// One connected client
///
/// Each connection owns:
/// - Its identity and peer address
/// - Its transport state, observable by the reader and writer tasks
/// - The sending half of a bounded outbound queue drained by its writer task
#[derive(Debug)]
pub struct Connection {
    /// Unique identifier assigned when the TCP connection was accepted
    pub id: ConnectionId,
    /// Peer address, used for logging only
    pub addr: SocketAddr,
    /// When the handshake completed
    pub connected_at: Instant,
    state: watch::Sender<ConnectionState>,
    sender: mpsc::Sender<WsMessage>,
}

impl Connection {
    /// Creates a connection in the `Connecting` state.
    pub fn new(id: ConnectionId, addr: SocketAddr, sender: mpsc::Sender<WsMessage>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Connecting);
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            state,
            sender,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Watches state changes, so I/O tasks can stop once the server gives
    /// up on the connection.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Moves a `Connecting` connection to `Open`. Returns false for any
    /// other starting state.
    pub fn open(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        })
    }

    /// Starts a server-initiated close: the connection stops accepting
    /// writes and a close frame is queued behind any pending frames.
    pub fn close(&self, code: CloseCode, reason: &'static str) {
        let changed = self.state.send_if_modified(|state| match state {
            ConnectionState::Connecting | ConnectionState::Open => {
                *state = ConnectionState::Closing;
                true
            }
            _ => false,
        });

        if changed {
            self.queue_close_frame(code, reason);
        }
    }

    /// Turns away a connection that was never opened.
    pub fn reject(&self, reason: &'static str) {
        if self.state() == ConnectionState::Connecting {
            self.queue_close_frame(CloseCode::Again, reason);
            self.state.send_replace(ConnectionState::Closed);
        }
    }

    /// Marks the connection terminally closed and returns the state it was
    /// in before. Calling it again returns `Closed`.
    pub fn mark_closed(&self) -> ConnectionState {
        self.state.send_replace(ConnectionState::Closed)
    }

    /// Queues a frame for the writer task without waiting.
    ///
    /// A full queue means the peer is not keeping up; the caller treats
    /// that the same as a dead peer.
    pub fn send(&self, frame: WsMessage) -> Result<(), SendError> {
        if !self.is_open() {
            return Err(SendError::NotOpen);
        }

        self.sender.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::QueueClosed,
        })
    }

    fn queue_close_frame(&self, code: CloseCode, reason: &'static str) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        // The writer also sends a close frame when it shuts down, so a full
        // queue here is harmless.
        let _ = self.sender.try_send(WsMessage::Close(Some(frame)));
    }
}
