//! Error types for the relay server

use std::io;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// A write to one peer that could not be queued.
///
/// Always contained to the connection it happened on: the dispatcher evicts
/// that connection and carries on with the rest of the fan-out.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,
    #[error("outbound queue is full")]
    QueueFull,
    #[error("outbound queue is closed")]
    QueueClosed,
}

/// A fault reported by the socket of one connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("write timed out after {0:?}")]
    WriteTimeout(std::time::Duration),
}

/// Failures that stop the server itself.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("listener error: {0}")]
    Io(#[from] io::Error),
}
