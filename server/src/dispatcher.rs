//! Fan-out of one message to many connections

use crate::connection::{Connection, ConnectionId};
use crate::error::SendError;
use crate::registry::SharedRegistry;
use log::{debug, warn};
use shared::Message;
use std::sync::Arc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Outcome of one broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the frame was queued for
    pub delivered: usize,
    /// Connections skipped because they were no longer open
    pub skipped: usize,
    /// Connections evicted because their queue rejected the frame
    pub failed: Vec<ConnectionId>,
}

/// Delivers encoded messages to registry members.
///
/// A write failure on one connection never stops delivery to the others:
/// the failing connection is evicted from the registry and closed, and its
/// close event later runs the normal leave path.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: SharedRegistry,
}

impl Dispatcher {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Sends `message` to every open member except `exclude`.
    pub async fn broadcast(&self, message: &Message, exclude: Option<ConnectionId>) -> BroadcastReport {
        let encoded = message.encode();
        let targets = {
            let registry = self.registry.read().await;
            registry.snapshot()
        };

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();

        for connection in targets {
            if Some(connection.id) == exclude {
                continue;
            }

            if !connection.is_open() {
                debug!(
                    "Skipping connection {} in state {:?}",
                    connection.id,
                    connection.state()
                );
                report.skipped += 1;
                continue;
            }

            match connection.send(WsMessage::Text(encoded.clone())) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to send to connection {}: {}", connection.id, e);
                    failed.push(connection);
                }
            }
        }

        if !failed.is_empty() {
            report.failed = failed.iter().map(|c| c.id).collect();
            self.evict(&failed).await;
        }

        debug!(
            "Broadcast {} to {} connections ({} skipped, {} failed)",
            message.kind().as_str(),
            report.delivered,
            report.skipped,
            report.failed.len()
        );

        report
    }

    /// Sends `message` to a single connection, outside any broadcast.
    pub async fn send_to(
        &self,
        connection: &Arc<Connection>,
        message: &Message,
    ) -> Result<(), SendError> {
        let result = connection.send(WsMessage::Text(message.encode()));
        if let Err(e) = result {
            warn!("Failed to send to connection {}: {}", connection.id, e);
            if e != SendError::NotOpen {
                self.evict(std::slice::from_ref(connection)).await;
            }
        }
        result
    }

    async fn evict(&self, connections: &[Arc<Connection>]) {
        {
            let mut registry = self.registry.write().await;
            for connection in connections {
                registry.remove(connection.id);
            }
        }

        for connection in connections {
            connection.close(CloseCode::Again, "Send failed");
        }
    }
}
