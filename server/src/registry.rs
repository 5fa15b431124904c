//! Live connection bookkeeping for the relay
//!
//! The registry is the only mutable state shared between the session
//! controller and the dispatcher. It answers three questions:
//! - Who is connected right now (snapshot for fan-out)
//! - How many are connected (the presence count sent to clients)
//! - Whether a given connection is still a member
//!
//! Membership is best effort: a connection whose peer just vanished stays
//! listed until its close event is processed or a write to it fails.

use crate::connection::{Connection, ConnectionId};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry shared between the session controller and the dispatcher.
///
/// All mutations take the write lock and snapshots take the read lock, so a
/// snapshot never observes a half-applied add or remove.
pub type SharedRegistry = Arc<RwLock<ConnectionRegistry>>;

/// Set of live connections keyed by their id
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Arc<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    /// Adds a connection. Returns false, leaving the registry unchanged, if
    /// a connection with the same id is already a member.
    pub fn add(&mut self, connection: Arc<Connection>) -> bool {
        if self.connections.contains_key(&connection.id) {
            return false;
        }

        debug!(
            "Registered connection {} from {}",
            connection.id, connection.addr
        );
        self.connections.insert(connection.id, connection);
        true
    }

    /// Removes a connection. Returns true if it was a member; removing an
    /// absent connection is a no-op, since close and error paths may both
    /// try to remove the same connection.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_some() {
            debug!("Unregistered connection {}", id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections.get(&id).cloned()
    }

    /// Returns the number of registered connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Copies the current members, ordered by id, for iteration outside the
    /// lock.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        let mut members: Vec<Arc<Connection>> = self.connections.values().cloned().collect();
        members.sort_by_key(|connection| connection.id);
        members
    }
}
