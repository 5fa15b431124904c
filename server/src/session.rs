//! Per-connection protocol state machine
//!
//! Every transport event for every connection passes through
//! [`SessionController::handle_event`], one at a time, from the server's
//! dispatch loop. The controller updates the registry and decides who
//! receives what:
//!
//! | Event                            | Registry        | Fan-out                                      |
//! |----------------------------------|-----------------|----------------------------------------------|
//! | connect                          | add             | `userCount` to newcomer, join to the others  |
//! | `userConnection` / `disconnect`  | remove          | `userCount` to the remaining members         |
//! | `clear`                          | -               | relayed to everyone, sender included         |
//! | `draw` and any other type        | -               | relayed to everyone except the sender        |
//! | close / transport error          | remove          | leave notification and `userCount`           |
//!
//! Counts are always read back from the registry after it changed.

use crate::config::RelayConfig;
use crate::connection::{Connection, ConnectionState};
use crate::dispatcher::Dispatcher;
use crate::error::TransportError;
use crate::network::TransportEvent;
use crate::registry::SharedRegistry;
use log::{debug, info, warn};
use shared::{Message, MessageKind, UserAction};
use std::sync::Arc;

/// Drives connections through `Connecting -> Open -> Closed`
#[derive(Debug, Clone)]
pub struct SessionController {
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    config: RelayConfig,
}

impl SessionController {
    pub fn new(registry: SharedRegistry, config: RelayConfig) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        Self {
            registry,
            dispatcher,
            config,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected { connection } => self.on_connect(connection).await,
            TransportEvent::Frame {
                connection,
                payload,
            } => self.on_message(&connection, &payload).await,
            TransportEvent::Closed { connection } => self.on_close(&connection).await,
            TransportEvent::Errored { connection, error } => {
                self.on_error(&connection, &error).await
            }
        }
    }

    /// Admits a freshly upgraded connection and announces it.
    pub async fn on_connect(&self, connection: Arc<Connection>) {
        let count = {
            let mut registry = self.registry.write().await;

            if self.config.at_capacity(registry.count()) {
                warn!(
                    "Rejecting connection {} from {}: server full ({} connections)",
                    connection.id,
                    connection.addr,
                    registry.count()
                );
                connection.reject("Server full");
                return;
            }

            if !connection.open() {
                debug!(
                    "Connection {} is {:?}, not opening",
                    connection.id,
                    connection.state()
                );
                return;
            }

            registry.add(Arc::clone(&connection));
            registry.count()
        };

        info!(
            "Connection {} opened from {} ({} connected)",
            connection.id, connection.addr, count
        );

        // Failure already evicted the newcomer; the others still hear about the join
        let _ = self
            .dispatcher
            .send_to(&connection, &Message::user_count(count))
            .await;
        self.dispatcher
            .broadcast(&Message::joined(count), Some(connection.id))
            .await;
    }

    /// Routes one inbound frame by its message type.
    pub async fn on_message(&self, connection: &Arc<Connection>, payload: &[u8]) {
        if !connection.is_open() {
            debug!(
                "Ignoring frame from connection {} in state {:?}",
                connection.id,
                connection.state()
            );
            return;
        }

        let message = match Message::decode(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Dropping undecodable message from connection {}: {}",
                    connection.id, e
                );
                return;
            }
        };

        match message.kind() {
            MessageKind::UserConnection(UserAction::Disconnect) => {
                let count = {
                    let mut registry = self.registry.write().await;
                    registry.remove(connection.id);
                    registry.count()
                };
                info!(
                    "Connection {} announced disconnect ({} connected)",
                    connection.id, count
                );
                self.dispatcher
                    .broadcast(&Message::user_count(count), None)
                    .await;
            }
            MessageKind::UserConnection(UserAction::Other(action)) => {
                debug!(
                    "Ignoring userConnection action {:?} from connection {}",
                    action, connection.id
                );
            }
            MessageKind::Clear => {
                self.dispatcher.broadcast(&message, None).await;
            }
            MessageKind::Draw => {
                self.dispatcher
                    .broadcast(&message, Some(connection.id))
                    .await;
            }
            _ => {
                self.dispatcher
                    .broadcast(&message, Some(connection.id))
                    .await;
            }
        }
    }

    /// Handles the end of a connection, whoever closed it.
    pub async fn on_close(&self, connection: &Arc<Connection>) {
        if connection.mark_closed() == ConnectionState::Closed {
            debug!("Connection {} already closed", connection.id);
            return;
        }

        let count = {
            let mut registry = self.registry.write().await;
            registry.remove(connection.id);
            registry.count()
        };

        info!(
            "Connection {} closed after {:?} ({} connected)",
            connection.id,
            connection.connected_at.elapsed(),
            count
        );

        self.dispatcher.broadcast(&Message::left(count), None).await;
        self.dispatcher
            .broadcast(&Message::user_count(count), None)
            .await;
    }

    /// A socket fault ends the connection exactly like a close.
    pub async fn on_error(&self, connection: &Arc<Connection>, error: &TransportError) {
        if connection.state() != ConnectionState::Closed {
            warn!("Transport error on connection {}: {}", connection.id, error);
        }
        self.on_close(connection).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionId;
    use crate::registry::ConnectionRegistry;
    use shared::{JOIN_NOTIFICATION, LEAVE_NOTIFICATION};
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    struct Peer {
        connection: Arc<Connection>,
        rx: mpsc::Receiver<WsMessage>,
    }

    impl Peer {
        fn new(id: ConnectionId) -> Self {
            let addr: SocketAddr = format!("127.0.0.1:{}", 9000 + id).parse().unwrap();
            let (tx, rx) = mpsc::channel(16);
            Self {
                connection: Arc::new(Connection::new(id, addr, tx)),
                rx,
            }
        }

        fn received(&mut self) -> Vec<Message> {
            let mut messages = Vec::new();
            while let Ok(frame) = self.rx.try_recv() {
                if let WsMessage::Text(text) = frame {
                    messages.push(Message::decode(text.as_bytes()).unwrap());
                }
            }
            messages
        }
    }

    fn controller() -> (SharedRegistry, SessionController) {
        controller_with(RelayConfig::default())
    }

    fn controller_with(config: RelayConfig) -> (SharedRegistry, SessionController) {
        let registry = ConnectionRegistry::shared();
        let session = SessionController::new(Arc::clone(&registry), config);
        (registry, session)
    }

    async fn connect_all(session: &SessionController, peers: &mut [&mut Peer]) {
        for peer in peers.iter() {
            session.on_connect(Arc::clone(&peer.connection)).await;
        }
        for peer in peers.iter_mut() {
            peer.received();
        }
    }

    #[tokio::test]
    async fn test_connect_greets_and_announces() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);

        session.on_connect(Arc::clone(&a.connection)).await;
        assert_eq!(a.received(), vec![Message::user_count(1)]);

        session.on_connect(Arc::clone(&b.connection)).await;
        assert_eq!(b.received(), vec![Message::user_count(2)]);
        assert_eq!(a.received(), vec![Message::joined(2)]);

        assert!(a.connection.is_open());
        assert_eq!(registry.read().await.count(), 2);
    }

    #[tokio::test]
    async fn test_draw_skips_sender() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        let mut c = Peer::new(3);
        connect_all(&session, &mut [&mut a, &mut b, &mut c]).await;

        session
            .on_message(&a.connection, br#"{"type":"draw","x":1}"#)
            .await;

        let expected = Message::decode(br#"{"type":"draw","x":1}"#).unwrap();
        assert!(a.received().is_empty());
        assert_eq!(b.received(), vec![expected.clone()]);
        assert_eq!(c.received(), vec![expected]);
    }

    #[tokio::test]
    async fn test_clear_reaches_sender() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session.on_message(&a.connection, br#"{"type":"clear"}"#).await;

        assert_eq!(a.received(), vec![Message::clear()]);
        assert_eq!(b.received(), vec![Message::clear()]);
    }

    #[tokio::test]
    async fn test_unknown_type_skips_sender() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        let raw = br#"{"type":"cursor","x":0.1,"y":0.9,"who":"a"}"#;
        session.on_message(&a.connection, raw).await;

        assert!(a.received().is_empty());
        let received = b.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].as_str().as_bytes(), raw);
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        connect_all(&session, &mut [&mut a]).await;

        session.on_message(&a.connection, b"{not json").await;
        session.on_message(&a.connection, br#"{"no_type":true}"#).await;

        assert!(a.received().is_empty());
        assert!(a.connection.is_open());
        assert_eq!(registry.read().await.count(), 1);
    }

    #[tokio::test]
    async fn test_close_announces_leave() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session.on_close(&a.connection).await;

        let received = b.received();
        assert_eq!(received.len(), 2);
        let notification = received[0].as_notification().unwrap();
        assert_eq!(notification.message, LEAVE_NOTIFICATION);
        assert_eq!(notification.user_count, 1);
        assert_eq!(received[1].count(), Some(1));

        assert_eq!(a.connection.state(), ConnectionState::Closed);
        assert!(a.received().is_empty());
        assert_eq!(registry.read().await.count(), 1);
    }

    #[tokio::test]
    async fn test_second_close_is_ignored() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session.on_close(&a.connection).await;
        b.received();
        session.on_close(&a.connection).await;

        assert!(b.received().is_empty());
    }

    #[tokio::test]
    async fn test_error_behaves_like_close() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        let error = TransportError::WriteTimeout(Duration::from_secs(5));
        session.on_error(&b.connection, &error).await;

        let received = a.received();
        assert_eq!(received.last().and_then(|m| m.count()), Some(1));
        assert_eq!(registry.read().await.count(), 1);
        assert_eq!(b.connection.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_disconnect_message_updates_count() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session
            .on_message(&a.connection, br#"{"type":"userConnection","action":"disconnect"}"#)
            .await;

        assert_eq!(b.received(), vec![Message::user_count(1)]);
        assert!(a.received().is_empty());
        assert!(a.connection.is_open());
        assert!(!registry.read().await.contains(1));
    }

    #[tokio::test]
    async fn test_disconnect_then_close_keeps_count_correct() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session
            .on_message(&a.connection, br#"{"type":"userConnection","action":"disconnect"}"#)
            .await;
        session.on_close(&a.connection).await;

        // Both presence updates reach B, each with the post-removal count
        let received = b.received();
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].count(), Some(1));
        assert_eq!(received[1].as_notification().unwrap().user_count, 1);
        assert_eq!(received[2].count(), Some(1));
    }

    #[tokio::test]
    async fn test_other_user_connection_action_is_ignored() {
        let (registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session
            .on_message(&a.connection, br#"{"type":"userConnection","action":"wave"}"#)
            .await;

        assert!(b.received().is_empty());
        assert_eq!(registry.read().await.count(), 2);
    }

    #[tokio::test]
    async fn test_frames_after_close_are_ignored() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session.on_close(&a.connection).await;
        b.received();
        session.on_message(&a.connection, br#"{"type":"clear"}"#).await;

        assert!(b.received().is_empty());
    }

    #[tokio::test]
    async fn test_capacity_rejects_without_announcing() {
        let config = RelayConfig {
            max_connections: 1,
            ..RelayConfig::default()
        };
        let (registry, session) = controller_with(config);
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        connect_all(&session, &mut [&mut a]).await;

        session.on_connect(Arc::clone(&b.connection)).await;

        assert_eq!(b.connection.state(), ConnectionState::Closed);
        assert!(matches!(b.rx.try_recv(), Ok(WsMessage::Close(Some(_)))));
        assert!(a.received().is_empty());
        assert_eq!(registry.read().await.count(), 1);

        // The rejected connection's close event must not announce a leave
        session.on_close(&b.connection).await;
        assert!(a.received().is_empty());
    }

    #[tokio::test]
    async fn test_join_notification_carries_count() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);
        let mut c = Peer::new(3);
        connect_all(&session, &mut [&mut a, &mut b]).await;

        session.on_connect(Arc::clone(&c.connection)).await;

        for peer in [&mut a, &mut b] {
            let received = peer.received();
            let notification = received[0].as_notification().unwrap();
            assert_eq!(notification.message, JOIN_NOTIFICATION);
            assert_eq!(notification.user_count, 3);
        }
        assert_eq!(c.received(), vec![Message::user_count(3)]);
    }

    #[tokio::test]
    async fn test_handle_event_routes_frames() {
        let (_registry, session) = controller();
        let mut a = Peer::new(1);
        let mut b = Peer::new(2);

        session
            .handle_event(TransportEvent::Connected {
                connection: Arc::clone(&a.connection),
            })
            .await;
        session
            .handle_event(TransportEvent::Connected {
                connection: Arc::clone(&b.connection),
            })
            .await;
        a.received();
        b.received();

        session
            .handle_event(TransportEvent::Frame {
                connection: Arc::clone(&b.connection),
                payload: br#"{"type":"draw","x":2}"#.to_vec(),
            })
            .await;

        assert_eq!(a.received().len(), 1);
        assert!(b.received().is_empty());
    }
}
