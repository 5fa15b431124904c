//! Server network layer: WebSocket accept loop, per-connection I/O tasks and
//! the dispatch loop that feeds the session controller

use crate::config::RelayConfig;
use crate::connection::{Connection, ConnectionId, ConnectionState};
use crate::error::{ServerError, TransportError};
use crate::registry::{ConnectionRegistry, SharedRegistry};
use crate::session::SessionController;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async_with_config, WebSocketStream};

type WsStream = WebSocketStream<TcpStream>;

/// Transport events sent from connection tasks to the dispatch loop
#[derive(Debug)]
pub enum TransportEvent {
    Connected {
        connection: Arc<Connection>,
    },
    Frame {
        connection: Arc<Connection>,
        payload: Vec<u8>,
    },
    Closed {
        connection: Arc<Connection>,
    },
    Errored {
        connection: Arc<Connection>,
        error: TransportError,
    },
}

/// Relay server coordinating the listener and the session controller
pub struct Server {
    listener: Arc<TcpListener>,
    config: RelayConfig,
    registry: SharedRegistry,
    session: SessionController,

    event_tx: mpsc::UnboundedSender<TransportEvent>,
    event_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

impl Server {
    pub async fn bind(config: RelayConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr.clone(),
                source,
            })?;
        info!("Server listening on {}", listener.local_addr()?);

        let registry = ConnectionRegistry::shared();
        let session = SessionController::new(Arc::clone(&registry), config.clone());
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Arc::new(listener),
            config,
            registry,
            session,
            event_tx,
            event_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Spawns task that accepts TCP connections and upgrades them
    fn spawn_acceptor(&self) {
        let listener = Arc::clone(&self.listener);
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut next_connection_id: ConnectionId = 1;

            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let id = next_connection_id;
                        next_connection_id = next_connection_id.wrapping_add(1).max(1);

                        debug!("Accepted TCP connection {} from {}", id, addr);
                        tokio::spawn(handle_socket(
                            stream,
                            addr,
                            id,
                            config.clone(),
                            event_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Main server loop: processes transport events one at a time
    pub async fn run(mut self) -> Result<(), ServerError> {
        self.spawn_acceptor();
        info!("Server started successfully");

        while let Some(event) = self.event_rx.recv().await {
            self.session.handle_event(event).await;
        }

        info!("Server shutting down");
        Ok(())
    }
}

/// Completes the handshake, then runs the connection's reader inline and
/// its writer as a separate task.
async fn handle_socket(
    stream: TcpStream,
    addr: SocketAddr,
    id: ConnectionId,
    config: RelayConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(config.max_message_size);
    ws_config.max_frame_size = Some(config.max_message_size);

    let ws_stream =
        match timeout(config.write_timeout, accept_async_with_config(stream, Some(ws_config))).await
        {
            Ok(Ok(ws_stream)) => ws_stream,
            Ok(Err(e)) => {
                warn!("WebSocket handshake with {} failed: {}", addr, e);
                return;
            }
            Err(_) => {
                warn!("WebSocket handshake with {} timed out", addr);
                return;
            }
        };

    let (sink, stream) = ws_stream.split();
    let (frame_tx, frame_rx) = mpsc::channel(config.queue_capacity.max(1));
    let connection = Arc::new(Connection::new(id, addr, frame_tx));
    // Subscribe before the session sees the connection so no transition is missed
    let reader_state = connection.subscribe();
    let writer_state = connection.subscribe();

    if events
        .send(TransportEvent::Connected {
            connection: Arc::clone(&connection),
        })
        .is_err()
    {
        return;
    }

    tokio::spawn(run_writer(
        Arc::clone(&connection),
        sink,
        frame_rx,
        writer_state,
        config.write_timeout,
        events.clone(),
    ));

    run_reader(connection, stream, reader_state, events).await;
}

/// Forwards inbound frames until the peer goes away or the server closes
/// the connection, then reports exactly one terminal event.
async fn run_reader(
    connection: Arc<Connection>,
    mut stream: SplitStream<WsStream>,
    mut state_rx: watch::Receiver<ConnectionState>,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let outcome: Option<TransportError> = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    let event = TransportEvent::Frame {
                        connection: Arc::clone(&connection),
                        payload: text.into_bytes(),
                    };
                    if events.send(event).is_err() {
                        break None;
                    }
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    let event = TransportEvent::Frame {
                        connection: Arc::clone(&connection),
                        payload: data,
                    };
                    if events.send(event).is_err() {
                        break None;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("Connection {} sent close frame {:?}", connection.id, frame);
                    break None;
                }
                // Ping/pong are answered by the protocol layer
                Some(Ok(_)) => {}
                Some(Err(e)) => break Some(TransportError::from(e)),
                None => break None,
            },

            changed = state_rx.changed() => {
                let state = *state_rx.borrow();
                if changed.is_err() || !matches!(state, ConnectionState::Connecting | ConnectionState::Open) {
                    debug!("Connection {} stopped reading in state {:?}", connection.id, state);
                    break None;
                }
            },
        }
    };

    let event = match outcome {
        Some(error) => TransportEvent::Errored { connection, error },
        None => TransportEvent::Closed { connection },
    };
    let _ = events.send(event);
}

/// Drains the outbound queue into the socket. Each write is bounded by
/// `write_timeout`; a failed or slow write ends the connection.
async fn run_writer(
    connection: Arc<Connection>,
    mut sink: SplitSink<WsStream, WsMessage>,
    mut frames: mpsc::Receiver<WsMessage>,
    mut state_rx: watch::Receiver<ConnectionState>,
    write_timeout: Duration,
    events: mpsc::UnboundedSender<TransportEvent>,
) {
    let id = connection.id;
    // The queue only closes once every strong handle is gone
    let connection: Weak<Connection> = {
        let weak = Arc::downgrade(&connection);
        drop(connection);
        weak
    };

    loop {
        let frame = tokio::select! {
            biased;

            frame = frames.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() || *state_rx.borrow() == ConnectionState::Closed {
                    break;
                }
                continue;
            },
        };

        let is_close = matches!(frame, WsMessage::Close(_));
        let failure = match timeout(write_timeout, sink.send(frame)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(TransportError::from(e)),
            Err(_) => Some(TransportError::WriteTimeout(write_timeout)),
        };

        if let Some(error) = failure {
            if let Some(connection) = connection.upgrade() {
                if connection.state() != ConnectionState::Closed {
                    let _ = events.send(TransportEvent::Errored { connection, error });
                }
            }
            return;
        }

        if is_close {
            break;
        }
    }

    let _ = timeout(write_timeout, sink.close()).await;
    debug!("Writer for connection {} finished", id);
}
