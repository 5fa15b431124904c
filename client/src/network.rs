//! Relay connection running on its own tokio runtime thread.
//!
//! The macroquad render loop is single-threaded and not async, so the
//! WebSocket lives on a background thread and talks to the render loop
//! through channels: outgoing messages in, `NetworkEvent`s out.

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::Message;
use std::sync::mpsc as std_mpsc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Commands from the render loop to the network thread
#[derive(Debug)]
pub enum Outgoing {
    Send(Message),
    Shutdown,
}

/// Events from the network thread to the render loop
#[derive(Debug)]
pub enum NetworkEvent {
    Connected,
    Message(Message),
    Disconnected(String),
}

pub struct NetworkHandle {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    incoming: std_mpsc::Receiver<NetworkEvent>,
    thread: Option<JoinHandle<()>>,
}

impl NetworkHandle {
    /// Starts connecting to `url` in the background
    pub fn spawn(url: String) -> Self {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming_rx) = std_mpsc::channel();

        let thread = thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    error!("Failed to start network runtime: {}", e);
                    let _ = incoming_tx.send(NetworkEvent::Disconnected(e.to_string()));
                    return;
                }
            };

            runtime.block_on(run_connection(url, outgoing_rx, incoming_tx));
        });

        NetworkHandle {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            thread: Some(thread),
        }
    }

    /// Queues a message; returns false once the network thread is gone
    pub fn send(&self, message: Message) -> bool {
        self.outgoing.send(Outgoing::Send(message)).is_ok()
    }

    /// Drains every event received since the last call
    pub fn poll(&self) -> Vec<NetworkEvent> {
        self.incoming.try_iter().collect()
    }

    /// Announces the departure to the relay and waits for the thread to finish
    pub fn shutdown(mut self) {
        let _ = self.outgoing.send(Outgoing::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Network thread panicked");
            }
        }
    }
}

async fn run_connection(
    url: String,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    incoming: std_mpsc::Sender<NetworkEvent>,
) {
    info!("Connecting to {}", url);
    let ws = match connect_async(url.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!("Connection to {} failed: {}", url, e);
            let _ = incoming.send(NetworkEvent::Disconnected(e.to_string()));
            return;
        }
    };
    info!("Connected to {}", url);
    let _ = incoming.send(NetworkEvent::Connected);

    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            frame = stream.next() => {
                let payload = match frame {
                    Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
                    Some(Ok(WsMessage::Binary(data))) => data,
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame
                            .map(|f| f.reason.into_owned())
                            .unwrap_or_else(|| "Connection closed".to_string());
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break e.to_string(),
                    None => break "Connection closed".to_string(),
                };

                match Message::decode(&payload) {
                    Ok(message) => {
                        if incoming.send(NetworkEvent::Message(message)).is_err() {
                            break "Client stopped".to_string();
                        }
                    }
                    Err(e) => warn!("Ignoring undecodable message from relay: {}", e),
                }
            },

            command = outgoing.recv() => match command {
                Some(Outgoing::Send(message)) => {
                    if let Err(e) = sink.send(WsMessage::Text(message.encode())).await {
                        break e.to_string();
                    }
                }
                Some(Outgoing::Shutdown) | None => {
                    debug!("Leaving relay");
                    let _ = sink.send(WsMessage::Text(Message::user_disconnect().encode())).await;
                    let _ = sink.close().await;
                    break "Client stopped".to_string();
                }
            },
        }
    };

    info!("Disconnected: {}", reason);
    let _ = incoming.send(NetworkEvent::Disconnected(reason));
}
