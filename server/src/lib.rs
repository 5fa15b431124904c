//! # Relay Server Library
//!
//! This library provides the WebSocket relay behind the shared whiteboard.
//! Every message a client sends is rebroadcast to some or all of the other
//! connected clients, and the server keeps everyone informed about who is
//! present through join/leave notifications and a live user count.
//!
//! ## Core Responsibilities
//!
//! ### Presence
//! The server tracks which connections are live and announces changes:
//! - A newcomer receives the current `userCount`
//! - Everyone else receives a join `notification`
//! - A departure produces a leave `notification` and a fresh `userCount`
//!
//! ### Relaying
//! Application messages are forwarded byte-for-byte. `clear` goes to every
//! client including its sender, `draw` and unknown types go to everyone but
//! the sender.
//!
//! ## Architecture Design
//!
//! ### Single Dispatch Loop
//! All transport events (connect, frame, close, error) for all connections
//! are funnelled through one channel and handled sequentially. Per-connection
//! event order is preserved; there is no ordering across connections.
//!
//! ### Non-Blocking Writes
//! Each connection owns a bounded outbound queue drained by its own writer
//! task. The dispatch loop only ever enqueues, so a slow or dead peer cannot
//! stall delivery to the others: a full queue evicts that peer, and a socket
//! write that exceeds the configured timeout closes it.
//!
//! ## Module Organization
//!
//! ### Connection Module (`connection`)
//! Handle for one WebSocket session: identity, transport state, outbound queue.
//!
//! ### Registry Module (`registry`)
//! The set of live connections, the only shared mutable state.
//!
//! ### Dispatcher Module (`dispatcher`)
//! Broadcast with optional sender exclusion and per-connection failure isolation.
//!
//! ### Session Module (`session`)
//! Protocol state machine deciding what each transport event triggers.
//!
//! ### Network Module (`network`)
//! TCP listener, WebSocket handshake, reader/writer tasks and the dispatch loop.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::RelayConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RelayConfig::default().with_bind_addr("127.0.0.1:5000");
//!     let server = Server::bind(config).await?;
//!
//!     // Accepts connections and processes their events until the process exits
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod network;
pub mod registry;
pub mod session;
