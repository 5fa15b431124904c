//! # Whiteboard Client Library
//!
//! This library provides a small shared whiteboard on top of the relay
//! server. Every segment a user draws is sent to the relay, which forwards it
//! to the other connected clients; a `clear` is echoed back to everyone,
//! including the client that asked for it.
//!
//! ## Architecture Overview
//!
//! ### Local-First Drawing
//! The relay never sends a `draw` back to its sender, so the client applies
//! its own segments immediately and only applies remote segments as they
//! arrive. `clear` is the exception: it is applied when the relay echoes it,
//! which keeps every canvas in the same order relative to remote strokes.
//!
//! ### Background Networking
//! macroquad drives the frame loop on the main thread. The WebSocket runs on
//! a tokio runtime in a background thread and exchanges messages with the
//! frame loop through channels, so a slow relay never stalls rendering.
//!
//! ## Module Organization
//!
//! ### Canvas Module (`canvas`)
//! Strokes, user count and the latest presence notification, built from
//! relay messages.
//!
//! ### Input Module (`input`)
//! Mouse drags become normalized stroke segments; keys pick color, width and
//! clear the board.
//!
//! ### Network Module (`network`)
//! The relay connection thread and its command/event channels.
//!
//! ### Rendering Module (`rendering`)
//! Draws the strokes and a small HUD.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::canvas::Canvas;
//! use client::input::{InputAction, InputManager};
//! use client::network::{NetworkEvent, NetworkHandle};
//! use shared::Message;
//!
//! let network = NetworkHandle::spawn("ws://127.0.0.1:5000".to_string());
//! let mut canvas = Canvas::new();
//! let mut input = InputManager::new(None);
//!
//! // Once per frame
//! for event in network.poll() {
//!     if let NetworkEvent::Message(message) = event {
//!         canvas.apply(&message);
//!     }
//! }
//! for action in input.update() {
//!     match action {
//!         InputAction::Stroke(stroke) => {
//!             network.send(Message::draw(&stroke));
//!             canvas.add_local(stroke);
//!         }
//!         InputAction::Clear => {
//!             network.send(Message::clear());
//!         }
//!     }
//! }
//!
//! network.shutdown();
//! ```

pub mod canvas;
pub mod input;
pub mod network;
pub mod rendering;
