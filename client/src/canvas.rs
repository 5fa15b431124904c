//! Client-side whiteboard state built from relay messages

use log::{debug, warn};
use shared::{Message, MessageKind, Stroke};
use std::time::{Duration, Instant};

/// How long a presence notification stays on screen
pub const NOTIFICATION_TTL: Duration = Duration::from_secs(3);

/// Everything the renderer needs to draw one frame
#[derive(Debug, Default)]
pub struct Canvas {
    strokes: Vec<Stroke>,
    user_count: Option<u64>,
    notification: Option<(String, Instant)>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws a segment produced by local input. The relay does not echo
    /// `draw` back to its sender, so it is applied immediately.
    pub fn add_local(&mut self, stroke: Stroke) {
        self.strokes.push(stroke);
    }

    /// Applies one message from the relay. Returns true if anything visible
    /// changed.
    pub fn apply(&mut self, message: &Message) -> bool {
        match message.kind() {
            MessageKind::Draw => match message.body::<Stroke>() {
                Ok(stroke) => {
                    self.strokes.push(stroke);
                    true
                }
                Err(e) => {
                    warn!("Ignoring draw message with unexpected shape: {}", e);
                    false
                }
            },
            MessageKind::Clear => {
                self.strokes.clear();
                true
            }
            MessageKind::UserCount => match message.count() {
                Some(count) => {
                    self.user_count = Some(count);
                    true
                }
                None => false,
            },
            MessageKind::Notification => match message.as_notification() {
                Some(notification) => {
                    self.user_count = Some(notification.user_count);
                    self.notification = Some((notification.message, Instant::now()));
                    true
                }
                None => false,
            },
            other => {
                debug!("Ignoring {} message", other.as_str());
                false
            }
        }
    }

    pub fn strokes(&self) -> &[Stroke] {
        &self.strokes
    }

    pub fn user_count(&self) -> Option<u64> {
        self.user_count
    }

    /// Returns the latest notification while it is still fresh.
    pub fn notification(&self) -> Option<&str> {
        self.notification
            .as_ref()
            .filter(|(_, shown_at)| shown_at.elapsed() < NOTIFICATION_TTL)
            .map(|(text, _)| text.as_str())
    }

    /// Forgets presence information, e.g. after losing the connection.
    pub fn reset_presence(&mut self) {
        self.user_count = None;
        self.notification = None;
    }
}

/// Maps a window position to the shared `0.0..=1.0` coordinate space.
pub fn normalize(x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
    if width <= 0.0 || height <= 0.0 {
        return (0.0, 0.0);
    }
    ((x / width).clamp(0.0, 1.0), (y / height).clamp(0.0, 1.0))
}

/// Maps a shared coordinate back to window pixels.
pub fn denormalize(x: f32, y: f32, width: f32, height: f32) -> (f32, f32) {
    (x * width, y * height)
}
