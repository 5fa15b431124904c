use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::{json, Value};
use std::fmt;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 5000;

pub const TYPE_USER_COUNT: &str = "userCount";
pub const TYPE_NOTIFICATION: &str = "notification";
pub const TYPE_USER_CONNECTION: &str = "userConnection";
pub const TYPE_CLEAR: &str = "clear";
pub const TYPE_DRAW: &str = "draw";

pub const ACTION_DISCONNECT: &str = "disconnect";

pub const JOIN_NOTIFICATION: &str = "A new user has joined";
pub const LEAVE_NOTIFICATION: &str = "A user has left";

/// Reasons an inbound payload is rejected before it reaches the dispatcher.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("payload is not well-formed JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("message has no string `type` field")]
    MissingType,
    #[error("`{kind}` message has no string `{field}` field")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// What a `userConnection` message asks the server to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Disconnect,
    Other(String),
}

impl UserAction {
    fn from_wire(action: &str) -> Self {
        match action {
            ACTION_DISCONNECT => UserAction::Disconnect,
            other => UserAction::Other(other.to_string()),
        }
    }
}

/// The `type` tag of a message, resolved against the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    UserCount,
    Notification,
    UserConnection(UserAction),
    Clear,
    Draw,
    Other(String),
}

impl MessageKind {
    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::UserCount => TYPE_USER_COUNT,
            MessageKind::Notification => TYPE_NOTIFICATION,
            MessageKind::UserConnection(_) => TYPE_USER_CONNECTION,
            MessageKind::Clear => TYPE_CLEAR,
            MessageKind::Draw => TYPE_DRAW,
            MessageKind::Other(tag) => tag,
        }
    }
}

/// Only the fields the relay needs to route a message. Everything else in
/// the payload stays untouched in the raw text.
#[derive(Deserialize)]
struct Header {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default)]
    action: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct UserCountBody {
    count: u64,
}

/// Body of a server-originated `notification` message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(rename = "userCount")]
    pub user_count: u64,
}

/// Line segment carried by `draw` messages of the whiteboard client.
///
/// Coordinates are normalized to the `0.0..=1.0` range so peers with
/// different window sizes render the same picture. The relay never looks
/// inside this payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stroke {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub color: String,
    pub width: f32,
}

/// A tagged JSON object as it travels over the wire.
///
/// The message keeps the exact text it was decoded from, so relaying it
/// re-emits the same bytes the sender produced, including fields the relay
/// does not know about.
#[derive(Debug, Clone)]
pub struct Message {
    kind: MessageKind,
    raw: String,
}

impl Message {
    /// Parses an inbound frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let raw: Box<RawValue> = serde_json::from_slice(bytes)?;
        if !raw.get().starts_with('{') {
            return Err(DecodeError::NotAnObject);
        }

        let header: Header = serde_json::from_str(raw.get())?;
        let tag = match header.kind {
            Some(Value::String(tag)) => tag,
            _ => return Err(DecodeError::MissingType),
        };

        let kind = match tag.as_str() {
            TYPE_USER_COUNT => MessageKind::UserCount,
            TYPE_NOTIFICATION => MessageKind::Notification,
            TYPE_USER_CONNECTION => match header.action {
                Some(Value::String(action)) => {
                    MessageKind::UserConnection(UserAction::from_wire(&action))
                }
                _ => {
                    return Err(DecodeError::MissingField {
                        kind: TYPE_USER_CONNECTION,
                        field: "action",
                    })
                }
            },
            TYPE_CLEAR => MessageKind::Clear,
            TYPE_DRAW => MessageKind::Draw,
            _ => MessageKind::Other(tag),
        };

        Ok(Message {
            kind,
            raw: raw.get().to_string(),
        })
    }

    /// Serializes the message for the wire.
    pub fn encode(&self) -> String {
        self.raw.clone()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// `{ "type": "userCount", "count": n }`
    pub fn user_count(count: usize) -> Self {
        Self::from_value(
            MessageKind::UserCount,
            json!({ "type": TYPE_USER_COUNT, "count": count }),
        )
    }

    /// `{ "type": "notification", "message": text, "userCount": n }`
    pub fn notification(message: &str, user_count: usize) -> Self {
        Self::from_value(
            MessageKind::Notification,
            json!({
                "type": TYPE_NOTIFICATION,
                "message": message,
                "userCount": user_count,
            }),
        )
    }

    pub fn joined(user_count: usize) -> Self {
        Self::notification(JOIN_NOTIFICATION, user_count)
    }

    pub fn left(user_count: usize) -> Self {
        Self::notification(LEAVE_NOTIFICATION, user_count)
    }

    pub fn clear() -> Self {
        Self::from_value(MessageKind::Clear, json!({ "type": TYPE_CLEAR }))
    }

    pub fn draw(stroke: &Stroke) -> Self {
        Self::from_value(
            MessageKind::Draw,
            json!({
                "type": TYPE_DRAW,
                "x0": stroke.x0,
                "y0": stroke.y0,
                "x1": stroke.x1,
                "y1": stroke.y1,
                "color": stroke.color,
                "width": stroke.width,
            }),
        )
    }

    /// Sent by a client that is about to leave.
    pub fn user_disconnect() -> Self {
        Self::from_value(
            MessageKind::UserConnection(UserAction::Disconnect),
            json!({ "type": TYPE_USER_CONNECTION, "action": ACTION_DISCONNECT }),
        )
    }

    /// Returns the `count` of a `userCount` message.
    pub fn count(&self) -> Option<u64> {
        match self.kind {
            MessageKind::UserCount => self.body::<UserCountBody>().ok().map(|b| b.count),
            _ => None,
        }
    }

    /// Returns the body of a `notification` message.
    pub fn as_notification(&self) -> Option<Notification> {
        match self.kind {
            MessageKind::Notification => self.body().ok(),
            _ => None,
        }
    }

    /// Deserializes the whole payload into an application type.
    pub fn body<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.raw)
    }

    fn from_value(kind: MessageKind, value: Value) -> Self {
        Message {
            kind,
            raw: value.to_string(),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Message {}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_draw_keeps_unknown_fields() {
        let raw = r#"{"type":"draw","x":1,"brush":{"size":3,"tip":"round"},"extra":[1,2]}"#;
        let message = Message::decode(raw.as_bytes()).unwrap();

        assert_eq!(message.kind(), &MessageKind::Draw);
        assert_eq!(message.encode(), raw);
    }

    #[test]
    fn test_decode_classifies_vocabulary() {
        let cases = [
            (r#"{"type":"clear"}"#, MessageKind::Clear),
            (r#"{"type":"userCount","count":3}"#, MessageKind::UserCount),
            (
                r#"{"type":"notification","message":"hi","userCount":2}"#,
                MessageKind::Notification,
            ),
            (
                r#"{"type":"userConnection","action":"disconnect"}"#,
                MessageKind::UserConnection(UserAction::Disconnect),
            ),
            (
                r#"{"type":"userConnection","action":"wave"}"#,
                MessageKind::UserConnection(UserAction::Other("wave".to_string())),
            ),
            (
                r#"{"type":"cursor","x":4}"#,
                MessageKind::Other("cursor".to_string()),
            ),
        ];

        for (raw, expected) in cases {
            let message = Message::decode(raw.as_bytes()).unwrap();
            assert_eq!(message.kind(), &expected, "decoding {}", raw);
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        let err = Message::decode(b"not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));

        let err = Message::decode(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_decode_rejects_non_objects() {
        for raw in [r#"["draw"]"#, "42", r#""draw""#, "null"] {
            let err = Message::decode(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::NotAnObject), "decoding {}", raw);
        }
    }

    #[test]
    fn test_decode_requires_string_type() {
        for raw in [r#"{"x":1}"#, r#"{"type":7}"#, r#"{"type":null}"#] {
            let err = Message::decode(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, DecodeError::MissingType), "decoding {}", raw);
        }
    }

    #[test]
    fn test_decode_user_connection_requires_action() {
        let err = Message::decode(br#"{"type":"userConnection"}"#).unwrap_err();
        match err {
            DecodeError::MissingField { kind, field } => {
                assert_eq!(kind, TYPE_USER_CONNECTION);
                assert_eq!(field, "action");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_decode_trims_surrounding_whitespace() {
        let message = Message::decode(b"  {\"type\":\"clear\"}\n").unwrap();
        assert_eq!(message.encode(), r#"{"type":"clear"}"#);
    }

    #[test]
    fn test_user_count_wire_format() {
        let message = Message::user_count(3);
        assert_eq!(message.encode(), r#"{"type":"userCount","count":3}"#);
        assert_eq!(message.count(), Some(3));
    }

    #[test]
    fn test_notification_wire_format() {
        let message = Message::joined(2);
        assert_eq!(
            message.encode(),
            r#"{"type":"notification","message":"A new user has joined","userCount":2}"#
        );

        let notification = message.as_notification().unwrap();
        assert_eq!(notification.message, JOIN_NOTIFICATION);
        assert_eq!(notification.user_count, 2);
    }

    #[test]
    fn test_notification_escapes_text() {
        let message = Message::notification("say \"hi\"", 1);
        let decoded = Message::decode(message.encode().as_bytes()).unwrap();
        assert_eq!(decoded.as_notification().unwrap().message, "say \"hi\"");
    }

    #[test]
    fn test_server_messages_survive_decode() {
        let built = vec![
            Message::user_count(0),
            Message::user_count(12),
            Message::joined(4),
            Message::left(3),
            Message::clear(),
            Message::user_disconnect(),
        ];

        for message in built {
            let decoded = Message::decode(message.encode().as_bytes()).unwrap();
            assert_eq!(decoded, message);
            assert_eq!(decoded.kind(), message.kind());
        }
    }

    #[test]
    fn test_accessors_ignore_other_kinds() {
        assert_eq!(Message::clear().count(), None);
        assert!(Message::user_count(1).as_notification().is_none());
    }

    #[test]
    fn test_stroke_body_roundtrip() {
        let stroke = Stroke {
            x0: 0.25,
            y0: 0.5,
            x1: 0.75,
            y1: 0.5,
            color: "#ff8800".to_string(),
            width: 3.0,
        };

        let message = Message::draw(&stroke);
        assert_eq!(message.kind(), &MessageKind::Draw);

        let decoded = Message::decode(message.encode().as_bytes()).unwrap();
        let body: Stroke = decoded.body().unwrap();
        assert_eq!(body, stroke);
    }

    #[test]
    fn test_kind_as_str() {
        assert_eq!(MessageKind::Draw.as_str(), "draw");
        assert_eq!(
            MessageKind::UserConnection(UserAction::Disconnect).as_str(),
            "userConnection"
        );
        assert_eq!(MessageKind::Other("cursor".to_string()).as_str(), "cursor");
    }
}
