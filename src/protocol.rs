//! Socket.IO 0.9 frame codec.
//!
//! Every WebSocket text frame carries exactly one message in the form
//!
//! ```text
//! <type>:<id>:<endpoint>:<data>
//! ```
//!
//! where trailing fields may be omitted and `<data>` is specific to the
//! message type (a JSON object for events). [`encode`] and [`decode`] are pure
//! functions; subscription lookup and typed payload decoding happen in the
//! connection's reader task.
//!
//! Only the first element of an event's `args` array is carried. Socket.IO
//! allows several arguments per event, this client deliberately supports one.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DecodeError, SocketIoError};

// ── Message types ───────────────────────────────────────────────────

/// Numeric message type that leads every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Disconnect,
    Connect,
    Heartbeat,
    Text,
    Json,
    Event,
    Ack,
    Error,
    Noop,
}

impl MessageType {
    /// Wire code of this message type.
    pub fn code(self) -> u8 {
        match self {
            Self::Disconnect => 0,
            Self::Connect => 1,
            Self::Heartbeat => 2,
            Self::Text => 3,
            Self::Json => 4,
            Self::Event => 5,
            Self::Ack => 6,
            Self::Error => 7,
            Self::Noop => 8,
        }
    }

    /// Look up a message type by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Disconnect),
            1 => Some(Self::Connect),
            2 => Some(Self::Heartbeat),
            3 => Some(Self::Text),
            4 => Some(Self::Json),
            5 => Some(Self::Event),
            6 => Some(Self::Ack),
            7 => Some(Self::Error),
            8 => Some(Self::Noop),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnect => "disconnect",
            Self::Connect => "connect",
            Self::Heartbeat => "heartbeat",
            Self::Text => "text",
            Self::Json => "json",
            Self::Event => "event",
            Self::Ack => "ack",
            Self::Error => "error",
            Self::Noop => "noop",
        };
        f.write_str(name)
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// A Socket.IO protocol message.
///
/// `Event` is the inbound (server-originated) form of an event, `Emit` the
/// outbound one; both share the `5` wire type.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Close the whole connection (`endpoint: None`) or a single endpoint.
    Disconnect { endpoint: Option<String> },
    /// Connection (or endpoint connection) confirmed.
    Connect { endpoint: String, params: String },
    /// Keep-alive.
    Heartbeat,
    /// Plain text message.
    Text {
        id: String,
        endpoint: String,
        data: String,
    },
    /// JSON message, kept as raw JSON text.
    Json {
        id: String,
        endpoint: String,
        json: String,
    },
    /// Named event received from the server. `payload` is `args[0]`.
    Event {
        id: String,
        endpoint: String,
        name: String,
        payload: Value,
    },
    /// Acknowledgment of message `id`.
    Ack { id: String, data: Option<String> },
    /// Error reported by the server.
    Error {
        endpoint: String,
        reason: String,
        advice: Option<String>,
    },
    /// No operation.
    Noop,
    /// Named event sent by this client.
    Emit { name: String, payload: Value },
}

impl Message {
    /// Wire type of this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Disconnect { .. } => MessageType::Disconnect,
            Self::Connect { .. } => MessageType::Connect,
            Self::Heartbeat => MessageType::Heartbeat,
            Self::Text { .. } => MessageType::Text,
            Self::Json { .. } => MessageType::Json,
            Self::Event { .. } | Self::Emit { .. } => MessageType::Event,
            Self::Ack { .. } => MessageType::Ack,
            Self::Error { .. } => MessageType::Error,
            Self::Noop => MessageType::Noop,
        }
    }

    /// The acknowledgment the client sends after handling event `event_id`.
    ///
    /// A trailing `+` on the event id (server asks for ack data) is not part
    /// of the acknowledged id.
    pub fn ack_for(event_id: &str) -> Self {
        Self::Ack {
            id: event_id.trim_end_matches('+').to_owned(),
            data: None,
        }
    }
}

/// JSON body of an outbound event frame. Field order is `name`, then `args`.
#[derive(Serialize)]
struct OutboundEvent<'a> {
    name: &'a str,
    args: [&'a Value; 1],
}

/// JSON body of an inbound event frame.
#[derive(Deserialize)]
struct InboundEvent {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

// ── Encoding ────────────────────────────────────────────────────────

/// Encode an outbound message into a text frame.
///
/// # Errors
///
/// Returns [`SocketIoError::Encode`] for message kinds this client never
/// sends (`Connect`, `Text`, `Json`, `Event`, `Error`, `Noop`) or if an emit
/// payload cannot be rendered as JSON.
pub fn encode(message: &Message) -> Result<String, SocketIoError> {
    match message {
        Message::Disconnect { endpoint: None } => Ok("0".to_owned()),
        Message::Disconnect {
            endpoint: Some(endpoint),
        } => {
            if endpoint.starts_with('/') {
                Ok(format!("0::{endpoint}"))
            } else {
                Ok(format!("0::/{endpoint}"))
            }
        }
        Message::Heartbeat => Ok("2:::".to_owned()),
        Message::Emit { name, payload } => {
            let body = serde_json::to_string(&OutboundEvent {
                name,
                args: [payload],
            })
            .map_err(|e| SocketIoError::Encode(format!("JSON serialization error ({e})")))?;
            Ok(format!("5:::{body}"))
        }
        Message::Ack { id, data: None } => Ok(format!("6:::{id}")),
        Message::Ack {
            id,
            data: Some(data),
        } => Ok(format!("6:::{id}+{data}")),
        other => Err(SocketIoError::Encode(format!(
            "{} messages are not sent by this client",
            other.message_type()
        ))),
    }
}

// ── Decoding ────────────────────────────────────────────────────────

/// Decode an inbound text frame.
///
/// # Errors
///
/// Returns a [`DecodeError`] for empty frames, non-numeric or unknown type
/// codes, event frames without data, and event data that is not a
/// `{"name": .., "args": [..]}` object. Errors concern this frame only.
pub fn decode(frame: &str) -> Result<Message, DecodeError> {
    if frame.is_empty() {
        return Err(DecodeError::EmptyFrame);
    }

    let mut parts = frame.splitn(4, ':');
    let type_field = parts.next().unwrap_or_default();
    let id = parts.next().unwrap_or_default();
    let endpoint = parts.next().unwrap_or_default();
    let data = parts.next();

    let code: u8 = type_field
        .parse()
        .map_err(|_| DecodeError::InvalidType(type_field.to_owned()))?;
    let message_type = MessageType::from_code(code).ok_or(DecodeError::UnknownType(code))?;

    let message = match message_type {
        MessageType::Disconnect => Message::Disconnect {
            endpoint: (!endpoint.is_empty()).then(|| endpoint.to_owned()),
        },
        MessageType::Connect => {
            let (endpoint, params) = endpoint.split_once('?').unwrap_or((endpoint, ""));
            Message::Connect {
                endpoint: endpoint.to_owned(),
                params: params.to_owned(),
            }
        }
        MessageType::Heartbeat => Message::Heartbeat,
        MessageType::Text => Message::Text {
            id: id.to_owned(),
            endpoint: endpoint.to_owned(),
            data: data.unwrap_or_default().to_owned(),
        },
        MessageType::Json => Message::Json {
            id: id.to_owned(),
            endpoint: endpoint.to_owned(),
            json: data.unwrap_or_default().to_owned(),
        },
        MessageType::Event => {
            let data = data.ok_or_else(|| DecodeError::MissingField {
                field: "event data",
                frame: frame.to_owned(),
            })?;
            let event: InboundEvent = serde_json::from_str(data).map_err(DecodeError::Json)?;
            Message::Event {
                id: id.to_owned(),
                endpoint: endpoint.to_owned(),
                name: event.name,
                payload: event.args.into_iter().next().unwrap_or(Value::Null),
            }
        }
        MessageType::Ack => {
            let data = data.unwrap_or_default();
            match data.split_once('+') {
                Some((id, ack_data)) => Message::Ack {
                    id: id.to_owned(),
                    data: Some(ack_data.to_owned()),
                },
                None => Message::Ack {
                    id: data.to_owned(),
                    data: None,
                },
            }
        }
        MessageType::Error => {
            let data = data.unwrap_or_default();
            let (reason, advice) = match data.split_once('+') {
                Some((reason, advice)) => (reason, Some(advice.to_owned())),
                None => (data, None),
            };
            Message::Error {
                endpoint: endpoint.to_owned(),
                reason: reason.to_owned(),
                advice,
            }
        }
        MessageType::Noop => Message::Noop,
    };

    Ok(message)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_type_codes_round_trip() {
        for code in 0..=8 {
            assert_eq!(MessageType::from_code(code).unwrap().code(), code);
        }
        assert_eq!(MessageType::from_code(9), None);
    }

    #[test]
    fn emit_encodes_name_before_args() {
        let frame = encode(&Message::Emit {
            name: "chat".into(),
            payload: json!({"text": "hi"}),
        })
        .unwrap();
        assert_eq!(frame, r#"5:::{"name":"chat","args":[{"text":"hi"}]}"#);
    }

    #[test]
    fn disconnect_encoding() {
        assert_eq!(encode(&Message::Disconnect { endpoint: None }).unwrap(), "0");
        assert_eq!(
            encode(&Message::Disconnect {
                endpoint: Some("chat".into())
            })
            .unwrap(),
            "0::/chat"
        );
        assert_eq!(
            encode(&Message::Disconnect {
                endpoint: Some("/chat".into())
            })
            .unwrap(),
            "0::/chat"
        );
    }

    #[test]
    fn inbound_only_messages_are_not_encodable() {
        let err = encode(&Message::Noop).unwrap_err();
        assert!(matches!(err, SocketIoError::Encode(_)));
        let err = encode(&Message::Connect {
            endpoint: String::new(),
            params: String::new(),
        })
        .unwrap_err();
        assert!(matches!(err, SocketIoError::Encode(_)));
    }

    #[test]
    fn event_keeps_only_first_argument() {
        let msg = decode(r#"5:7::{"name":"move","args":[1,2,3]}"#).unwrap();
        assert_eq!(
            msg,
            Message::Event {
                id: "7".into(),
                endpoint: String::new(),
                name: "move".into(),
                payload: json!(1),
            }
        );
    }

    #[test]
    fn event_without_args_has_null_payload() {
        let msg = decode(r#"5:::{"name":"ping"}"#).unwrap();
        let Message::Event { payload, .. } = msg else {
            panic!("expected event, got {msg:?}");
        };
        assert_eq!(payload, Value::Null);
    }

    #[test]
    fn event_data_may_contain_colons() {
        let msg = decode(r#"5:1::{"name":"time","args":["12:30:00"]}"#).unwrap();
        let Message::Event { payload, .. } = msg else {
            panic!("expected event, got {msg:?}");
        };
        assert_eq!(payload, json!("12:30:00"));
    }

    #[test]
    fn ack_for_strips_data_request_marker() {
        assert_eq!(
            Message::ack_for("4+"),
            Message::Ack {
                id: "4".into(),
                data: None
            }
        );
    }

    #[test]
    fn decode_errors() {
        assert!(matches!(decode(""), Err(DecodeError::EmptyFrame)));
        assert!(matches!(decode("x:::"), Err(DecodeError::InvalidType(_))));
        assert!(matches!(decode("9:::"), Err(DecodeError::UnknownType(9))));
        assert!(matches!(decode("5:1:"), Err(DecodeError::MissingField { .. })));
        assert!(matches!(decode("5:1::not json"), Err(DecodeError::Json(_))));
    }
}
