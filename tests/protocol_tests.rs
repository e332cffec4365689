#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire format tests for the Socket.IO client.
//!
//! Verifies the frame codec against frames produced by real Socket.IO 0.9
//! servers, the handshake record parser, and the URL derivations.

use std::time::Duration;

use serde_json::{json, Value};
use socketio_legacy_client::error::{DecodeError, HandshakeError};
use socketio_legacy_client::handshake::{
    handshake_url, parse_handshake, websocket_url, DEFAULT_HEARTBEAT_INTERVAL,
};
use socketio_legacy_client::protocol::{decode, encode, MessageType};
use socketio_legacy_client::Message;

// ════════════════════════════════════════════════════════════════════
// Decoding server frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn decode_chat_event() {
    let msg = decode(r#"5:1::{"name":"chat","args":[{"text":"hi"}]}"#).unwrap();
    assert_eq!(
        msg,
        Message::Event {
            id: "1".into(),
            endpoint: String::new(),
            name: "chat".into(),
            payload: json!({"text": "hi"}),
        }
    );
}

#[test]
fn decode_event_on_endpoint() {
    let msg = decode(r#"5::/news:{"name":"headline","args":["rust 2.0"]}"#).unwrap();
    match msg {
        Message::Event {
            id,
            endpoint,
            name,
            payload,
        } => {
            assert!(id.is_empty());
            assert_eq!(endpoint, "/news");
            assert_eq!(name, "headline");
            assert_eq!(payload, json!("rust 2.0"));
        }
        other => panic!("expected event, got {other:?}"),
    }
}

#[test]
fn decode_connect_with_query() {
    assert_eq!(
        decode("1::/chat?token=abc").unwrap(),
        Message::Connect {
            endpoint: "/chat".into(),
            params: "token=abc".into(),
        }
    );
    assert_eq!(
        decode("1::").unwrap(),
        Message::Connect {
            endpoint: String::new(),
            params: String::new(),
        }
    );
}

#[test]
fn decode_control_frames() {
    assert_eq!(decode("2::").unwrap(), Message::Heartbeat);
    assert_eq!(decode("8::").unwrap(), Message::Noop);
    assert_eq!(decode("0").unwrap(), Message::Disconnect { endpoint: None });
    assert_eq!(
        decode("0::/chat").unwrap(),
        Message::Disconnect {
            endpoint: Some("/chat".into())
        }
    );
}

#[test]
fn decode_text_and_json_messages() {
    assert_eq!(
        decode("3:1::hello: world").unwrap(),
        Message::Text {
            id: "1".into(),
            endpoint: String::new(),
            data: "hello: world".into(),
        }
    );
    assert_eq!(
        decode(r#"4:::{"a":1}"#).unwrap(),
        Message::Json {
            id: String::new(),
            endpoint: String::new(),
            json: r#"{"a":1}"#.into(),
        }
    );
}

#[test]
fn decode_ack_with_and_without_data() {
    assert_eq!(
        decode("6:::4").unwrap(),
        Message::Ack {
            id: "4".into(),
            data: None
        }
    );
    assert_eq!(
        decode(r#"6:::4+["ok"]"#).unwrap(),
        Message::Ack {
            id: "4".into(),
            data: Some(r#"["ok"]"#.into()),
        }
    );
}

#[test]
fn decode_error_with_advice() {
    assert_eq!(
        decode("7::/admin:unauthorized+reconnect").unwrap(),
        Message::Error {
            endpoint: "/admin".into(),
            reason: "unauthorized".into(),
            advice: Some("reconnect".into()),
        }
    );
}

#[test]
fn decode_rejects_bad_frames() {
    assert!(matches!(decode(""), Err(DecodeError::EmptyFrame)));
    assert!(matches!(decode("x:::"), Err(DecodeError::InvalidType(t)) if t == "x"));
    assert!(matches!(decode("9:::"), Err(DecodeError::UnknownType(9))));
    assert!(matches!(
        decode("5:1::"),
        Err(DecodeError::Json(_)) | Err(DecodeError::MissingField { .. })
    ));
    assert!(matches!(decode("5:1:"), Err(DecodeError::MissingField { .. })));
    assert!(matches!(decode(r#"5:::{"args":[]}"#), Err(DecodeError::Json(_))));
}

// ════════════════════════════════════════════════════════════════════
// Encoding client frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn encode_client_frames() {
    assert_eq!(encode(&Message::Heartbeat).unwrap(), "2:::");
    assert_eq!(encode(&Message::ack_for("12")).unwrap(), "6:::12");
    assert_eq!(
        encode(&Message::Emit {
            name: "chat".into(),
            payload: json!({"text": "hi"}),
        })
        .unwrap(),
        r#"5:::{"name":"chat","args":[{"text":"hi"}]}"#
    );
    assert_eq!(
        encode(&Message::Disconnect {
            endpoint: Some("chat".into())
        })
        .unwrap(),
        "0::/chat"
    );
}

#[test]
fn encoded_client_frames_decode_back() {
    assert_eq!(decode(&encode(&Message::Heartbeat).unwrap()).unwrap(), Message::Heartbeat);

    let ack = Message::Ack {
        id: "3".into(),
        data: Some("[1,2]".into()),
    };
    assert_eq!(decode(&encode(&ack).unwrap()).unwrap(), ack);

    let payload = json!({"nested": {"list": [1, "two", null]}, "colon": "a:b"});
    let frame = encode(&Message::Emit {
        name: "update".into(),
        payload: payload.clone(),
    })
    .unwrap();
    match decode(&frame).unwrap() {
        Message::Event { name, payload: decoded, .. } => {
            assert_eq!(name, "update");
            assert_eq!(decoded, payload);
        }
        other => panic!("expected event, got {other:?}"),
    }
}

#[test]
fn message_type_of_emit_is_event() {
    let emit = Message::Emit {
        name: "x".into(),
        payload: Value::Null,
    };
    assert_eq!(emit.message_type(), MessageType::Event);
    assert_eq!(MessageType::Event.code(), 5);
}

// ════════════════════════════════════════════════════════════════════
// Handshake
// ════════════════════════════════════════════════════════════════════

#[test]
fn handshake_record_halves_heartbeat_timeout() {
    let session = parse_handshake("abc123:15:10:websocket,polling").unwrap();
    assert_eq!(session.session_id, "abc123");
    assert_eq!(session.heartbeat_interval, Duration::from_millis(7500));
    assert_eq!(session.close_timeout, Some(Duration::from_secs(10)));
    assert!(session.supports("websocket"));
    assert!(session.supports("polling"));
}

#[test]
fn handshake_record_without_heartbeat_uses_default() {
    let session = parse_handshake("abc123::25:websocket").unwrap();
    assert_eq!(session.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
}

#[test]
fn handshake_record_errors() {
    assert!(matches!(
        parse_handshake("abc123:15:10"),
        Err(HandshakeError::MalformedResponse(_))
    ));
    assert!(matches!(
        parse_handshake("abc123:soon:10:websocket"),
        Err(HandshakeError::InvalidTimeout(_))
    ));
    assert!(matches!(
        parse_handshake("abc123:15:10:xhr-polling,jsonp-polling"),
        Err(HandshakeError::WebSocketUnsupported(_))
    ));
}

#[test]
fn urls_derive_from_server_uri() {
    assert_eq!(
        handshake_url("ws://localhost:3000").unwrap(),
        "http://localhost:3000/socket.io/1/"
    );
    assert_eq!(
        handshake_url("wss://example.com/").unwrap(),
        "https://example.com/socket.io/1/"
    );
    assert!(handshake_url("http://example.com").is_err());
    assert_eq!(
        websocket_url("ws://localhost:3000", "abc123"),
        "ws://localhost:3000/socket.io/1/websocket/abc123"
    );
}
