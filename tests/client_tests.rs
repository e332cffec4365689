//! Integration-style client tests for the Socket.IO client.
//!
//! Uses the shared `MockHandshake` and `MockConnector` from `tests/common` to
//! drive a `SocketIoClient` through its lifecycle and script the server side
//! of the transport frame by frame.

mod common;

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use socketio_legacy_client::error::HandshakeError;
use socketio_legacy_client::handshake::{parse_handshake, DEFAULT_HEARTBEAT_INTERVAL};
use socketio_legacy_client::transport::{Connector, TransportHalves};
use socketio_legacy_client::{
    CloseCode, ConnectionState, Handshake, Session, SocketIoClient, SocketIoError,
    SocketIoOptions,
};
use tokio::sync::mpsc;

use common::{
    assert_no_lifecycle, next_lifecycle, Lifecycle, MockConnector, MockHandshake, MockServer,
    RecordingHandler, WAIT,
};

const URI: &str = "ws://localhost:3000";
const SLOW_HEARTBEAT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize, PartialEq)]
struct Chat {
    text: String,
}

// ════════════════════════════════════════════════════════════════════
// Helper: connect a client to a mock server
// ════════════════════════════════════════════════════════════════════

struct Harness {
    client: SocketIoClient,
    servers: mpsc::UnboundedReceiver<MockServer>,
    lifecycle: mpsc::UnboundedReceiver<Lifecycle>,
}

impl Harness {
    fn new(heartbeat: Duration) -> Self {
        let (connector, servers) = MockConnector::new();
        let client =
            SocketIoClient::with_components(MockHandshake::ok("abc123", heartbeat), connector);
        let (_handler, lifecycle) = RecordingHandler::new();
        Self {
            client,
            servers,
            lifecycle,
        }
    }

    /// Connect and wait for `on_open`; returns the server side of the transport.
    async fn open(&mut self) -> MockServer {
        let (handler, lifecycle) = RecordingHandler::new();
        self.lifecycle = lifecycle;
        self.client.connect(URI, handler).unwrap();

        let server = tokio::time::timeout(WAIT, self.servers.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(self.next().await, Lifecycle::Open);
        server
    }

    async fn next(&mut self) -> Lifecycle {
        next_lifecycle(&mut self.lifecycle).await
    }
}

async fn ready() -> (Harness, MockServer) {
    let mut harness = Harness::new(SLOW_HEARTBEAT);
    let server = harness.open().await;
    (harness, server)
}

// ════════════════════════════════════════════════════════════════════
// Lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn open_uses_session_websocket_url() {
    let (harness, server) = ready().await;

    assert_eq!(server.url, "ws://localhost:3000/socket.io/1/websocket/abc123");
    assert!(harness.client.is_connected());
    assert_eq!(harness.client.state(), ConnectionState::Ready);
    assert_eq!(harness.client.session().unwrap().session_id, "abc123");
}

#[tokio::test]
async fn server_close_reports_normal_once() {
    let (mut harness, mut server) = ready().await;

    server.close();

    assert_eq!(
        harness.next().await,
        Lifecycle::Close(CloseCode::Normal, "connection closed by server".into())
    );
    assert_eq!(harness.client.state(), ConnectionState::Closed);
    assert!(harness.client.session().is_none());
    assert!(!harness.client.is_connected());
}

#[tokio::test]
async fn transport_error_then_close_reports_one_close() {
    let (mut harness, mut server) = ready().await;

    server.fail("connection reset");
    server.close();

    match harness.next().await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::ConnectionLost);
            assert!(reason.contains("connection reset"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    harness.client.disconnect().await;
    assert_no_lifecycle(&mut harness.lifecycle).await;
    assert_eq!(harness.client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn disconnect_flushes_queue_and_closes_transport() {
    let (mut harness, mut server) = ready().await;

    harness.client.emit("bye", &json!({})).unwrap();
    harness.client.disconnect().await;

    assert_eq!(server.next_sent().await, r#"5:::{"name":"bye","args":[{}]}"#);
    assert!(server.client_closed());
    assert_eq!(
        harness.next().await,
        Lifecycle::Close(CloseCode::Normal, "disconnect requested".into())
    );
    assert_eq!(harness.client.state(), ConnectionState::Closed);
    assert_no_lifecycle(&mut harness.lifecycle).await;
}

#[tokio::test]
async fn handshake_failure_fails_without_opening_transport() {
    let (connector, mut servers) = MockConnector::new();
    let client = SocketIoClient::with_components(
        MockHandshake::failing(HandshakeError::WebSocketUnsupported("xhr-polling".into())),
        connector,
    );
    let (handler, mut lifecycle) = RecordingHandler::new();

    client.connect(URI, handler).unwrap();

    match next_lifecycle(&mut lifecycle).await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::CannotConnect);
            assert!(reason.contains("websocket not supported"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Failed);
    assert!(servers.try_recv().is_err());
}

#[tokio::test]
async fn transport_open_failure_fails() {
    let client = SocketIoClient::with_components(
        MockHandshake::ok("abc123", SLOW_HEARTBEAT),
        MockConnector::refusing("connection refused"),
    );
    let (handler, mut lifecycle) = RecordingHandler::new();

    client.connect(URI, handler).unwrap();

    match next_lifecycle(&mut lifecycle).await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::CannotConnect);
            assert!(reason.contains("connection refused"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Failed);
    assert!(client.session().is_none());
}

#[tokio::test]
async fn connect_while_ready_is_rejected() {
    let (harness, _server) = ready().await;
    let (handler, _lifecycle) = RecordingHandler::new();

    let err = tokio_test::assert_err!(harness.client.connect(URI, handler));

    assert!(matches!(
        err,
        SocketIoError::InvalidState(ConnectionState::Ready)
    ));
}

#[tokio::test]
async fn connect_with_invalid_options_is_rejected() {
    let harness = Harness::new(SLOW_HEARTBEAT);
    let (handler, _lifecycle) = RecordingHandler::new();

    let err = harness
        .client
        .connect_with_options(
            URI,
            handler,
            SocketIoOptions::new().with_receive_text_raw(false),
        )
        .unwrap_err();

    assert!(matches!(err, SocketIoError::InvalidOptions(_)));
    assert_eq!(harness.client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn reconnect_after_close_opens_a_new_session() {
    let (mut harness, mut first) = ready().await;
    first.close();
    assert!(matches!(harness.next().await, Lifecycle::Close(..)));

    harness.client.emit("queued", &1).unwrap();
    let mut second = harness.open().await;

    assert_eq!(
        second.next_sent().await,
        r#"5:::{"name":"queued","args":[1]}"#
    );
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn reconnect_does_not_replay_acks_from_a_dead_session() {
    let (mut harness, server) = ready().await;
    harness.client.subscribe("chat", |_: Value| {});

    for id in 1..=3 {
        server.push(&format!(r#"5:{id}::{{"name":"chat","args":[{{}}]}}"#));
    }
    drop(server);
    assert!(matches!(harness.next().await, Lifecycle::Close(..)));

    harness.client.emit("after", &1).unwrap();
    let mut second = harness.open().await;

    assert_eq!(
        second.next_sent().await,
        r#"5:::{"name":"after","args":[1]}"#
    );
    second.assert_quiet().await;
}

#[tokio::test]
async fn protocol_violation_reports_protocol_error() {
    let (mut harness, server) = ready().await;

    server.violate("reserved bits set");

    match harness.next().await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::ProtocolError);
            assert!(reason.contains("reserved bits set"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(harness.client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn state_changes_follow_the_lifecycle() {
    let mut harness = Harness::new(SLOW_HEARTBEAT);
    let mut states = harness.client.state_changes();
    let mut server = harness.open().await;

    assert_eq!(*states.borrow_and_update(), ConnectionState::Ready);
    server.close();
    assert!(matches!(harness.next().await, Lifecycle::Close(..)));
    assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);
}

// ════════════════════════════════════════════════════════════════════
// Emit
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn emit_writes_event_frame() {
    let (harness, mut server) = ready().await;

    tokio_test::assert_ok!(harness.client.emit("chat", &json!({"text": "hi"})));

    assert_eq!(
        server.next_sent().await,
        r#"5:::{"name":"chat","args":[{"text":"hi"}]}"#
    );
}

#[tokio::test]
async fn emit_before_connect_is_written_after_open() {
    let mut harness = Harness::new(SLOW_HEARTBEAT);
    harness.client.emit("early", &"first").unwrap();
    harness.client.emit("early", &"second").unwrap();

    let mut server = harness.open().await;

    assert_eq!(
        server.next_sent().await,
        r#"5:::{"name":"early","args":["first"]}"#
    );
    assert_eq!(
        server.next_sent().await,
        r#"5:::{"name":"early","args":["second"]}"#
    );
}

#[tokio::test]
async fn disconnect_endpoint_keeps_transport_open() {
    let (harness, mut server) = ready().await;

    tokio_test::assert_ok!(harness.client.disconnect_endpoint("/chat"));

    assert_eq!(server.next_sent().await, "0::/chat");
    assert!(harness.client.is_connected());
    assert!(!server.client_closed());
}

// ════════════════════════════════════════════════════════════════════
// Event delivery
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn subscribed_event_is_delivered_and_acked() {
    let (harness, mut server) = ready().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    harness
        .client
        .subscribe("chat", move |chat: Chat| tx.send(chat).unwrap());

    server.push(r#"5:1::{"name":"chat","args":[{"text":"hi"}]}"#);

    let chat = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(
        chat,
        Chat {
            text: "hi".into()
        }
    );
    assert_eq!(server.next_sent().await, "6:::1");
}

#[tokio::test]
async fn unsubscribed_event_produces_nothing() {
    let (harness, mut server) = ready().await;
    harness.client.subscribe("known", |_: Value| {});

    server.push(r#"5:1::{"name":"unknown","args":[{}]}"#);
    server.push(r#"5:2::{"name":"known","args":[{}]}"#);

    // Frames are handled in order, so the first thing written is the second ack.
    assert_eq!(server.next_sent().await, "6:::2");
    server.assert_quiet().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (harness, mut server) = ready().await;
    let seen = Arc::new(StdMutex::new(0));
    let counter = Arc::clone(&seen);
    harness
        .client
        .subscribe("tick", move |_: Value| *counter.lock().unwrap() += 1);

    assert!(harness.client.unsubscribe("tick"));
    server.push(r#"5:1::{"name":"tick","args":[1]}"#);

    server.assert_quiet().await;
    assert_eq!(*seen.lock().unwrap(), 0);
}

#[tokio::test]
async fn panicking_handler_is_acked_and_reported() {
    let (mut harness, mut server) = ready().await;
    harness
        .client
        .subscribe("boom", |_: Value| panic!("handler exploded"));

    server.push(r#"5:7::{"name":"boom","args":[null]}"#);

    assert_eq!(server.next_sent().await, "6:::7");
    match harness.next().await {
        Lifecycle::Error(message) => assert!(message.contains("handler exploded"), "{message}"),
        other => panic!("expected error, got {other:?}"),
    }
    assert!(harness.client.is_connected());
}

#[tokio::test]
async fn payload_mismatch_is_reported_without_ack() {
    let (mut harness, mut server) = ready().await;
    harness.client.subscribe("chat", |_: Chat| {});

    server.push(r#"5:3::{"name":"chat","args":["not an object"]}"#);

    assert!(matches!(harness.next().await, Lifecycle::Error(_)));
    server.assert_quiet().await;
}

#[tokio::test]
async fn data_ack_id_is_acked_without_plus() {
    let (harness, mut server) = ready().await;
    harness.client.subscribe("ping", |_: Value| {});

    server.push(r#"5:4+::{"name":"ping","args":[]}"#);

    assert_eq!(server.next_sent().await, "6:::4");
}

#[tokio::test]
async fn malformed_frames_are_reported_and_ignored() {
    let (mut harness, server) = ready().await;

    server.push("not a frame");
    server.push("9:::");
    server.push("7:::2+0");

    for _ in 0..3 {
        assert!(matches!(harness.next().await, Lifecycle::Error(_)));
    }
    assert!(harness.client.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Heartbeat
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn heartbeats_flow_while_ready_and_stop_after_close() {
    let mut harness = Harness::new(Duration::from_millis(20));
    let mut server = harness.open().await;

    assert_eq!(server.next_sent().await, "2:::");
    assert_eq!(server.next_sent().await, "2:::");

    harness.client.disconnect().await;
    assert!(matches!(harness.next().await, Lifecycle::Close(..)));

    // Whatever was flushed during shutdown, nothing follows it.
    while let Ok(Some(frame)) =
        tokio::time::timeout(Duration::from_millis(50), server.next_sent_opt()).await
    {
        assert_eq!(frame, "2:::");
    }
    server.assert_quiet().await;
}

// ════════════════════════════════════════════════════════════════════
// Misbehaving components
// ════════════════════════════════════════════════════════════════════

/// Handshake that parses a fixed response body.
struct RecordedHandshake(&'static str);

#[async_trait]
impl Handshake for RecordedHandshake {
    async fn negotiate(&self, _server_uri: &str) -> Result<Session, SocketIoError> {
        Ok(parse_handshake(self.0)?)
    }
}

struct PanickingConnector;

#[async_trait]
impl Connector for PanickingConnector {
    async fn connect(
        &self,
        _url: &str,
        _options: &SocketIoOptions,
    ) -> Result<TransportHalves, SocketIoError> {
        panic!("connector exploded")
    }
}

#[tokio::test]
async fn oversized_heartbeat_timeout_fails_the_attempt() {
    let (connector, mut servers) = MockConnector::new();
    let client = SocketIoClient::with_components(
        RecordedHandshake("abc123:18446744073709551615:10:websocket"),
        connector,
    );
    let (handler, mut lifecycle) = RecordingHandler::new();

    client.connect(URI, handler).unwrap();

    match next_lifecycle(&mut lifecycle).await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::CannotConnect);
            assert!(reason.contains("invalid timeout"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Failed);
    assert!(servers.try_recv().is_err());
}

#[tokio::test]
async fn zero_heartbeat_timeout_keeps_the_session_alive() {
    let (connector, mut servers) = MockConnector::new();
    let client =
        SocketIoClient::with_components(RecordedHandshake("abc123:0:10:websocket"), connector);
    let (handler, mut lifecycle) = RecordingHandler::new();

    client.connect(URI, handler).unwrap();
    let _server = tokio::time::timeout(WAIT, servers.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(next_lifecycle(&mut lifecycle).await, Lifecycle::Open);
    assert_eq!(
        client.session().unwrap().heartbeat_interval,
        DEFAULT_HEARTBEAT_INTERVAL
    );
    assert!(client.is_connected());
}

#[tokio::test]
async fn panicking_connector_fails_and_allows_reconnect() {
    let client = SocketIoClient::with_components(
        MockHandshake::ok("abc123", SLOW_HEARTBEAT),
        PanickingConnector,
    );
    let (handler, mut lifecycle) = RecordingHandler::new();

    client.connect(URI, handler).unwrap();

    match next_lifecycle(&mut lifecycle).await {
        Lifecycle::Close(code, reason) => {
            assert_eq!(code, CloseCode::CannotConnect);
            assert!(reason.contains("connector panicked: connector exploded"), "{reason}");
        }
        other => panic!("expected close, got {other:?}"),
    }
    assert_eq!(client.state(), ConnectionState::Failed);
    assert!(client.session().is_none());

    let (handler, _lifecycle) = RecordingHandler::new();
    tokio_test::assert_ok!(client.connect(URI, handler));
}
