#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for the Socket.IO client integration tests.
//!
//! Provides a channel-based [`MockConnector`] whose connections are driven
//! from the test through a [`MockServer`], a scripted [`MockHandshake`], and a
//! [`RecordingHandler`] that forwards lifecycle callbacks to a channel.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use socketio_legacy_client::error::HandshakeError;
use socketio_legacy_client::transport::{Connector, FrameSink, FrameStream, TransportHalves};
use socketio_legacy_client::{
    CloseCode, ConnectionHandler, Handshake, Session, SocketIoError, SocketIoOptions,
};
use tokio::sync::mpsc;

/// How long helpers wait for something that is expected to happen.
pub const WAIT: Duration = Duration::from_secs(2);

/// How long helpers wait to conclude that nothing happens.
pub const QUIET: Duration = Duration::from_millis(100);

// ── MockHandshake ───────────────────────────────────────────────────

/// A handshake that answers every negotiation with the same result.
pub struct MockHandshake {
    result: Result<Session, HandshakeError>,
    /// Server URIs passed to `negotiate`.
    pub requests: Arc<StdMutex<Vec<String>>>,
}

impl MockHandshake {
    /// Succeed with session `session_id` and the given heartbeat interval.
    pub fn ok(session_id: &str, heartbeat_interval: Duration) -> Self {
        Self {
            result: Ok(session(session_id, heartbeat_interval)),
            requests: Arc::default(),
        }
    }

    /// Fail every negotiation with `error`.
    pub fn failing(error: HandshakeError) -> Self {
        Self {
            result: Err(error),
            requests: Arc::default(),
        }
    }
}

#[async_trait]
impl Handshake for MockHandshake {
    async fn negotiate(&self, server_uri: &str) -> Result<Session, SocketIoError> {
        self.requests.lock().unwrap().push(server_uri.to_owned());
        self.result.clone().map_err(SocketIoError::from)
    }
}

/// Build a session offering the websocket transport.
pub fn session(session_id: &str, heartbeat_interval: Duration) -> Session {
    Session {
        session_id: session_id.to_owned(),
        heartbeat_interval,
        close_timeout: Some(Duration::from_secs(25)),
        transports: HashSet::from(["websocket".to_owned()]),
    }
}

// ── MockConnector / MockServer ──────────────────────────────────────

/// Connector whose transports are handed to the test as [`MockServer`]s.
pub struct MockConnector {
    servers: mpsc::UnboundedSender<MockServer>,
    refuse: Option<String>,
}

impl MockConnector {
    /// Create a connector plus the receiver yielding one server per connect.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (servers, rx) = mpsc::unbounded_channel();
        (
            Self {
                servers,
                refuse: None,
            },
            rx,
        )
    }

    /// Create a connector that refuses every connection with `reason`.
    pub fn refusing(reason: &str) -> Self {
        let (servers, _rx) = mpsc::unbounded_channel();
        Self {
            servers,
            refuse: Some(reason.to_owned()),
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        url: &str,
        _options: &SocketIoOptions,
    ) -> Result<TransportHalves, SocketIoError> {
        if let Some(reason) = &self.refuse {
            return Err(SocketIoError::TransportSend(reason.clone()));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let server = MockServer {
            url: url.to_owned(),
            to_client: Some(to_client),
            from_client,
            closed: Arc::clone(&closed),
        };
        self.servers
            .send(server)
            .map_err(|_| SocketIoError::TransportClosed)?;

        let sink = MockSink { to_server, closed };
        let stream = MockStream { from_server };
        Ok((Box::new(sink), Box::new(stream)))
    }
}

/// The server side of one mock transport.
pub struct MockServer {
    /// URL the client connected to.
    pub url: String,
    to_client: Option<mpsc::UnboundedSender<Result<String, SocketIoError>>>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Send a text frame to the client.
    pub fn push(&self, frame: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Ok(frame.to_owned()));
        }
    }

    /// Make the client's next receive fail.
    pub fn fail(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(SocketIoError::TransportReceive(reason.to_owned())));
        }
    }

    /// Make the client's next receive report a protocol violation.
    pub fn violate(&self, reason: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.send(Err(SocketIoError::ProtocolViolation(reason.to_owned())));
        }
    }

    /// Close the server side; the client sees the end of the stream.
    pub fn close(&mut self) {
        self.to_client = None;
    }

    /// Wait for the next frame written by the client.
    pub async fn next_sent(&mut self) -> String {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client sink dropped")
    }

    /// Next frame written by the client, or `None` once its sink is gone.
    pub async fn next_sent_opt(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Assert the client writes nothing for a short while.
    pub async fn assert_quiet(&mut self) {
        if let Ok(Some(frame)) = tokio::time::timeout(QUIET, self.from_client.recv()).await {
            panic!("unexpected client frame {frame:?}");
        }
    }

    /// Whether the client closed its sink.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct MockSink {
    to_server: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SocketIoError::TransportClosed);
        }
        self.to_server
            .send(frame)
            .map_err(|e| SocketIoError::TransportSend(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SocketIoError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct MockStream {
    from_server: mpsc::UnboundedReceiver<Result<String, SocketIoError>>,
}

#[async_trait]
impl FrameStream for MockStream {
    async fn next_frame(&mut self) -> Option<Result<String, SocketIoError>> {
        self.from_server.recv().await
    }
}

// ── RecordingHandler ────────────────────────────────────────────────

/// A lifecycle callback, as seen by [`RecordingHandler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lifecycle {
    Open,
    Close(CloseCode, String),
    Error(String),
}

/// Forwards every callback to a channel.
pub struct RecordingHandler {
    events: mpsc::UnboundedSender<Lifecycle>,
}

impl RecordingHandler {
    /// Create a handler plus the receiver of its callbacks.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Lifecycle>) {
        let (events, rx) = mpsc::unbounded_channel();
        (Self { events }, rx)
    }
}

impl ConnectionHandler for RecordingHandler {
    fn on_open(&self) {
        let _ = self.events.send(Lifecycle::Open);
    }

    fn on_close(&self, code: CloseCode, reason: &str) {
        let _ = self.events.send(Lifecycle::Close(code, reason.to_owned()));
    }

    fn on_error(&self, error: &SocketIoError) {
        let _ = self.events.send(Lifecycle::Error(error.to_string()));
    }
}

/// Wait for the next lifecycle callback.
pub async fn next_lifecycle(rx: &mut mpsc::UnboundedReceiver<Lifecycle>) -> Lifecycle {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for a lifecycle callback")
        .expect("handler dropped")
}

/// Assert no lifecycle callback arrives for a short while.
pub async fn assert_no_lifecycle(rx: &mut mpsc::UnboundedReceiver<Lifecycle>) {
    if let Ok(Some(event)) = tokio::time::timeout(QUIET, rx.recv()).await {
        panic!("unexpected lifecycle callback {event:?}");
    }
}
