//! # Custom Transport Example
//!
//! Shows how to plug your own I/O into [`SocketIoClient`] by implementing
//! [`Handshake`] and [`Connector`] with an in-process loopback. This is useful
//! for:
//!
//! - **Testing**: exercise your event handlers without a real server
//! - **Custom backends**: adapt any WebSocket library or proxy layer
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use socketio_legacy_client::transport::{Connector, FrameSink, FrameStream, TransportHalves};
use socketio_legacy_client::{
    CloseCode, ConnectionHandler, Handshake, Session, SocketIoClient, SocketIoError,
    SocketIoOptions,
};
use tokio::sync::{mpsc, oneshot};

// ─────────────────────────────────────────────────────────────────────
// Step 1: A handshake that needs no HTTP server
// ─────────────────────────────────────────────────────────────────────

struct StaticHandshake;

#[async_trait]
impl Handshake for StaticHandshake {
    async fn negotiate(&self, _server_uri: &str) -> Result<Session, SocketIoError> {
        Ok(Session {
            session_id: "loopback".to_owned(),
            heartbeat_interval: Duration::from_secs(10),
            close_timeout: None,
            transports: HashSet::from(["websocket".to_owned()]),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A loopback transport split into sink and stream halves
// ─────────────────────────────────────────────────────────────────────

/// Client half: frames the client writes go to the fake server.
struct LoopbackSink {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl FrameSink for LoopbackSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError> {
        self.tx
            .send(frame)
            .map_err(|e| SocketIoError::TransportSend(e.to_string()))
    }

    /// Close is a no-op for channels; dropping is sufficient.
    async fn close(&mut self) -> Result<(), SocketIoError> {
        Ok(())
    }
}

/// Client half: frames the fake server sends arrive here.
///
/// `mpsc::UnboundedReceiver::recv` is cancel-safe, so `next_frame` is too.
struct LoopbackStream {
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl FrameStream for LoopbackStream {
    async fn next_frame(&mut self) -> Option<Result<String, SocketIoError>> {
        self.rx.recv().await.map(Ok)
    }
}

/// The "server side" of the loopback, used to drive the conversation.
struct LoopbackServer {
    /// Frames the client sent.
    rx: mpsc::UnboundedReceiver<String>,
    /// Frames to deliver to the client.
    tx: mpsc::UnboundedSender<String>,
}

/// Hands out one loopback pair per connect.
struct LoopbackConnector {
    servers: mpsc::UnboundedSender<LoopbackServer>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(
        &self,
        url: &str,
        _options: &SocketIoOptions,
    ) -> Result<TransportHalves, SocketIoError> {
        tracing::info!("loopback connect to {url}");
        let (client_tx, server_rx) = mpsc::unbounded_channel();
        let (server_tx, client_rx) = mpsc::unbounded_channel();

        self.servers
            .send(LoopbackServer {
                rx: server_rx,
                tx: server_tx,
            })
            .map_err(|_| SocketIoError::TransportClosed)?;

        Ok((
            Box::new(LoopbackSink { tx: client_tx }),
            Box::new(LoopbackStream { rx: client_rx }),
        ))
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: Wire together the client and the fake server
// ─────────────────────────────────────────────────────────────────────

struct Lifecycle {
    closed: Mutex<Option<oneshot::Sender<()>>>,
}

impl ConnectionHandler for Lifecycle {
    fn on_open(&self) {
        tracing::info!("connection open");
    }

    fn on_close(&self, code: CloseCode, reason: &str) {
        tracing::info!("connection closed: {code} ({reason})");
        if let Ok(mut closed) = self.closed.lock() {
            if let Some(tx) = closed.take() {
                let _ = tx.send(());
            }
        }
    }

    fn on_error(&self, error: &SocketIoError) {
        tracing::warn!("connection error: {error}");
    }
}

#[derive(Debug, Deserialize)]
struct Greeting {
    text: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing for readable output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (servers_tx, mut servers) = mpsc::unbounded_channel();
    let client = SocketIoClient::with_components(
        StaticHandshake,
        LoopbackConnector {
            servers: servers_tx,
        },
    );

    let (closed_tx, closed_rx) = oneshot::channel();
    client.connect(
        "ws://loopback",
        Lifecycle {
            closed: Mutex::new(Some(closed_tx)),
        },
    )?;
    client.subscribe("greeting", |greeting: Greeting| {
        tracing::info!("client received greeting: {}", greeting.text);
    });

    let Some(mut server) = servers.recv().await else {
        return Err("client never opened a transport".into());
    };

    // ── Fake server: greet the client and wait for the ack ──────────
    server
        .tx
        .send(r#"5:1::{"name":"greeting","args":[{"text":"hello from the loopback"}]}"#.into())?;
    if let Some(frame) = server.rx.recv().await {
        tracing::info!("server received: {frame}");
    }

    // ── Client emits; server reads the frame ────────────────────────
    client.emit("reply", &serde_json::json!({ "text": "hi back" }))?;
    if let Some(frame) = server.rx.recv().await {
        tracing::info!("server received: {frame}");
    }

    // ── Server hangs up ─────────────────────────────────────────────
    drop(server);
    closed_rx.await?;

    tracing::info!("final state: {}", client.state());
    Ok(())
}
