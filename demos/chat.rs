//! # Chat Example
//!
//! Demonstrates a complete Socket.IO 0.9 client lifecycle:
//!
//! 1. Negotiate a session and open the WebSocket
//! 2. Subscribe to `chat` events with a typed payload
//! 3. Emit a `chat` event for every line typed on stdin
//! 4. Disconnect gracefully on Ctrl+C or when the server closes the connection
//!
//! ## Running
//!
//! ```sh
//! # Start a Socket.IO 0.9 server on localhost:8080, then:
//! cargo run --example chat
//!
//! # Override the server URI:
//! SOCKET_IO_URI=ws://my-server:8080 cargo run --example chat
//! ```

use serde::{Deserialize, Serialize};
use socketio_legacy_client::{CloseCode, ConnectionHandler, SocketIoClient, SocketIoError};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Default server URI when `SOCKET_IO_URI` is not set.
const DEFAULT_URI: &str = "ws://localhost:8080";

#[derive(Debug, Serialize, Deserialize)]
struct Chat {
    text: String,
}

/// Forwards the end of the connection to the main loop.
struct Lifecycle {
    closed: mpsc::UnboundedSender<(CloseCode, String)>,
}

impl ConnectionHandler for Lifecycle {
    fn on_open(&self) {
        tracing::info!("Connected; type a message and press enter");
    }

    fn on_close(&self, code: CloseCode, reason: &str) {
        let _ = self.closed.send((code, reason.to_owned()));
    }

    fn on_error(&self, error: &SocketIoError) {
        tracing::warn!("Ignored frame: {error}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=socketio_legacy_client=trace` to see every frame.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let uri = std::env::var("SOCKET_IO_URI").unwrap_or_else(|_| DEFAULT_URI.to_string());
    tracing::info!("Connecting to {uri}");

    // ── Connect ─────────────────────────────────────────────────────
    // `connect` returns immediately; the handshake runs in the background.
    let client = SocketIoClient::new();
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel();
    client.connect(&uri, Lifecycle { closed: closed_tx })?;

    // Subscriptions are cleared by `connect`, so register them afterwards.
    client.subscribe("chat", |chat: Chat| {
        println!("> {}", chat.text);
    });

    // ── Event loop ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            closed = closed_rx.recv() => {
                if let Some((code, reason)) = closed {
                    tracing::info!("Connection closed ({}): {reason}", code.code());
                }
                break;
            }

            line = lines.next_line() => match line? {
                Some(text) if !text.trim().is_empty() => {
                    if let Err(e) = client.emit("chat", &Chat { text }) {
                        tracing::warn!("Could not send: {e}");
                    }
                }
                Some(_) => {}
                None => {
                    client.disconnect().await;
                }
            },

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting");
                client.disconnect().await;
            }
        }
    }

    Ok(())
}
