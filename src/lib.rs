//! # Socket.IO 0.9 Client
//!
//! Async Rust client for the Socket.IO 0.9 protocol over WebSocket.
//!
//! The client negotiates a session over HTTP, opens the session's WebSocket,
//! keeps it alive with heartbeats, delivers named events to typed handlers and
//! acknowledges them, and queues outbound events for the writer.
//!
//! ## Features
//!
//! - **Typed events**: subscribe with any `serde::Deserialize` type, emit any
//!   `serde::Serialize` value
//! - **Pluggable I/O**: implement [`Handshake`] or
//!   [`Connector`](transport::Connector) to bring your own HTTP client or
//!   WebSocket library
//! - **Batteries included**: the default `handshake-http` feature provides
//!   `HttpHandshake` (`reqwest`) and `transport-websocket` provides
//!   `WebSocketConnector` (`tokio-tungstenite`)
//! - **Lifecycle callbacks**: [`ConnectionHandler`] is told when the
//!   connection opens and, exactly once per connect, when it closes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use socketio_legacy_client::{CloseCode, ConnectionHandler, SocketIoClient};
//!
//! struct Log;
//!
//! impl ConnectionHandler for Log {
//!     fn on_open(&self) {}
//!     fn on_close(&self, code: CloseCode, reason: &str) {
//!         eprintln!("closed: {code} ({reason})");
//!     }
//! }
//!
//! # async fn run() -> socketio_legacy_client::Result<()> {
//! let client = SocketIoClient::new();
//! client.connect("ws://localhost:8080", Log)?;
//! client.subscribe("news", |headline: String| println!("{headline}"));
//! client.emit("hello", &"world")?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod close_codes;
pub mod error;
pub mod handshake;
pub mod heartbeat;
pub mod protocol;
mod reader;
pub mod registry;
pub mod state;
pub mod transport;
pub mod transports;
mod writer;

// Re-export primary types for ergonomic imports.
pub use client::{ConnectionHandler, SocketIoClient, SocketIoOptions};
pub use close_codes::CloseCode;
pub use error::{Result, SocketIoError};
pub use handshake::{Handshake, Session};
pub use protocol::Message;
pub use registry::{EventRegistry, Subscription};
pub use state::ConnectionState;
pub use transport::{Connector, FrameSink, FrameStream};

#[cfg(feature = "handshake-http")]
pub use handshake::HttpHandshake;

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketConnector;
