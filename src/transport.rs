//! Transport abstraction for the Socket.IO client.
//!
//! The client talks to the server through an abstract bidirectional text frame
//! channel split into two halves, so the reader and writer tasks can each own
//! one:
//!
//! - [`FrameSink`]: sends text frames and closes the channel (writer task)
//! - [`FrameStream`]: yields inbound text frames (reader task)
//!
//! A [`Connector`] opens a channel to a URL and returns both halves. The
//! `transport-websocket` feature provides
//! [`WebSocketConnector`](crate::transports::WebSocketConnector); any other
//! WebSocket library can be plugged in by implementing these traits.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use socketio_legacy_client::error::SocketIoError;
//! use socketio_legacy_client::transport::{Connector, FrameSink, FrameStream, TransportHalves};
//! use socketio_legacy_client::SocketIoOptions;
//!
//! struct MySink { /* ... */ }
//! struct MyStream { /* ... */ }
//! struct MyConnector;
//!
//! #[async_trait]
//! impl FrameSink for MySink {
//!     async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError> {
//!         // Write one text frame
//!         # unimplemented!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SocketIoError> {
//!         // Start the closing handshake
//!         # unimplemented!()
//!     }
//! }
//!
//! #[async_trait]
//! impl FrameStream for MyStream {
//!     async fn next_frame(&mut self) -> Option<Result<String, SocketIoError>> {
//!         // Return the next text frame, or None once the peer closed
//!         # unimplemented!()
//!     }
//! }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(
//!         &self,
//!         url: &str,
//!         options: &SocketIoOptions,
//!     ) -> Result<TransportHalves, SocketIoError> {
//!         Ok((Box::new(MySink {}), Box::new(MyStream {})))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::client::SocketIoOptions;
use crate::error::SocketIoError;

/// Sub-protocol requested during the WebSocket upgrade.
pub const SOCKET_IO_SUBPROTOCOL: &str = "socket.io";

/// Both halves of an open transport.
pub type TransportHalves = (Box<dyn FrameSink>, Box<dyn FrameStream>);

/// Outbound half of a transport.
#[async_trait]
pub trait FrameSink: Send + 'static {
    /// Send one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`SocketIoError::TransportSend`] if the frame could not be sent,
    /// or [`SocketIoError::TransportClosed`] after [`close`](FrameSink::close).
    async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError>;

    /// Close the transport gracefully. Calling it twice must be harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), SocketIoError>;
}

/// Inbound half of a transport.
#[async_trait]
pub trait FrameStream: Send + 'static {
    /// Receive the next text frame.
    ///
    /// Returns:
    /// - `Some(Ok(text))`: a complete frame was received
    /// - `Some(Err(e))`: the transport failed (e.g. [`SocketIoError::TransportReceive`])
    /// - `None`: the peer closed the connection
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe: the reader polls it inside
    /// `tokio::select!` and drops the future on shutdown.
    async fn next_frame(&mut self) -> Option<Result<String, SocketIoError>>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a transport to `url` (the session's WebSocket URL), requesting the
    /// [`SOCKET_IO_SUBPROTOCOL`] sub-protocol and honouring the transport
    /// settings in `options`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    async fn connect(
        &self,
        url: &str,
        options: &SocketIoOptions,
    ) -> Result<TransportHalves, SocketIoError>;
}
