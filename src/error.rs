//! Error types for the Socket.IO client.

use thiserror::Error;

use crate::state::ConnectionState;

/// Errors that can occur when using the Socket.IO client.
#[derive(Debug, Error)]
pub enum SocketIoError {
    /// The session handshake failed. Fatal to the connect attempt.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// A single inbound frame could not be decoded. The connection continues.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An outbound message could not be encoded into a frame.
    #[error("encode error: {0}")]
    Encode(String),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The peer broke the transport or wire protocol. Fatal to the connection.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize an application payload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The outbound queue is full.
    #[error("outbound queue is full")]
    QueueFull,

    /// The operation is not valid in the current connection state.
    #[error("operation not allowed in state {0}")]
    InvalidState(ConnectionState),

    /// The supplied options cannot be used with this protocol.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The server sent an error frame.
    #[error("server error on endpoint {endpoint:?}: {reason}")]
    Server {
        /// Endpoint the error refers to (empty for the default endpoint).
        endpoint: String,
        /// Reason given by the server.
        reason: String,
        /// Advice given by the server, if any.
        advice: Option<String>,
    },

    /// An event handler panicked while processing an event.
    #[error("handler for event {event:?} panicked: {message}")]
    HandlerPanicked {
        /// Name of the event being delivered.
        event: String,
        /// Panic payload rendered as text.
        message: String,
    },

    /// A pluggable connection component panicked during a connect attempt.
    #[error("{component} panicked: {message}")]
    ComponentPanicked {
        /// Which component panicked (`handshake` or `connector`).
        component: &'static str,
        /// Panic payload rendered as text.
        message: String,
    },

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reasons a session handshake can fail.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// The server URI does not use a `ws://` or `wss://` scheme.
    #[error("unsupported server URI {0:?} (expected ws:// or wss://)")]
    InvalidUri(String),

    /// The handshake request could not be completed.
    #[error("handshake request failed: {0}")]
    Request(String),

    /// The response body is not a `sid:heartbeat:close:transports` record.
    #[error("malformed handshake response {0:?}")]
    MalformedResponse(String),

    /// A timeout field is present but not a number of seconds.
    #[error("invalid timeout value {0:?} in handshake response")]
    InvalidTimeout(String),

    /// The server does not offer the websocket transport.
    #[error("websocket not supported by server (transports: {0})")]
    WebSocketUnsupported(String),
}

/// Reasons a single inbound frame can fail to decode.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame was empty.
    #[error("empty frame")]
    EmptyFrame,

    /// The leading field is not an integer message type.
    #[error("invalid message type {0:?}")]
    InvalidType(String),

    /// The message type is an integer but not one the protocol defines.
    #[error("unknown message type {0}")]
    UnknownType(u8),

    /// A field required by the message type is missing.
    #[error("missing {field} in frame {frame:?}")]
    MissingField {
        /// Name of the missing field.
        field: &'static str,
        /// The offending frame.
        frame: String,
    },

    /// The event data is not valid JSON of the expected shape.
    #[error("malformed event data: {0}")]
    Json(#[source] serde_json::Error),

    /// The event payload does not match the subscribed type.
    #[error("payload for event {event:?} does not match {target_type}: {source}")]
    Payload {
        /// Name of the event.
        event: String,
        /// Type the subscription expected.
        target_type: &'static str,
        /// Underlying deserialization failure.
        #[source]
        source: serde_json::Error,
    },
}

/// A specialized [`Result`] type for Socket.IO client operations.
pub type Result<T> = std::result::Result<T, SocketIoError>;
