//! Session negotiation.
//!
//! Before opening the WebSocket, a Socket.IO 0.9 client `POST`s to
//! `http(s)://<host>/socket.io/1/` and receives a colon-separated record:
//!
//! ```text
//! <session id>:<heartbeat timeout s>:<close timeout s>:<transport,transport,...>
//! ```
//!
//! [`parse_handshake`] turns that record into a [`Session`]; the [`Handshake`]
//! trait abstracts the HTTP request so the connection can be driven by any
//! client (the `handshake-http` feature provides [`HttpHandshake`]).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{HandshakeError, SocketIoError};

/// Heartbeat interval used when the server does not advertise a heartbeat timeout.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Path of the handshake endpoint, relative to the server root.
pub const HANDSHAKE_PATH: &str = "/socket.io/1/";

/// Path prefix of the WebSocket endpoint; the session id is appended.
pub const WEBSOCKET_PATH: &str = "/socket.io/1/websocket/";

/// Transport name the server must offer.
pub const WEBSOCKET_TRANSPORT: &str = "websocket";

/// Parameters negotiated for one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Session id assigned by the server.
    pub session_id: String,
    /// How often the client sends heartbeats: half the server's heartbeat timeout.
    pub heartbeat_interval: Duration,
    /// Close timeout advertised by the server, if any. Informational.
    pub close_timeout: Option<Duration>,
    /// Transports the server offers.
    pub transports: HashSet<String>,
}

impl Session {
    /// Returns `true` if the server offers `transport`.
    pub fn supports(&self, transport: &str) -> bool {
        self.transports.contains(transport)
    }
}

/// Performs the one-shot session negotiation.
#[async_trait]
pub trait Handshake: Send + Sync + 'static {
    /// Negotiate a session with the server at `server_uri` (a `ws://` or `wss://` URI).
    ///
    /// # Errors
    ///
    /// Returns [`SocketIoError::Handshake`] if the request fails, the response
    /// is malformed, or the server does not offer the websocket transport.
    async fn negotiate(&self, server_uri: &str) -> Result<Session, SocketIoError>;
}

/// Derive the handshake URL from a WebSocket server URI.
///
/// `ws://host:port` becomes `http://host:port/socket.io/1/` and `wss://`
/// becomes `https://`.
///
/// # Errors
///
/// Returns [`HandshakeError::InvalidUri`] for any other scheme.
pub fn handshake_url(server_uri: &str) -> Result<String, HandshakeError> {
    let rest = server_uri
        .strip_prefix("ws")
        .filter(|rest| rest.starts_with("://") || rest.starts_with("s://"))
        .ok_or_else(|| HandshakeError::InvalidUri(server_uri.to_owned()))?;
    Ok(format!("http{}{HANDSHAKE_PATH}", rest.trim_end_matches('/')))
}

/// WebSocket URL of the session `session_id` on the server at `server_uri`.
pub fn websocket_url(server_uri: &str, session_id: &str) -> String {
    format!(
        "{}{WEBSOCKET_PATH}{session_id}",
        server_uri.trim_end_matches('/')
    )
}

/// Parse a handshake response body into a [`Session`].
///
/// The heartbeat interval is half the advertised heartbeat timeout, or
/// [`DEFAULT_HEARTBEAT_INTERVAL`] when the timeout field is empty or zero.
///
/// # Errors
///
/// Returns a [`HandshakeError`] if the body does not have exactly four fields,
/// the session id is empty, a timeout is not a number (or too large to express
/// in milliseconds), or `websocket` is not among the transports.
pub fn parse_handshake(body: &str) -> Result<Session, HandshakeError> {
    let body = body.trim();
    let fields: Vec<&str> = body.split(':').collect();
    let [session_id, heartbeat, close, transport_list] = fields.as_slice() else {
        return Err(HandshakeError::MalformedResponse(body.to_owned()));
    };
    if session_id.is_empty() {
        return Err(HandshakeError::MalformedResponse(body.to_owned()));
    }

    let heartbeat_interval = match parse_seconds(heartbeat)? {
        Some(0) | None => DEFAULT_HEARTBEAT_INTERVAL,
        Some(timeout_secs) => timeout_secs
            .checked_mul(1000)
            .map(|ms| Duration::from_millis(ms / 2))
            .ok_or_else(|| HandshakeError::InvalidTimeout((*heartbeat).trim().to_owned()))?,
    };
    let close_timeout = parse_seconds(close)?.map(Duration::from_secs);

    let transports: HashSet<String> = transport_list
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_owned)
        .collect();
    if !transports.contains(WEBSOCKET_TRANSPORT) {
        return Err(HandshakeError::WebSocketUnsupported((*transport_list).to_owned()));
    }

    Ok(Session {
        session_id: (*session_id).to_owned(),
        heartbeat_interval,
        close_timeout,
        transports,
    })
}

fn parse_seconds(field: &str) -> Result<Option<u64>, HandshakeError> {
    let field = field.trim();
    if field.is_empty() {
        return Ok(None);
    }
    field
        .parse()
        .map(Some)
        .map_err(|_| HandshakeError::InvalidTimeout(field.to_owned()))
}

#[cfg(feature = "handshake-http")]
pub use http::HttpHandshake;

#[cfg(feature = "handshake-http")]
mod http {
    use async_trait::async_trait;

    use super::{handshake_url, parse_handshake, Handshake, Session};
    use crate::error::{HandshakeError, SocketIoError};

    /// [`Handshake`] implementation backed by `reqwest`.
    ///
    /// The request timeout is applied by the connection from
    /// [`SocketIoOptions::handshake_timeout`](crate::SocketIoOptions::handshake_timeout).
    #[derive(Debug, Clone, Default)]
    pub struct HttpHandshake {
        client: reqwest::Client,
    }

    impl HttpHandshake {
        /// Create a handshake client with a default `reqwest` client.
        pub fn new() -> Self {
            Self::default()
        }

        /// Use an existing `reqwest` client (custom TLS, proxies, headers).
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }
    }

    #[async_trait]
    impl Handshake for HttpHandshake {
        async fn negotiate(&self, server_uri: &str) -> Result<Session, SocketIoError> {
            let url = handshake_url(server_uri)?;
            tracing::debug!(url = %url, "requesting Socket.IO session");

            let response = self
                .client
                .post(&url)
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| HandshakeError::Request(e.to_string()))?;
            let body = response
                .text()
                .await
                .map_err(|e| HandshakeError::Request(e.to_string()))?;

            let session = parse_handshake(&body)?;
            tracing::info!(
                session_id = %session.session_id,
                heartbeat_ms = session.heartbeat_interval.as_millis() as u64,
                "Socket.IO session negotiated"
            );
            Ok(session)
        }
    }
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

    #[test]
    fn heartbeat_is_half_the_server_timeout() {
        let session = parse_handshake("abc123:15:10:websocket,polling").unwrap();
        assert_eq!(session.session_id, "abc123");
        assert_eq!(session.heartbeat_interval, Duration::from_millis(7500));
        assert_eq!(session.close_timeout, Some(Duration::from_secs(10)));
        assert!(session.supports("websocket"));
        assert!(session.supports("polling"));
    }

    #[test]
    fn empty_heartbeat_uses_default() {
        let session = parse_handshake("sid::25:websocket").unwrap();
        assert_eq!(session.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn zero_heartbeat_uses_default() {
        let session = parse_handshake("sid:0:10:websocket").unwrap();
        assert_eq!(session.heartbeat_interval, DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn oversized_heartbeat_is_rejected() {
        assert_eq!(
            parse_handshake("sid:18446744073709551615:10:websocket"),
            Err(HandshakeError::InvalidTimeout("18446744073709551615".into()))
        );
        let largest = u64::MAX / 1000;
        let session = parse_handshake(&format!("sid:{largest}:10:websocket")).unwrap();
        assert_eq!(session.heartbeat_interval, Duration::from_millis(largest * 1000 / 2));
    }

    #[test]
    fn trailing_newline_is_ignored() {
        let session = parse_handshake("sid:60:60:websocket\n").unwrap();
        assert_eq!(session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(session.transports.len(), 1);
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        assert!(matches!(
            parse_handshake("sid:15:websocket"),
            Err(HandshakeError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_handshake("sid:15:10:websocket:extra"),
            Err(HandshakeError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_handshake(":15:10:websocket"),
            Err(HandshakeError::MalformedResponse(_))
        ));
    }

    #[test]
    fn non_numeric_timeout_is_rejected() {
        assert_eq!(
            parse_handshake("sid:soon:10:websocket"),
            Err(HandshakeError::InvalidTimeout("soon".into()))
        );
    }

    #[test]
    fn missing_websocket_transport_is_rejected() {
        assert_eq!(
            parse_handshake("sid:15:10:xhr-polling,jsonp-polling"),
            Err(HandshakeError::WebSocketUnsupported(
                "xhr-polling,jsonp-polling".into()
            ))
        );
    }

    #[test]
    fn handshake_url_substitutes_scheme() {
        assert_eq!(
            handshake_url("ws://localhost:8080").unwrap(),
            "http://localhost:8080/socket.io/1/"
        );
        assert_eq!(
            handshake_url("wss://example.com/").unwrap(),
            "https://example.com/socket.io/1/"
        );
        assert!(matches!(
            handshake_url("http://example.com"),
            Err(HandshakeError::InvalidUri(_))
        ));
        assert!(matches!(
            handshake_url("wsx://example.com"),
            Err(HandshakeError::InvalidUri(_))
        ));
    }

    #[test]
    fn websocket_url_appends_session() {
        assert_eq!(
            websocket_url("ws://localhost:8080/", "abc123"),
            "ws://localhost:8080/socket.io/1/websocket/abc123"
        );
    }
}
