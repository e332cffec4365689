//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] opens a WebSocket (both `ws://` and `wss://`),
//! requests the `socket.io` sub-protocol, applies the payload limits and
//! `TCP_NODELAY` setting from [`SocketIoOptions`], and splits the stream into a
//! [`WebSocketSink`] and a [`WebSocketSource`].
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is
//! enabled (it is enabled by default).

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::protocol::{Message, WebSocketConfig};
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::client::SocketIoOptions;
use crate::error::SocketIoError;
use crate::transport::{Connector, FrameSink, FrameStream, TransportHalves, SOCKET_IO_SUBPROTOCOL};

/// Type alias for the underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a new connector.
    pub fn new() -> Self {
        Self
    }

    /// Split an already-established WebSocket stream into transport halves.
    ///
    /// Useful when the upgrade needs custom TLS, proxy headers, or anything
    /// else [`Connector::connect`] does not expose.
    pub fn from_stream(stream: WsStream) -> (WebSocketSink, WebSocketSource) {
        let (sink, source) = stream.split();
        (
            WebSocketSink { sink, closed: false },
            WebSocketSource { source },
        )
    }
}

fn websocket_config(options: &SocketIoOptions) -> WebSocketConfig {
    WebSocketConfig::default()
        .max_message_size(Some(options.max_message_payload_size))
        .max_frame_size(Some(options.max_frame_payload_size))
}

fn io_error(e: tokio_tungstenite::tungstenite::Error) -> SocketIoError {
    let kind = match &e {
        tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    SocketIoError::Io(std::io::Error::new(kind, e))
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(
        &self,
        url: &str,
        options: &SocketIoOptions,
    ) -> Result<TransportHalves, SocketIoError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let mut request = url.into_client_request().map_err(io_error)?;
        request.headers_mut().insert(
            SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(SOCKET_IO_SUBPROTOCOL),
        );

        let (stream, _response) = tokio_tungstenite::connect_async_with_config(
            request,
            Some(websocket_config(options)),
            options.tcp_no_delay,
        )
        .await
        .map_err(io_error)?;

        tracing::info!(url = %url, "WebSocket connection established");

        let (sink, source) = Self::from_stream(stream);
        Ok((Box::new(sink), Box::new(source)))
    }
}

/// Outbound half of a WebSocket transport.
#[derive(Debug)]
pub struct WebSocketSink {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError> {
        if self.closed {
            return Err(SocketIoError::TransportClosed);
        }
        self.sink
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SocketIoError::TransportSend(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), SocketIoError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.sink
            .close()
            .await
            .map_err(|e| SocketIoError::TransportSend(e.to_string()))
    }
}

/// Inbound half of a WebSocket transport.
///
/// # Cancel Safety
///
/// [`next_frame`](FrameStream::next_frame) only awaits `StreamExt::next`, so
/// dropping it before completion loses no frames.
#[derive(Debug)]
pub struct WebSocketSource {
    source: SplitStream<WsStream>,
}

#[async_trait]
impl FrameStream for WebSocketSource {
    async fn next_frame(&mut self) -> Option<Result<String, SocketIoError>> {
        loop {
            let msg = match self.source.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e @ WsError::Protocol(_))) => {
                    return Some(Err(SocketIoError::ProtocolViolation(e.to_string())));
                }
                Some(Err(e)) => {
                    return Some(Err(SocketIoError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) => {
                    // tungstenite queues the pong itself.
                    tracing::trace!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::trace!("received WebSocket pong");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    #[test]
    fn halves_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketSink>();
        assert_send::<WebSocketSource>();
        assert_send::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let result = WebSocketConnector
            .connect("not-a-valid-url", &SocketIoOptions::default())
            .await;
        assert!(matches!(result, Err(SocketIoError::Io(_))));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let result = WebSocketConnector
            .connect("ws://127.0.0.1:1", &SocketIoOptions::default())
            .await;
        assert!(matches!(result, Err(SocketIoError::Io(_))));
    }

    /// Start a local WebSocket server that answers the `socket.io`
    /// sub-protocol, runs `handler` on the accepted connection, and returns the
    /// URL to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, mut resp: Response| -> Result<Response, ErrorResponse> {
                assert_eq!(
                    req.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
                    SOCKET_IO_SUBPROTOCOL
                );
                resp.headers_mut().insert(
                    SEC_WEBSOCKET_PROTOCOL,
                    HeaderValue::from_static(SOCKET_IO_SUBPROTOCOL),
                );
                Ok(resp)
            };
            let ws = tokio_tungstenite::accept_hdr_async(tcp, callback)
                .await
                .unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    async fn connect(url: &str) -> (Box<dyn FrameSink>, Box<dyn FrameStream>) {
        WebSocketConnector
            .connect(url, &SocketIoOptions::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn next_frame_yields_text_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("1::".into())).await.unwrap();
            ws.send(Message::Text("2::".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (_sink, mut source) = connect(&url).await;

        assert_eq!(source.next_frame().await.unwrap().unwrap(), "1::");
        assert_eq!(source.next_frame().await.unwrap().unwrap(), "2::");
        assert!(source.next_frame().await.is_none());
    }

    #[tokio::test]
    async fn next_frame_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("8::".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let (_sink, mut source) = connect(&url).await;
        assert_eq!(source.next_frame().await.unwrap().unwrap(), "8::");
    }

    #[tokio::test]
    async fn send_frame_reaches_server() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = tx.send(text.to_string());
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let (mut sink, _source) = connect(&url).await;
        sink.send_frame("2:::".to_string()).await.unwrap();

        assert_eq!(rx.await.unwrap(), "2:::");
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let (mut sink, _source) = connect(&url).await;
        sink.close().await.unwrap();
        // Second close is a no-op.
        sink.close().await.unwrap();

        let err = sink.send_frame("2:::".to_string()).await.unwrap_err();
        assert!(matches!(err, SocketIoError::TransportClosed));
    }
}
