//! Connection lifecycle states.

use std::fmt;

/// Lifecycle state of a [`SocketIoClient`](crate::SocketIoClient).
///
/// ```text
/// Idle -> Handshaking -> Opening -> Ready -> Closing -> Closed
///              |            |
///              +-> Failed <-+
/// ```
///
/// `connect` is accepted from `Idle`, `Closed` and `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    #[default]
    Idle,
    /// The HTTP handshake is in flight.
    Handshaking,
    /// The handshake succeeded and the WebSocket is being opened.
    Opening,
    /// The WebSocket is open; events flow in both directions.
    Ready,
    /// A terminal signal was received and the reader/writer are stopping.
    Closing,
    /// The connection closed after having been opened, or was disconnected.
    Closed,
    /// The handshake or the transport open failed.
    Failed,
}

impl ConnectionState {
    /// Returns `true` if `connect` may be called in this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Idle | Self::Closed | Self::Failed)
    }

    /// Returns `true` while a connection attempt or live connection exists.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Handshaking | Self::Opening | Self::Ready | Self::Closing
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Handshaking => "handshaking",
            Self::Opening => "opening",
            Self::Ready => "ready",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
