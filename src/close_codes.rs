//! Close codes reported to [`ConnectionHandler::on_close`](crate::ConnectionHandler::on_close).
//!
//! The numbering follows the close codes of the Autobahn Android WebSocket
//! handler that Socket.IO 0.9 clients were commonly built on, so callers
//! porting code from those clients can keep their `match` arms.

use std::fmt;

/// Why a connection (or connection attempt) ended.
///
/// Use [`code()`](CloseCode::code) for the numeric value and
/// [`description()`](CloseCode::description) for a human-readable explanation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseCode {
    /// The connection was closed normally, by either side.
    Normal,
    /// The handshake or the WebSocket open failed.
    CannotConnect,
    /// The transport failed while the connection was open.
    ConnectionLost,
    /// The peer violated the protocol.
    ProtocolError,
    /// The client hit an internal error (e.g. an outbound frame could not be encoded).
    InternalError,
}

impl CloseCode {
    /// Numeric value of this close code.
    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 1,
            Self::CannotConnect => 2,
            Self::ConnectionLost => 3,
            Self::ProtocolError => 4,
            Self::InternalError => 5,
        }
    }

    /// Look up a close code by its numeric value.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::Normal),
            2 => Some(Self::CannotConnect),
            3 => Some(Self::ConnectionLost),
            4 => Some(Self::ProtocolError),
            5 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Returns a human-readable description of this close code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Normal => "The connection was closed normally.",
            Self::CannotConnect => {
                "Could not connect to the server. The handshake or the WebSocket upgrade failed."
            }
            Self::ConnectionLost => {
                "The connection to the server was lost. Call connect again to start a new session."
            }
            Self::ProtocolError => "The server violated the WebSocket or Socket.IO protocol.",
            Self::InternalError => {
                "The client failed internally while writing to the server and closed the connection."
            }
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
