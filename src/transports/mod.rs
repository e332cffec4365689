//! Transport implementations for the Socket.IO client.
//!
//! Concrete [`Connector`](crate::transport::Connector) implementations live
//! behind feature gates:
//!
//! | Feature                | Connector              |
//! |------------------------|------------------------|
//! | `transport-websocket`  | [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketSink, WebSocketSource};
