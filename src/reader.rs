//! Reader half of a connection.
//!
//! The reader owns the transport's [`FrameStream`] and processes inbound
//! frames one at a time, in arrival order. Event frames are delivered to the
//! matching [`Subscription`](crate::registry::Subscription) and acknowledged;
//! everything that only concerns a single frame (undecodable data, payload type
//! mismatches, panicking handlers, server error frames) is reported through
//! [`ConnectionHandler::on_error`] and the loop keeps going.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, trace, warn};

use crate::client::{ConnectionHandler, Control};
use crate::close_codes::CloseCode;
use crate::error::SocketIoError;
use crate::protocol::{self, Message};
use crate::registry::{DeliveryError, EventRegistry};
use crate::transport::FrameStream;

/// Read frames until shutdown or until the transport ends.
///
/// The end of the transport is reported once on `control`: a clean close as
/// [`CloseCode::Normal`], a protocol violation as [`CloseCode::ProtocolError`],
/// any other receive error as [`CloseCode::ConnectionLost`].
pub(crate) async fn run_reader(
    mut source: Box<dyn FrameStream>,
    registry: Arc<EventRegistry>,
    outbound: mpsc::Sender<Message>,
    handler: Arc<dyn ConnectionHandler>,
    mut shutdown: watch::Receiver<bool>,
    control: mpsc::UnboundedSender<Control>,
) {
    debug!("reader started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => break,

            frame = source.next_frame() => match frame {
                Some(Ok(text)) => {
                    trace!(frame = %text, "received frame");
                    if let Some(ack) = dispatch_frame(&text, &registry, handler.as_ref()) {
                        if outbound.send(ack).await.is_err() {
                            debug!("outbound queue closed, ack dropped");
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("transport receive error: {e}");
                    let code = match e {
                        SocketIoError::ProtocolViolation(_) => CloseCode::ProtocolError,
                        _ => CloseCode::ConnectionLost,
                    };
                    let _ = control.send(Control::Closed {
                        code,
                        reason: e.to_string(),
                    });
                    break;
                }
                None => {
                    debug!("transport closed by server");
                    let _ = control.send(Control::Closed {
                        code: CloseCode::Normal,
                        reason: "connection closed by server".to_owned(),
                    });
                    break;
                }
            }
        }
    }

    debug!("reader exited");
}

/// Process one inbound frame and return the acknowledgment to send, if any.
///
/// An event for a subscribed name is acknowledged once the handler has run,
/// whether it returned or panicked. Events nobody subscribed to, and events
/// whose payload does not fit the subscribed type, are not acknowledged.
pub(crate) fn dispatch_frame(
    frame: &str,
    registry: &EventRegistry,
    handler: &dyn ConnectionHandler,
) -> Option<Message> {
    let message = match protocol::decode(frame) {
        Ok(message) => message,
        Err(e) => {
            warn!(frame = %frame, "dropping frame: {e}");
            handler.on_error(&SocketIoError::Decode(e));
            return None;
        }
    };

    match message {
        Message::Event {
            id,
            endpoint,
            name,
            payload,
        } => {
            let Some(subscription) = registry.lookup(&name) else {
                debug!(event = %name, "no subscription for event, dropping");
                return None;
            };
            trace!(event = %name, endpoint = %endpoint, "delivering event");
            match subscription.deliver(payload) {
                Ok(()) => {}
                Err(DeliveryError::Decode(e)) => {
                    warn!(event = %name, "dropping event: {e}");
                    handler.on_error(&SocketIoError::Decode(e));
                    return None;
                }
                Err(DeliveryError::Handler(message)) => {
                    error!(event = %name, "event handler panicked: {message}");
                    handler.on_error(&SocketIoError::HandlerPanicked {
                        event: name,
                        message,
                    });
                }
            }
            Some(Message::ack_for(&id))
        }
        Message::Connect { endpoint, params } => {
            info!(endpoint = %endpoint, params = %params, "server confirmed connection");
            None
        }
        Message::Heartbeat => {
            trace!("heartbeat received");
            None
        }
        Message::Text { .. } | Message::Json { .. } => {
            debug!(
                kind = %message.message_type(),
                "message type not supported, ignoring"
            );
            None
        }
        Message::Ack { id, .. } => {
            trace!(id = %id, "ack received");
            None
        }
        Message::Error {
            endpoint,
            reason,
            advice,
        } => {
            warn!(endpoint = %endpoint, reason = %reason, ?advice, "server reported an error");
            handler.on_error(&SocketIoError::Server {
                endpoint,
                reason,
                advice,
            });
            None
        }
        Message::Disconnect { endpoint } => {
            debug!(?endpoint, "server sent disconnect");
            None
        }
        Message::Noop | Message::Emit { .. } => None,
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
    use serde::Deserialize;
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Chat {
        text: String,
    }

    #[derive(Default)]
    struct ErrorLog(Mutex<Vec<String>>);

    impl ConnectionHandler for ErrorLog {
        fn on_open(&self) {}
        fn on_close(&self, _code: CloseCode, _reason: &str) {}
        fn on_error(&self, error: &SocketIoError) {
            self.0.lock().unwrap().push(error.to_string());
        }
    }

    #[test]
    fn subscribed_event_is_delivered_then_acked() {
        let registry = EventRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        registry.subscribe("chat", move |chat: Chat| sink.lock().unwrap().push(chat));
        let log = ErrorLog::default();

        let ack = dispatch_frame(r#"5:1::{"name":"chat","args":[{"text":"hi"}]}"#, &registry, &log);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Chat {
                text: "hi".into()
            }]
        );
        assert_eq!(protocol::encode(&ack.unwrap()).unwrap(), "6:::1");
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn unsubscribed_event_is_silently_dropped() {
        let registry = EventRegistry::new();
        let log = ErrorLog::default();

        let ack = dispatch_frame(r#"5:1::{"name":"unknown","args":[{}]}"#, &registry, &log);

        assert!(ack.is_none());
        assert!(log.0.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_handler_is_still_acked() {
        let registry = EventRegistry::new();
        registry.subscribe("chat", |_: Value| panic!("handler bug"));
        let log = ErrorLog::default();

        let ack = dispatch_frame(r#"5:9::{"name":"chat","args":[1]}"#, &registry, &log);

        assert_eq!(ack, Some(Message::ack_for("9")));
        let errors = log.0.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("handler bug"));
    }

    #[test]
    fn payload_mismatch_is_reported_without_ack() {
        let registry = EventRegistry::new();
        registry.subscribe("chat", |_: Chat| {});
        let log = ErrorLog::default();

        let ack = dispatch_frame(r#"5:2::{"name":"chat","args":[42]}"#, &registry, &log);

        assert!(ack.is_none());
        assert_eq!(log.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn malformed_and_unknown_frames_are_reported() {
        let registry = EventRegistry::new();
        let log = ErrorLog::default();

        assert!(dispatch_frame("5:1::{not json", &registry, &log).is_none());
        assert!(dispatch_frame("42:::", &registry, &log).is_none());
        assert_eq!(log.0.lock().unwrap().len(), 2);
    }

    #[test]
    fn server_error_frame_is_a_diagnostic() {
        let registry = EventRegistry::new();
        let log = ErrorLog::default();

        assert!(dispatch_frame("7:::1+0", &registry, &log).is_none());

        let errors = log.0.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("server error"));
    }

    #[test]
    fn control_frames_produce_nothing() {
        let registry = EventRegistry::new();
        let log = ErrorLog::default();

        for frame in ["1::", "2::", "3:1::hello", "4:1::{}", "6:::3", "8::", "0::/chat"] {
            assert!(dispatch_frame(frame, &registry, &log).is_none(), "{frame}");
        }
        assert!(log.0.lock().unwrap().is_empty());
    }
}
