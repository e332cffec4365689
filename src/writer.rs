//! Writer half of a connection.
//!
//! The writer owns the transport's [`FrameSink`] and drains the outbound queue
//! in FIFO order, encoding each [`Message`] into a text frame. It only runs
//! while a transport is open, so nothing queued before the WebSocket opened is
//! written early.

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, trace};

use crate::client::Control;
use crate::close_codes::CloseCode;
use crate::error::SocketIoError;
use crate::protocol::{self, Message};
use crate::transport::FrameSink;

/// Drain `outbound` into `sink` until shutdown or a write failure.
///
/// On shutdown, messages already queued are flushed before the sink is
/// closed. A failed encode or send is reported once on `control` and ends the
/// loop. The queue receiver is returned so the next session can reuse it.
pub(crate) async fn run_writer(
    mut sink: Box<dyn FrameSink>,
    mut outbound: mpsc::Receiver<Message>,
    mut shutdown: watch::Receiver<bool>,
    control: mpsc::UnboundedSender<Control>,
) -> mpsc::Receiver<Message> {
    debug!("writer started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.changed() => {
                flush(sink.as_mut(), &mut outbound).await;
                if let Err(e) = sink.close().await {
                    debug!("transport close failed: {e}");
                }
                break;
            }

            msg = outbound.recv() => {
                let Some(msg) = msg else {
                    debug!("outbound queue closed");
                    let _ = sink.close().await;
                    break;
                };
                if let Err(e) = write_message(sink.as_mut(), &msg).await {
                    error!("writer failed: {e}");
                    let code = match e {
                        SocketIoError::Encode(_) => CloseCode::InternalError,
                        _ => CloseCode::ConnectionLost,
                    };
                    let _ = control.send(Control::Closed {
                        code,
                        reason: e.to_string(),
                    });
                    break;
                }
            }
        }
    }

    debug!("writer exited");
    outbound
}

async fn write_message(sink: &mut dyn FrameSink, msg: &Message) -> Result<(), SocketIoError> {
    let frame = protocol::encode(msg)?;
    trace!(frame = %frame, "sending frame");
    sink.send_frame(frame).await
}

async fn flush(sink: &mut dyn FrameSink, outbound: &mut mpsc::Receiver<Message>) {
    while let Ok(msg) = outbound.try_recv() {
        if let Err(e) = write_message(sink, &msg).await {
            debug!("dropping queued messages after write failure: {e}");
            return;
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
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct RecordingSink {
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail: bool,
    }

    #[async_trait]
    impl FrameSink for RecordingSink {
        async fn send_frame(&mut self, frame: String) -> Result<(), SocketIoError> {
            if self.fail {
                return Err(SocketIoError::TransportSend("broken pipe".into()));
            }
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn close(&mut self) -> Result<(), SocketIoError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    #[allow(clippy::type_complexity)]
    fn sink(fail: bool) -> (Box<dyn FrameSink>, Arc<Mutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let sink = RecordingSink {
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
            fail,
        };
        (Box::new(sink), sent, closed)
    }

    #[tokio::test]
    async fn writes_in_queue_order_and_flushes_on_shutdown() {
        let (sink, sent, closed) = sink(false);
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (control_tx, _control_rx) = mpsc::unbounded_channel();

        tx.send(Message::Heartbeat).await.unwrap();
        tx.send(Message::Emit {
            name: "chat".into(),
            payload: json!({"text": "hi"}),
        })
        .await
        .unwrap();
        tx.send(Message::ack_for("1")).await.unwrap();

        let task = tokio::spawn(run_writer(sink, rx, shutdown_rx, control_tx));
        shutdown_tx.send_replace(true);
        let _rx = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            *sent.lock().unwrap(),
            vec![
                "2:::".to_string(),
                r#"5:::{"name":"chat","args":[{"text":"hi"}]}"#.to_string(),
                "6:::1".to_string(),
            ]
        );
        assert!(closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn send_failure_reports_connection_lost() {
        let (sink, _sent, _closed) = sink(true);
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        tx.send(Message::Heartbeat).await.unwrap();
        let _rx = run_writer(sink, rx, shutdown_rx, control_tx).await;

        match control_rx.recv().await.unwrap() {
            Control::Closed { code, .. } => assert_eq!(code, CloseCode::ConnectionLost),
            other => panic!("unexpected control message {other:?}"),
        }
    }

    #[tokio::test]
    async fn encode_failure_reports_internal_error() {
        let (sink, _sent, _closed) = sink(false);
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (control_tx, mut control_rx) = mpsc::unbounded_channel();

        tx.send(Message::Noop).await.unwrap();
        let _rx = run_writer(sink, rx, shutdown_rx, control_tx).await;

        match control_rx.recv().await.unwrap() {
            Control::Closed { code, .. } => assert_eq!(code, CloseCode::InternalError),
            other => panic!("unexpected control message {other:?}"),
        }
    }

    #[tokio::test]
    async fn returns_receiver_for_reuse() {
        let (sink, _sent, _closed) = sink(false);
        let (tx, rx) = mpsc::channel(8);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (control_tx, _control_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_writer(sink, rx, shutdown_rx, control_tx));
        shutdown_tx.send_replace(true);
        let mut rx = task.await.unwrap();

        tx.send(Message::Heartbeat).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Message::Heartbeat);
    }
}
