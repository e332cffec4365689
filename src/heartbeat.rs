//! Heartbeat keep-alive.
//!
//! Socket.IO 0.9 servers close sessions that stay silent for longer than the
//! heartbeat timeout advertised in the handshake. The client sends a heartbeat
//! frame every [`Session::heartbeat_interval`](crate::handshake::Session::heartbeat_interval)
//! (half that timeout) while the connection is [`Ready`](ConnectionState::Ready).

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

use crate::protocol::Message;
use crate::state::ConnectionState;

/// Shortest interval the heartbeat loop will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Why the heartbeat loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatExit {
    /// The connection left the `Ready` state.
    NotReady,
    /// The outbound queue was closed.
    QueueClosed,
}

/// Enqueue a [`Message::Heartbeat`] every `interval` while the state is `Ready`.
///
/// The first heartbeat is sent one full interval after the loop starts. The
/// state is checked on every tick, so one tick may fire after the connection
/// has left `Ready`; it sends nothing. A full queue skips that tick.
/// Intervals shorter than [`MIN_HEARTBEAT_INTERVAL`] are raised to it.
pub async fn run_heartbeat(
    interval: Duration,
    state: watch::Receiver<ConnectionState>,
    outbound: mpsc::Sender<Message>,
) -> HeartbeatExit {
    let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(interval_ms = interval.as_millis() as u64, "heartbeat started");

    loop {
        ticker.tick().await;

        if *state.borrow() != ConnectionState::Ready {
            debug!("heartbeat stopped: connection no longer ready");
            return HeartbeatExit::NotReady;
        }

        match outbound.try_send(Message::Heartbeat) {
            Ok(()) => trace!("heartbeat queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("outbound queue full, skipping heartbeat");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("heartbeat stopped: outbound queue closed");
                return HeartbeatExit::QueueClosed;
            }
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

    #[tokio::test]
    async fn sends_heartbeats_while_ready() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let (tx, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(run_heartbeat(Duration::from_millis(10), state_rx, tx));

        for _ in 0..3 {
            let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(msg, Message::Heartbeat);
        }
        task.abort();
    }

    #[tokio::test]
    async fn zero_interval_is_clamped() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let (tx, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(run_heartbeat(Duration::ZERO, state_rx, tx));

        let msg = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, Message::Heartbeat);
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn first_heartbeat_waits_one_interval() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let (tx, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(run_heartbeat(Duration::from_millis(200), state_rx, tx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        task.abort();
    }

    #[tokio::test]
    async fn stops_when_state_leaves_ready() {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let (tx, mut rx) = mpsc::channel(16);

        let task = tokio::spawn(run_heartbeat(Duration::from_millis(10), state_rx, tx));
        let _ = rx.recv().await.unwrap();

        state_tx.send_replace(ConnectionState::Closed);

        let exit = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(exit, HeartbeatExit::NotReady);
    }

    #[tokio::test]
    async fn never_sends_before_ready() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Opening);
        let (tx, mut rx) = mpsc::channel(16);

        let exit = run_heartbeat(Duration::from_millis(5), state_rx, tx).await;

        assert_eq!(exit, HeartbeatExit::NotReady);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn stops_when_queue_closed() {
        let (_state_tx, state_rx) = watch::channel(ConnectionState::Ready);
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let exit = run_heartbeat(Duration::from_millis(5), state_rx, tx).await;
        assert_eq!(exit, HeartbeatExit::QueueClosed);
    }
}
