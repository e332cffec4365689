//! Async Socket.IO 0.9 client.
//!
//! [`SocketIoClient`] is a handle to a connection driven by a background task.
//! [`connect`](SocketIoClient::connect) returns immediately; the driver task
//! negotiates a session, opens the WebSocket, runs the reader, writer and
//! heartbeat tasks, and reports the outcome through the caller's
//! [`ConnectionHandler`].
//!
//! # Example
//!
//! ```rust,no_run
//! use serde::Deserialize;
//! use socketio_legacy_client::{CloseCode, ConnectionHandler, SocketIoClient};
//!
//! #[derive(Deserialize)]
//! struct Chat {
//!     text: String,
//! }
//!
//! struct Lifecycle;
//!
//! impl ConnectionHandler for Lifecycle {
//!     fn on_open(&self) {
//!         println!("connected");
//!     }
//!
//!     fn on_close(&self, code: CloseCode, reason: &str) {
//!         println!("closed ({code:?}): {reason}");
//!     }
//! }
//!
//! # async fn run() -> socketio_legacy_client::Result<()> {
//! let client = SocketIoClient::new();
//! client.connect("ws://localhost:8080", Lifecycle)?;
//! client.subscribe("chat", |msg: Chat| println!("chat: {}", msg.text));
//! client.emit("chat", &serde_json::json!({ "text": "hi" }))?;
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::close_codes::CloseCode;
use crate::error::{Result, SocketIoError};
use crate::handshake::{websocket_url, Handshake, Session};
use crate::heartbeat::run_heartbeat;
use crate::protocol::Message;
use crate::reader::run_reader;
use crate::registry::{panic_message, EventRegistry};
use crate::state::ConnectionState;
use crate::transport::Connector;
use crate::writer::run_writer;

/// Default capacity of the bounded outbound queue.
const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Default time each connection half gets to stop before it is aborted.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default upper bound on the session handshake.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default maximum WebSocket message and frame payload size (64 KiB).
const DEFAULT_MAX_PAYLOAD_SIZE: usize = 64 * 1024;

const DISCONNECT_REQUESTED: &str = "disconnect requested";

// ── Configuration ───────────────────────────────────────────────────

/// Options for a [`SocketIoClient`] connection.
///
/// Passed to [`SocketIoClient::connect_with_options`];
/// [`SocketIoClient::connect`] uses the defaults.
///
/// # Example
///
/// ```
/// use socketio_legacy_client::SocketIoOptions;
/// use std::time::Duration;
///
/// let options = SocketIoOptions::new()
///     .with_max_message_payload_size(1024 * 1024)
///     .with_outbound_queue_capacity(1024)
///     .with_handshake_timeout(Duration::from_secs(5));
/// assert!(options.receive_text_raw);
/// assert_eq!(options.outbound_queue_capacity, 1024);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketIoOptions {
    /// Hand inbound text frames to the codec as raw text.
    ///
    /// Socket.IO frames are text, so this must stay `true`;
    /// connecting with `false` fails with [`SocketIoError::InvalidOptions`].
    pub receive_text_raw: bool,
    /// Maximum size of one WebSocket message. Defaults to **64 KiB**.
    pub max_message_payload_size: usize,
    /// Maximum size of one WebSocket frame. Defaults to **64 KiB**.
    pub max_frame_payload_size: usize,
    /// Disable Nagle's algorithm on the TCP socket. Defaults to `true`.
    pub tcp_no_delay: bool,
    /// Capacity of the bounded outbound queue.
    ///
    /// [`SocketIoClient::emit`] fails with [`SocketIoError::QueueFull`] once
    /// this many messages are waiting for the writer.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub outbound_queue_capacity: usize,
    /// Upper bound on the session handshake. Defaults to **10 seconds**.
    pub handshake_timeout: Duration,
    /// Time the reader and the writer each get to stop when the connection
    /// closes. A half still running after that is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl Default for SocketIoOptions {
    fn default() -> Self {
        Self {
            receive_text_raw: true,
            max_message_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_frame_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            tcp_no_delay: true,
            outbound_queue_capacity: DEFAULT_OUTBOUND_QUEUE_CAPACITY,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl SocketIoOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set whether inbound text frames are handed over raw. Must stay `true`.
    #[must_use]
    pub fn with_receive_text_raw(mut self, raw: bool) -> Self {
        self.receive_text_raw = raw;
        self
    }

    /// Set the maximum WebSocket message size.
    #[must_use]
    pub fn with_max_message_payload_size(mut self, size: usize) -> Self {
        self.max_message_payload_size = size;
        self
    }

    /// Set the maximum WebSocket frame size.
    #[must_use]
    pub fn with_max_frame_payload_size(mut self, size: usize) -> Self {
        self.max_frame_payload_size = size;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    #[must_use]
    pub fn with_tcp_no_delay(mut self, no_delay: bool) -> Self {
        self.tcp_no_delay = no_delay;
        self
    }

    /// Set the capacity of the outbound queue. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_outbound_queue_capacity(mut self, capacity: usize) -> Self {
        self.outbound_queue_capacity = capacity.max(1);
        self
    }

    /// Set the upper bound on the session handshake.
    #[must_use]
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Set the time each connection half gets to stop before it is aborted.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.receive_text_raw {
            return Err(SocketIoError::InvalidOptions(
                "receive_text_raw must be enabled".to_owned(),
            ));
        }
        if self.max_message_payload_size == 0 || self.max_frame_payload_size == 0 {
            return Err(SocketIoError::InvalidOptions(
                "payload size limits must be non-zero".to_owned(),
            ));
        }
        Ok(())
    }
}

// ── Lifecycle callbacks ─────────────────────────────────────────────

/// Receives connection lifecycle notifications.
///
/// Callbacks run on the client's background tasks and must not block.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// The WebSocket is open and the connection is [`Ready`](ConnectionState::Ready).
    fn on_open(&self);

    /// The connection or connection attempt ended. Called exactly once per
    /// [`connect`](SocketIoClient::connect).
    fn on_close(&self, code: CloseCode, reason: &str);

    /// A problem that did not end the connection: an undecodable frame, an
    /// event payload that did not match its subscription, a panicking event
    /// handler, or an error frame sent by the server.
    fn on_error(&self, error: &SocketIoError) {
        let _ = error;
    }
}

/// Signals delivered to the driver task.
#[derive(Debug)]
pub(crate) enum Control {
    /// The caller asked to disconnect.
    Disconnect,
    /// A connection half stopped.
    Closed { code: CloseCode, reason: String },
}

// ── Shared state ────────────────────────────────────────────────────

#[derive(Debug)]
struct Shared {
    registry: Arc<EventRegistry>,
    state: watch::Sender<ConnectionState>,
    session: RwLock<Option<Session>>,
    outbound_tx: RwLock<mpsc::Sender<Message>>,
    // Parked here between sessions; lent to the writer while one is open.
    outbound_rx: Mutex<Option<mpsc::Receiver<Message>>>,
}

impl Shared {
    fn new(capacity: usize) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity);
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            registry: Arc::new(EventRegistry::new()),
            state,
            session: RwLock::new(None),
            outbound_tx: RwLock::new(outbound_tx),
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!(from = %previous, to = %next, "connection state changed");
        }
    }

    fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn enqueue(&self, message: Message) -> Result<()> {
        self.outbound_tx
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .try_send(message)
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => SocketIoError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => SocketIoError::TransportClosed,
            })
    }

    /// Make sure the parked queue has `capacity`, carrying queued messages over.
    fn resize_queue(&self, capacity: usize) {
        let mut tx = self.outbound_tx.write().unwrap_or_else(PoisonError::into_inner);
        let mut rx = self.outbound_rx.lock().unwrap_or_else(PoisonError::into_inner);
        if rx.is_some() && tx.max_capacity() == capacity {
            return;
        }

        let (new_tx, new_rx) = mpsc::channel(capacity);
        if let Some(mut old) = rx.take() {
            while let Ok(message) = old.try_recv() {
                if new_tx.try_send(message).is_err() {
                    warn!(capacity, "outbound queue shrunk, dropping queued messages");
                    break;
                }
            }
        }
        *tx = new_tx;
        *rx = Some(new_rx);
    }

    /// Lend the queue receiver to a writer, creating a fresh queue if the
    /// previous receiver was lost with an aborted writer.
    fn take_queue(&self, capacity: usize) -> (mpsc::Sender<Message>, mpsc::Receiver<Message>) {
        let mut tx = self.outbound_tx.write().unwrap_or_else(PoisonError::into_inner);
        let parked = self
            .outbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match parked {
            Some(rx) => (tx.clone(), rx),
            None => {
                warn!("outbound queue receiver was lost, starting an empty queue");
                let (new_tx, new_rx) = mpsc::channel(capacity);
                *tx = new_tx.clone();
                (new_tx, new_rx)
            }
        }
    }

    /// Keep the queue for the next session, minus acks and heartbeats left
    /// over from this one.
    fn park_queue(&self, mut rx: mpsc::Receiver<Message>) {
        let tx = self.outbound_tx.write().unwrap_or_else(PoisonError::into_inner);
        let mut kept = Vec::new();
        let mut stale = 0usize;
        while let Ok(message) = rx.try_recv() {
            match message {
                Message::Ack { .. } | Message::Heartbeat => stale += 1,
                other => kept.push(other),
            }
        }
        if stale > 0 {
            debug!(stale, "discarding session-bound frames from the outbound queue");
        }
        for message in kept {
            if tx.try_send(message).is_err() {
                warn!("could not requeue outbound messages, dropping the rest");
                break;
            }
        }
        drop(tx);
        *self.outbound_rx.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
    }
}

/// The driver task of the current (or last) session and its control channel.
struct Running {
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

// ── Client ──────────────────────────────────────────────────────────

/// Handle to a Socket.IO 0.9 connection.
///
/// One client runs at most one session at a time. After
/// [`on_close`](ConnectionHandler::on_close), call
/// [`connect`](SocketIoClient::connect) again to start a new one; the client
/// does not reconnect on its own.
///
/// Subscriptions and the outbound queue belong to the client. Messages emitted
/// while no transport is open wait in the queue and are written, in order,
/// once the next transport opens.
pub struct SocketIoClient {
    shared: Arc<Shared>,
    handshake: Arc<dyn Handshake>,
    connector: Arc<dyn Connector>,
    running: Mutex<Option<Running>>,
}

impl SocketIoClient {
    /// Create a client using the `reqwest` handshake and the
    /// `tokio-tungstenite` WebSocket transport.
    #[cfg(all(feature = "handshake-http", feature = "transport-websocket"))]
    pub fn new() -> Self {
        Self::with_components(
            crate::handshake::HttpHandshake::new(),
            crate::transports::WebSocketConnector::new(),
        )
    }

    /// Create a client with a custom handshake and transport.
    pub fn with_components(handshake: impl Handshake, connector: impl Connector) -> Self {
        Self {
            shared: Arc::new(Shared::new(DEFAULT_OUTBOUND_QUEUE_CAPACITY)),
            handshake: Arc::new(handshake),
            connector: Arc::new(connector),
            running: Mutex::new(None),
        }
    }

    /// Connect to the server at `uri` (`ws://` or `wss://`) with default options.
    ///
    /// See [`connect_with_options`](Self::connect_with_options).
    ///
    /// # Errors
    ///
    /// Returns [`SocketIoError::InvalidState`] if a connection is already in progress.
    pub fn connect(&self, uri: &str, handler: impl ConnectionHandler) -> Result<()> {
        self.connect_with_options(uri, handler, SocketIoOptions::default())
    }

    /// Connect to the server at `uri` (`ws://` or `wss://`).
    ///
    /// Returns as soon as the driver task is spawned; the outcome is reported
    /// to `handler`. Existing subscriptions are cleared, so subscribe after
    /// calling this. Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SocketIoError::InvalidOptions`] if `options` cannot be used.
    /// - [`SocketIoError::InvalidState`] unless the client is
    ///   [`Idle`](ConnectionState::Idle), [`Closed`](ConnectionState::Closed)
    ///   or [`Failed`](ConnectionState::Failed).
    pub fn connect_with_options(
        &self,
        uri: &str,
        handler: impl ConnectionHandler,
        options: SocketIoOptions,
    ) -> Result<()> {
        options.validate()?;

        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        let mut previous = ConnectionState::Idle;
        let acquired = self.shared.state.send_if_modified(|state| {
            previous = *state;
            if state.can_connect() {
                *state = ConnectionState::Handshaking;
                true
            } else {
                false
            }
        });
        if !acquired {
            return Err(SocketIoError::InvalidState(previous));
        }
        debug!(from = %previous, uri = %uri, "connection state changed to handshaking");

        self.shared.registry.clear();
        self.shared.set_session(None);
        self.shared
            .resize_queue(options.outbound_queue_capacity.max(1));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            uri: uri.to_owned(),
            options,
            handler: Arc::new(handler),
            shared: Arc::clone(&self.shared),
            handshake: Arc::clone(&self.handshake),
            connector: Arc::clone(&self.connector),
            control_tx: control_tx.clone(),
            control_rx,
        };
        let task = tokio::spawn(driver.run());
        *running = Some(Running {
            control: control_tx,
            task,
        });
        Ok(())
    }

    /// Close the connection and wait for the driver task to finish.
    ///
    /// During the handshake or the WebSocket open the attempt is abandoned. On
    /// a ready connection, queued messages are flushed before the transport
    /// closes. Either way [`on_close`](ConnectionHandler::on_close) receives
    /// [`CloseCode::Normal`], unless the connection had already started
    /// closing for another reason. A no-op when there is no connection.
    pub async fn disconnect(&self) {
        if !self.shared.state().is_active() {
            return;
        }
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(running) = running else {
            return;
        };

        debug!("disconnect requested");
        let _ = running.control.send(Control::Disconnect);
        if let Err(e) = running.task.await {
            warn!("connection driver terminated abnormally: {e}");
            self.shared.set_state(ConnectionState::Closed);
        }
    }

    /// Leave `endpoint` by sending an endpoint-scoped disconnect frame.
    ///
    /// The transport stays open. The frame goes through the outbound queue
    /// like any emitted event.
    ///
    /// # Errors
    ///
    /// Returns [`SocketIoError::QueueFull`] if the outbound queue is full.
    pub fn disconnect_endpoint(&self, endpoint: &str) -> Result<()> {
        self.shared.enqueue(Message::Disconnect {
            endpoint: Some(endpoint.to_owned()),
        })
    }

    /// Returns `true` if the connection is [`Ready`](ConnectionState::Ready).
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Ready
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Receiver that observes every state change.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// The negotiated session, while one exists.
    pub fn session(&self) -> Option<Session> {
        self.shared
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Call `handler` with the payload of every `name` event, decoded as `T`.
    ///
    /// Replaces any previous subscription to `name`. Each delivered event is
    /// acknowledged after `handler` returns. Only the first event argument is
    /// delivered; an event without arguments delivers JSON `null`.
    pub fn subscribe<T, F>(&self, name: impl Into<String>, handler: F)
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(name, handler);
    }

    /// Remove the subscription for `name`. Returns `true` if one existed.
    pub fn unsubscribe(&self, name: &str) -> bool {
        self.shared.registry.unsubscribe(name)
    }

    /// Queue an event named `name` carrying `payload`.
    ///
    /// The payload is serialized immediately. Emitting is allowed in every
    /// state; messages wait in the queue until a transport is open.
    ///
    /// # Errors
    ///
    /// - [`SocketIoError::Serialization`] if `payload` cannot be represented as JSON.
    /// - [`SocketIoError::QueueFull`] if the outbound queue is full.
    pub fn emit<T>(&self, name: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;
        self.shared.enqueue(Message::Emit {
            name: name.to_owned(),
            payload,
        })
    }
}

#[cfg(all(feature = "handshake-http", feature = "transport-websocket"))]
impl Default for SocketIoClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SocketIoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketIoClient")
            .field("state", &self.state())
            .field(
                "session_id",
                &self.session().map(|session| session.session_id),
            )
            .field("subscriptions", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for SocketIoClient {
    fn drop(&mut self) {
        // Aborting the driver drops the shutdown signal, which stops the
        // reader and writer; the heartbeat stops once the state leaves Ready.
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.task.abort();
        }
        if self.shared.state().is_active() {
            self.shared.set_state(ConnectionState::Closed);
        }
    }
}

// ── Driver task ─────────────────────────────────────────────────────

struct Driver {
    uri: String,
    options: SocketIoOptions,
    handler: Arc<dyn ConnectionHandler>,
    shared: Arc<Shared>,
    handshake: Arc<dyn Handshake>,
    connector: Arc<dyn Connector>,
    control_tx: mpsc::UnboundedSender<Control>,
    control_rx: mpsc::UnboundedReceiver<Control>,
}

impl Driver {
    async fn run(mut self) {
        // Handshaking
        let negotiated = tokio::select! {
            biased;
            _ = self.control_rx.recv() => None,
            result = tokio::time::timeout(
                self.options.handshake_timeout,
                guarded("handshake", self.handshake.negotiate(&self.uri)),
            ) => Some(result.unwrap_or(Err(SocketIoError::Timeout))),
        };
        let session = match negotiated {
            None => return self.abandon(),
            Some(Ok(session)) => session,
            Some(Err(e)) => return self.fail(&e),
        };

        // Opening
        let url = websocket_url(&self.uri, &session.session_id);
        let heartbeat_interval = session.heartbeat_interval;
        self.shared.set_session(Some(session));
        self.shared.set_state(ConnectionState::Opening);

        let opened = tokio::select! {
            biased;
            _ = self.control_rx.recv() => None,
            result = guarded("connector", self.connector.connect(&url, &self.options)) => {
                Some(result)
            }
        };
        let (sink, source) = match opened {
            None => return self.abandon(),
            Some(Ok(halves)) => halves,
            Some(Err(e)) => return self.fail(&e),
        };

        // Ready
        let (outbound_tx, outbound_rx) = self
            .shared
            .take_queue(self.options.outbound_queue_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        self.shared.set_state(ConnectionState::Ready);
        info!(url = %url, "Socket.IO connection ready");
        notify("on_open", || self.handler.on_open());

        let writer = tokio::spawn(run_writer(
            sink,
            outbound_rx,
            shutdown_rx.clone(),
            self.control_tx.clone(),
        ));
        let mut reader = tokio::spawn(run_reader(
            source,
            Arc::clone(&self.shared.registry),
            outbound_tx.clone(),
            Arc::clone(&self.handler),
            shutdown_rx,
            self.control_tx.clone(),
        ));
        let heartbeat = tokio::spawn(run_heartbeat(
            heartbeat_interval,
            self.shared.state.subscribe(),
            outbound_tx,
        ));

        // The first terminal signal wins; later ones are never read.
        let mut reader_finished = false;
        let (code, reason) = tokio::select! {
            biased;
            signal = self.control_rx.recv() => match signal {
                Some(Control::Closed { code, reason }) => (code, reason),
                Some(Control::Disconnect) | None => {
                    (CloseCode::Normal, DISCONNECT_REQUESTED.to_owned())
                }
            },
            // The reader reports every regular exit on the control channel
            // first, so finishing here means it panicked.
            result = &mut reader => {
                reader_finished = true;
                let detail = result.err().map(|e| e.to_string()).unwrap_or_default();
                error!("reader task stopped unexpectedly: {detail}");
                (CloseCode::InternalError, format!("reader task stopped: {detail}"))
            }
        };

        // Closing
        self.shared.set_state(ConnectionState::Closing);
        debug!(code = code.code(), reason = %reason, "closing connection");
        shutdown_tx.send_replace(true);
        heartbeat.abort();

        let limit = self.options.shutdown_timeout;
        if let Some(rx) = join_within("writer", writer, limit).await {
            self.shared.park_queue(rx);
        }
        if !reader_finished {
            join_within("reader", reader, limit).await;
        }

        self.shared.set_session(None);
        self.shared.set_state(ConnectionState::Closed);
        info!(code = code.code(), reason = %reason, "Socket.IO connection closed");
        notify("on_close", || self.handler.on_close(code, &reason));
    }

    /// Handshake or WebSocket open failed.
    fn fail(&self, error: &SocketIoError) {
        error!(uri = %self.uri, "connection attempt failed: {error}");
        self.shared.set_session(None);
        self.shared.set_state(ConnectionState::Failed);
        let reason = error.to_string();
        notify("on_close", || {
            self.handler.on_close(CloseCode::CannotConnect, &reason);
        });
    }

    /// Disconnect requested before the WebSocket opened.
    fn abandon(&self) {
        info!(uri = %self.uri, "connection attempt abandoned");
        self.shared.set_session(None);
        self.shared.set_state(ConnectionState::Closed);
        notify("on_close", || {
            self.handler.on_close(CloseCode::Normal, DISCONNECT_REQUESTED);
        });
    }
}

/// Wait up to `limit` for `task`, aborting it if it does not finish in time.
async fn join_within<T>(name: &str, mut task: JoinHandle<T>, limit: Duration) -> Option<T> {
    match tokio::time::timeout(limit, &mut task).await {
        Ok(Ok(output)) => Some(output),
        Ok(Err(e)) => {
            warn!("{name} task terminated with join error: {e}");
            None
        }
        Err(_) => {
            warn!("{name} task did not exit within {limit:?}; aborting");
            task.abort();
            None
        }
    }
}

/// Await a pluggable component, turning a panic into an error.
async fn guarded<T>(
    component: &'static str,
    future: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    AssertUnwindSafe(future)
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(SocketIoError::ComponentPanicked {
                component,
                message: panic_message(panic.as_ref()),
            })
        })
}

/// Run a lifecycle callback, containing any panic.
fn notify(callback: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("{callback} callback panicked");
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
    use crate::transport::TransportHalves;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct PendingHandshake;

    #[async_trait]
    impl Handshake for PendingHandshake {
        async fn negotiate(&self, _server_uri: &str) -> Result<Session> {
            std::future::pending().await
        }
    }

    struct RefusingConnector;

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, url: &str, _options: &SocketIoOptions) -> Result<TransportHalves> {
            Err(SocketIoError::TransportSend(format!("refused {url}")))
        }
    }

    struct Closes(mpsc::UnboundedSender<(CloseCode, String)>);

    impl ConnectionHandler for Closes {
        fn on_open(&self) {}
        fn on_close(&self, code: CloseCode, reason: &str) {
            let _ = self.0.send((code, reason.to_owned()));
        }
    }

    fn pending_client() -> SocketIoClient {
        SocketIoClient::with_components(PendingHandshake, RefusingConnector)
    }

    #[test]
    fn options_defaults() {
        let options = SocketIoOptions::default();
        assert!(options.receive_text_raw);
        assert_eq!(options.max_message_payload_size, 64 * 1024);
        assert_eq!(options.max_frame_payload_size, 64 * 1024);
        assert!(options.tcp_no_delay);
        assert_eq!(options.outbound_queue_capacity, 256);
        assert_eq!(options.handshake_timeout, Duration::from_secs(10));
        assert_eq!(options.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn options_builder_clamps_queue_capacity() {
        let options = SocketIoOptions::new()
            .with_outbound_queue_capacity(0)
            .with_tcp_no_delay(false)
            .with_shutdown_timeout(Duration::from_millis(50));
        assert_eq!(options.outbound_queue_capacity, 1);
        assert!(!options.tcp_no_delay);
        assert_eq!(options.shutdown_timeout, Duration::from_millis(50));
    }

    #[tokio::test]
    async fn connect_rejects_raw_text_disabled() {
        let client = pending_client();
        let (tx, _rx) = mpsc::unbounded_channel();

        let err = client
            .connect_with_options(
                "ws://localhost:1",
                Closes(tx),
                SocketIoOptions::new().with_receive_text_raw(false),
            )
            .unwrap_err();

        assert!(matches!(err, SocketIoError::InvalidOptions(_)));
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let client = pending_client();
        let (tx, _rx) = mpsc::unbounded_channel();

        client.connect("ws://localhost:1", Closes(tx.clone())).unwrap();
        let err = client.connect("ws://localhost:1", Closes(tx)).unwrap_err();

        assert!(matches!(
            err,
            SocketIoError::InvalidState(ConnectionState::Handshaking)
        ));
    }

    #[tokio::test]
    async fn disconnect_during_handshake_closes_normally() {
        let client = pending_client();
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.connect("ws://localhost:1", Closes(tx)).unwrap();
        client.disconnect().await;

        assert_eq!(client.state(), ConnectionState::Closed);
        let (code, reason) = rx.recv().await.unwrap();
        assert_eq!(code, CloseCode::Normal);
        assert_eq!(reason, DISCONNECT_REQUESTED);
    }

    #[tokio::test]
    async fn disconnect_when_idle_is_a_no_op() {
        let client = pending_client();
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn handshake_timeout_fails_the_attempt() {
        let client = pending_client();
        let (tx, mut rx) = mpsc::unbounded_channel();

        client
            .connect_with_options(
                "ws://localhost:1",
                Closes(tx),
                SocketIoOptions::new().with_handshake_timeout(Duration::from_millis(20)),
            )
            .unwrap();

        let (code, reason) = rx.recv().await.unwrap();
        assert_eq!(code, CloseCode::CannotConnect);
        assert!(reason.contains("timed out"));
        assert_eq!(client.state(), ConnectionState::Failed);
    }

    #[tokio::test]
    async fn emit_queues_until_full() {
        let client = pending_client();

        for i in 0..DEFAULT_OUTBOUND_QUEUE_CAPACITY {
            client.emit("tick", &i).unwrap();
        }
        let err = client.emit("tick", &0).unwrap_err();
        assert!(matches!(err, SocketIoError::QueueFull));
    }

    #[tokio::test]
    async fn emit_rejects_unserializable_payload() {
        let client = pending_client();
        let mut payload = HashMap::new();
        payload.insert((1, 2), "tuple keys are not JSON");

        let err = client.emit("bad", &payload).unwrap_err();
        assert!(matches!(err, SocketIoError::Serialization(_)));
    }

    #[tokio::test]
    async fn shrinking_the_queue_keeps_the_oldest_messages() {
        let client = pending_client();
        client.emit("first", &1).unwrap();
        client.emit("second", &2).unwrap();

        client.shared.resize_queue(1);

        let (_tx, mut rx) = client.shared.take_queue(1);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Message::Emit { name, .. } if name == "first"
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn parking_the_queue_drops_acks_and_heartbeats() {
        let client = pending_client();
        let (tx, rx) = client.shared.take_queue(8);
        tx.try_send(Message::ack_for("3")).unwrap();
        client.emit("kept", &1).unwrap();
        tx.try_send(Message::Heartbeat).unwrap();
        client.disconnect_endpoint("/chat").unwrap();

        client.shared.park_queue(rx);

        let (_tx, mut rx) = client.shared.take_queue(8);
        assert!(matches!(
            rx.try_recv().unwrap(),
            Message::Emit { name, .. } if name == "kept"
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Message::Disconnect { endpoint: Some(endpoint) } if endpoint == "/chat"
        ));
        assert!(rx.try_recv().is_err());
    }

    struct PanickingHandshake;

    #[async_trait]
    impl Handshake for PanickingHandshake {
        async fn negotiate(&self, _server_uri: &str) -> Result<Session> {
            panic!("handshake exploded")
        }
    }

    #[tokio::test]
    async fn panicking_handshake_fails_the_attempt() {
        let client = SocketIoClient::with_components(PanickingHandshake, RefusingConnector);
        let (tx, mut rx) = mpsc::unbounded_channel();

        client.connect("ws://localhost:1", Closes(tx.clone())).unwrap();

        let (code, reason) = rx.recv().await.unwrap();
        assert_eq!(code, CloseCode::CannotConnect);
        assert!(reason.contains("handshake panicked: handshake exploded"), "{reason}");
        assert_eq!(client.state(), ConnectionState::Failed);
        assert!(client.connect("ws://localhost:1", Closes(tx)).is_ok());
    }

    #[tokio::test]
    async fn connect_clears_subscriptions() {
        let client = pending_client();
        let (tx, _rx) = mpsc::unbounded_channel();
        client.subscribe("chat", |_: serde_json::Value| {});
        assert!(client.unsubscribe("chat"));
        client.subscribe("chat", |_: serde_json::Value| {});

        client.connect("ws://localhost:1", Closes(tx)).unwrap();

        assert!(!client.unsubscribe("chat"));
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let client = pending_client();
        let debug = format!("{client:?}");
        assert!(debug.contains("SocketIoClient"));
        assert!(debug.contains("Idle"));
    }

    #[tokio::test]
    async fn drop_during_connect_stops_the_driver() {
        let client = pending_client();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut states = client.state_changes();

        client.connect("ws://localhost:1", Closes(tx)).unwrap();
        drop(client);

        assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);
    }
}
