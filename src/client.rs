//! Resilient real-time client.
//!
//! [`RealtimeClient`] keeps a duplex socket open to a messaging endpoint and
//! reconnects on its own when the connection drops, until [`disconnect`] is
//! called or the [`ReconnectPolicy`] gives up.
//!
//! # Architecture
//!
//! ```text
//!   RealtimeClient (handle)             background task
//!         │                                   │
//!         │  connect() ── spawn ───────────►  │ connect ─► message loop
//!         │                                   │     ▲            │
//!         │  send(M) ── outbound (per conn) ► │     │  sleep(policy delay)
//!         │                                   │     └────────────┘
//!         │  ◄── ClientEvents<M> ──────────── │
//!         │  ◄── watch<ConnectionStatus> ──── │
//! ```
//!
//! The outbound channel is created when a socket opens and dropped when it
//! closes, so nothing is buffered across reconnects: [`RealtimeClient::send`]
//! returns `false` while there is no open socket.
//!
//! [`disconnect`]: RealtimeClient::disconnect

// Rust guideline compliant 2026-02

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::envelope::WireMessage;
use crate::reconnect::ReconnectPolicy;
use crate::ws::{redact_token, Connector, FrameSink, FrameSource, TungsteniteConnector, WsMessage};

/// Connection state of a [`RealtimeClient`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No socket, and none being opened.
    #[default]
    Disconnected,
    /// Opening a socket.
    Connecting,
    /// Socket open; `send` will transmit.
    Connected,
    /// The last attempt failed. A retry may still follow.
    Error(String),
}

/// Something that happened on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent<M> {
    /// A socket opened.
    Open,
    /// A frame arrived. Undecodable frames arrive as `M::raw`.
    Message(M),
    /// The socket closed. `code` is `None` when no close frame was seen.
    Closed {
        /// WebSocket close code, if the peer sent one.
        code: Option<u16>,
        /// Close reason or local description of the failure.
        reason: String,
    },
    /// A connect attempt or an open socket failed.
    Error(String),
    /// The reconnect policy ran out of attempts; the client is idle.
    GaveUp {
        /// Reconnect attempts made since the last successful open.
        attempts: u32,
    },
}

/// Receiving end of a client's events.
#[derive(Debug)]
pub struct ClientEvents<M> {
    rx: mpsc::UnboundedReceiver<ClientEvent<M>>,
}

impl<M> ClientEvents<M> {
    /// Wait for the next event. `None` once the client and its task are gone.
    pub async fn recv(&mut self) -> Option<ClientEvent<M>> {
        self.rx.recv().await
    }

    /// Next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<ClientEvent<M>> {
        self.rx.try_recv().ok()
    }
}

/// State shared between the handle and the connection task.
struct Shared<M> {
    status: watch::Sender<ConnectionStatus>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    events: mpsc::UnboundedSender<ClientEvent<M>>,
}

impl<M> Shared<M> {
    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_replace(status);
    }

    fn set_outbound(&self, tx: Option<mpsc::UnboundedSender<String>>) {
        *lock(&self.outbound) = tx;
    }

    /// Publish a freshly opened socket. Returns `false` without publishing
    /// if the client was stopped while the socket was being opened.
    fn publish_connected(
        &self,
        tx: mpsc::UnboundedSender<String>,
        cancel: &CancellationToken,
    ) -> bool {
        let mut outbound = lock(&self.outbound);
        if cancel.is_cancelled() {
            return false;
        }
        *outbound = Some(tx);
        self.set_status(ConnectionStatus::Connected);
        true
    }

    /// Stop publishing: cancel, drop the outbound sender, mark disconnected.
    ///
    /// Holds the outbound lock so it cannot interleave with
    /// [`Self::publish_connected`].
    fn shut_down(&self, cancel: &CancellationToken) {
        let mut outbound = lock(&self.outbound);
        cancel.cancel();
        *outbound = None;
        self.set_status(ConnectionStatus::Disconnected);
    }

    fn emit(&self, event: ClientEvent<M>) {
        // Receiver may have been dropped by a caller that only sends.
        let _ = self.events.send(event);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builder for [`RealtimeClient`].
#[derive(Debug)]
pub struct ClientBuilder {
    url: String,
    policy: ReconnectPolicy,
    connector: Option<Arc<dyn Connector>>,
}

impl ClientBuilder {
    /// Start building a client for `url`. Any auth token is expected to be
    /// part of the URL already.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            policy: ReconnectPolicy::default(),
            connector: None,
        }
    }

    /// Reconnect strategy (default: fixed 1500 ms, no cap).
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Socket factory (default: [`TungsteniteConnector`]).
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Build the client and the receiver for its events.
    ///
    /// Nothing connects until [`RealtimeClient::connect`] is called.
    pub fn build<M: WireMessage>(self) -> (RealtimeClient<M>, ClientEvents<M>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);

        let client = RealtimeClient {
            url: self.url,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(TungsteniteConnector::new())),
            policy: self.policy,
            shared: Arc::new(Shared {
                status: status_tx,
                outbound: Mutex::new(None),
                events: events_tx,
            }),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        };

        (client, ClientEvents { rx: events_rx })
    }
}

/// Reconnecting socket client carrying messages of type `M`.
///
/// Must be used from within a tokio runtime. Dropping the client stops it.
pub struct RealtimeClient<M: WireMessage> {
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    shared: Arc<Shared<M>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<M: WireMessage> std::fmt::Debug for RealtimeClient<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &redact_token(&self.url))
            .field("policy", &self.policy)
            .field("status", &*self.shared.status.borrow())
            .field("stopped", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl<M: WireMessage> RealtimeClient<M> {
    /// Start the connection task.
    ///
    /// No-op if a connection task is already running or the client was
    /// stopped with [`Self::disconnect`].
    pub fn connect(&self) {
        if self.cancel.is_cancelled() {
            log::debug!("[Realtime] connect() ignored: client was disconnected");
            return;
        }

        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        *task = Some(tokio::spawn(run_connection_loop(
            self.url.clone(),
            Arc::clone(&self.connector),
            self.policy,
            Arc::clone(&self.shared),
            self.cancel.clone(),
        )));
    }

    /// Stamp, encode and transmit `message` on the open socket.
    ///
    /// Returns `false` without transmitting if no socket is open. Nothing is
    /// queued for later delivery.
    pub fn send(&self, mut message: M) -> bool {
        message.stamp(Utc::now());
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                log::warn!("[Realtime] Failed to encode outgoing message: {}", e);
                return false;
            }
        };

        match lock(&self.shared.outbound).as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => {
                log::debug!("[Realtime] Dropping outgoing message: socket not open");
                false
            }
        }
    }

    /// Stop for good: close the socket and never reconnect.
    pub fn disconnect(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        log::info!("[Realtime] Disconnect requested");
        self.shared.shut_down(&self.cancel);
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.shared.status.borrow().clone()
    }

    /// Subscribe to status transitions.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Whether [`Self::disconnect`] has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The socket URL this client connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl<M: WireMessage> Drop for RealtimeClient<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Outer loop: connect, run the socket until it closes, wait, repeat.
async fn run_connection_loop<M: WireMessage>(
    url: String,
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    shared: Arc<Shared<M>>,
    cancel: CancellationToken,
) {
    let display_url = redact_token(&url);
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        shared.set_status(ConnectionStatus::Connecting);
        log::info!("[Realtime] Connecting to {}", display_url);

        let connected = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = connector.connect(&url) => result,
        };

        match connected {
            Ok((mut writer, mut reader)) => {
                attempt = 0;
                let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
                if !shared.publish_connected(outbound_tx, &cancel) {
                    if let Err(e) = writer.close().await {
                        log::debug!("[Realtime] Close after cancelled connect failed: {}", e);
                    }
                    break;
                }
                shared.emit(ClientEvent::Open);
                log::info!("[Realtime] Connected");

                let exit = run_message_loop(
                    &shared,
                    &mut *writer,
                    &mut *reader,
                    &mut outbound_rx,
                    &cancel,
                )
                .await;

                shared.set_outbound(None);
                shared.set_status(ConnectionStatus::Disconnected);

                match exit {
                    LoopExit::Shutdown => {
                        shared.emit(ClientEvent::Closed {
                            code: Some(1000),
                            reason: "client disconnect".to_string(),
                        });
                        break;
                    }
                    LoopExit::Closed { code, reason } => {
                        log::info!(
                            "[Realtime] Connection closed (code={:?}, reason={})",
                            code,
                            reason
                        );
                        shared.emit(ClientEvent::Closed { code, reason });
                    }
                }
            }
            Err(e) => {
                log::warn!("[Realtime] Connection failed: {:#}", e);
                shared.set_status(ConnectionStatus::Error(e.to_string()));
                shared.emit(ClientEvent::Error(format!("{e:#}")));
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        attempt = attempt.saturating_add(1);
        let Some(delay) = policy.delay_for(attempt) else {
            let attempts = attempt - 1;
            log::warn!("[Realtime] Giving up after {} reconnect attempts", attempts);
            shared.emit(ClientEvent::GaveUp { attempts });
            break;
        };

        log::info!(
            "[Realtime] Reconnecting in {}ms (attempt {})",
            delay.as_millis(),
            attempt
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }
    }

    shared.set_outbound(None);
    shared.set_status(ConnectionStatus::Disconnected);
}

/// Result of the inner message loop.
enum LoopExit {
    /// `disconnect()` was called.
    Shutdown,
    /// The socket went away.
    Closed { code: Option<u16>, reason: String },
}

/// Inner loop for one open socket: deliver incoming frames, write outgoing
/// ones, answer pings.
async fn run_message_loop<M: WireMessage>(
    shared: &Shared<M>,
    writer: &mut dyn FrameSink,
    reader: &mut dyn FrameSource,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
    cancel: &CancellationToken,
) -> LoopExit {
    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                // Frames accepted by send() before disconnect() still go out.
                while let Ok(text) = outbound_rx.try_recv() {
                    if writer.send_text(&text).await.is_err() {
                        break;
                    }
                }
                if let Err(e) = writer.close().await {
                    log::debug!("[Realtime] Close on shutdown failed: {}", e);
                }
                return LoopExit::Shutdown;
            }

            msg = reader.recv() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    shared.emit(ClientEvent::Message(M::decode(&text)));
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    let text = String::from_utf8_lossy(&data);
                    shared.emit(ClientEvent::Message(M::decode(&text)));
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    if let Err(e) = writer.send_pong(data).await {
                        log::warn!("[Realtime] Failed to answer ping: {}", e);
                        return LoopExit::Closed { code: None, reason: e.to_string() };
                    }
                }
                Some(Ok(WsMessage::Pong(_))) => {}
                Some(Ok(WsMessage::Close { code, reason })) => {
                    return LoopExit::Closed { code: Some(code), reason };
                }
                Some(Err(e)) => {
                    log::warn!("[Realtime] Socket error: {}", e);
                    shared.set_status(ConnectionStatus::Error(e.to_string()));
                    shared.emit(ClientEvent::Error(e.to_string()));
                    return LoopExit::Closed { code: None, reason: e.to_string() };
                }
                None => {
                    return LoopExit::Closed { code: None, reason: "stream ended".to_string() };
                }
            },

            Some(text) = outbound_rx.recv() => {
                if let Err(e) = writer.send_text(&text).await {
                    log::warn!("[Realtime] Send failed: {}", e);
                    return LoopExit::Closed { code: None, reason: e.to_string() };
                }
            }
        }
    }
}
