//! WebSocket Transport
//!
//! The production [`ChatTransport`]: one logical connection to the backend,
//! driven by a background task that owns the socket, with automatic
//! reconnection and heartbeat liveness checks.
//!
//! # Connection lifecycle
//!
//! `connect()` spawns a driver task and returns immediately. The driver
//! dials the endpoint (with a connect timeout), then services the socket:
//! inbound text frames are parsed as `{type, data}` envelopes and dispatched
//! to subscribers in arrival order; outbound envelopes drain from a bounded
//! channel fed by `send()`; heartbeat pings go out when the connection has
//! been idle.
//!
//! On an unexpected close or error the driver consults the reconnect policy:
//! status moves `error → reconnecting → connecting` around each backoff
//! delay, and a successful open resets the attempt budget. Spending the
//! whole budget emits a terminal failed-to-reconnect error and leaves the
//! transport `disconnected` until `connect()` is called again. `disconnect()`
//! is the deliberate exit: it cancels any pending reconnect and never counts
//! as a failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::notify::{Notification, NotificationKind, Notifier};
use crate::protocol::{kind, Envelope, Pong};

use super::backoff::{ReconnectConfig, ReconnectPolicy};
use super::heartbeat::{HeartbeatConfig, HeartbeatMonitor, Liveness};
use super::traits::{
    ChatTransport, CloseHandler, ConnectHandler, ConnectionId, ConnectionStatus, ErrorHandler,
    HandlerRegistry, MessageHandler, Subscription, TransportError,
};

/// Outbound frame queue depth per connection.
const OUTBOUND_CAPACITY: usize = 100;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport configuration
#[derive(Clone, Debug)]
pub struct WebSocketConfig {
    /// Endpoint URL (`ws://` or `wss://`)
    pub url: String,
    /// Bearer token appended as a `token` query parameter when present
    pub token: Option<String>,
    /// Timeout for each connection attempt
    pub connect_timeout: Duration,
    /// Reconnect policy after unexpected closes
    pub reconnect: ReconnectConfig,
    /// Heartbeat liveness configuration
    pub heartbeat: HeartbeatConfig,
}

impl WebSocketConfig {
    /// Create a config for the given endpoint with default tuning.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::new(),
            heartbeat: HeartbeatConfig::new(),
        }
    }

    /// Attach an auth token to the connect URL.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the reconnect policy.
    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the heartbeat configuration.
    #[must_use]
    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    /// The URL actually dialed, with the token query parameter applied.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUrl`] unless the scheme is `ws` or
    /// `wss`.
    pub fn connect_url(&self) -> Result<String, TransportError> {
        let url = self.url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(TransportError::InvalidUrl(format!(
                "expected ws:// or wss:// scheme: {url}"
            )));
        }
        match self.token.as_deref() {
            Some(token) if !token.is_empty() => {
                let separator = if url.contains('?') { '&' } else { '?' };
                Ok(format!("{url}{separator}token={token}"))
            }
            _ => Ok(url.to_string()),
        }
    }
}

/// Shared state between the transport handle and its driver task
struct SharedState {
    status: RwLock<ConnectionStatus>,
    outbound: RwLock<Option<mpsc::Sender<Envelope>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
}

/// Production WebSocket [`ChatTransport`]
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    registry: Arc<HandlerRegistry>,
    shared: Arc<SharedState>,
    heartbeat: Arc<HeartbeatMonitor>,
    notifier: Option<Notifier>,
}

impl WebSocketTransport {
    /// Create a transport for the configured endpoint. No connection is
    /// made until [`ChatTransport::connect`].
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        let heartbeat = Arc::new(HeartbeatMonitor::new(config.heartbeat.clone()));
        Self {
            config,
            registry: HandlerRegistry::new(),
            shared: Arc::new(SharedState {
                status: RwLock::new(ConnectionStatus::Disconnected),
                outbound: RwLock::new(None),
                driver: Mutex::new(None),
                shutdown: Mutex::new(None),
            }),
            heartbeat,
            notifier: None,
        }
    }

    /// Route terminal failures to the given notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Snapshot of heartbeat health for the current connection.
    #[must_use]
    pub fn health(&self) -> super::heartbeat::ConnectionHealth {
        self.heartbeat.health()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.driver.lock().take() {
            handle.abort();
        }
    }
}

#[async_trait]
impl ChatTransport for WebSocketTransport {
    /// Must be called from within a tokio runtime; the driver task is
    /// spawned onto it.
    fn connect(&self) {
        {
            let mut status = self.shared.status.write();
            if matches!(
                *status,
                ConnectionStatus::Connecting
                    | ConnectionStatus::Connected
                    | ConnectionStatus::Reconnecting
            ) {
                tracing::debug!(status = %*status, "connect ignored, already in progress");
                return;
            }
            *status = ConnectionStatus::Connecting;
        }

        let url = match self.config.connect_url() {
            Ok(url) => url,
            Err(error) => {
                *self.shared.status.write() = ConnectionStatus::Error;
                tracing::error!(error = %error, "refusing to connect");
                self.registry.dispatch_error(&error);
                return;
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shared.shutdown.lock() = Some(shutdown_tx);

        let driver = ConnectionDriver {
            url,
            connect_timeout: self.config.connect_timeout,
            reconnect: self.config.reconnect.clone(),
            registry: Arc::clone(&self.registry),
            shared: Arc::clone(&self.shared),
            heartbeat: Arc::clone(&self.heartbeat),
            notifier: self.notifier.clone(),
            shutdown_rx,
        };
        let handle = tokio::spawn(driver.run());
        *self.shared.driver.lock() = Some(handle);
    }

    async fn disconnect(&self) {
        let shutdown = self.shared.shutdown.lock().take();
        let driver = self.shared.driver.lock().take();

        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(true);
        }
        if let Some(driver) = driver {
            // The driver exits on the shutdown signal; joining keeps
            // disconnect() a fence for the whole connection lifecycle.
            let _ = driver.await;
        }
        *self.shared.status.write() = ConnectionStatus::Disconnected;
    }

    fn send(&self, envelope: Envelope) {
        if *self.shared.status.read() != ConnectionStatus::Connected {
            tracing::warn!(kind = %envelope.kind, "dropping frame, not connected");
            return;
        }
        let outbound = self.shared.outbound.read();
        match outbound.as_ref() {
            Some(tx) => {
                if let Err(err) = tx.try_send(envelope) {
                    tracing::warn!(error = %err, "dropping frame, outbound queue unavailable");
                }
            }
            None => tracing::warn!("dropping frame, no active connection"),
        }
    }

    fn on_message(&self, kind: &str, handler: MessageHandler) -> Subscription {
        self.registry.subscribe_message(kind, handler)
    }

    fn on_connect(&self, handler: ConnectHandler) -> Subscription {
        self.registry.subscribe_connect(handler)
    }

    fn on_close(&self, handler: CloseHandler) -> Subscription {
        self.registry.subscribe_close(handler)
    }

    fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.registry.subscribe_error(handler)
    }

    fn status(&self) -> ConnectionStatus {
        *self.shared.status.read()
    }
}

/// How a live connection ended
enum ConnectionEnd {
    /// Deliberate disconnect
    Shutdown,
    /// Unexpected failure; feeds the reconnect policy
    Lost(TransportError),
}

/// Background task owning the socket across reconnects
struct ConnectionDriver {
    url: String,
    connect_timeout: Duration,
    reconnect: ReconnectConfig,
    registry: Arc<HandlerRegistry>,
    shared: Arc<SharedState>,
    heartbeat: Arc<HeartbeatMonitor>,
    notifier: Option<Notifier>,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConnectionDriver {
    async fn run(mut self) {
        let mut policy = ReconnectPolicy::new(self.reconnect.clone());

        loop {
            *self.shared.status.write() = ConnectionStatus::Connecting;
            tracing::debug!(url = %self.url, attempt = policy.attempt(), "connecting");

            match timeout(self.connect_timeout, connect_async(self.url.as_str())).await {
                Ok(Ok((ws, _response))) => {
                    let connection_id = ConnectionId::new();
                    policy.reset();
                    self.heartbeat.reset();

                    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
                    *self.shared.outbound.write() = Some(outbound_tx);
                    *self.shared.status.write() = ConnectionStatus::Connected;
                    tracing::info!(connection_id = %connection_id, "connected");
                    self.registry.dispatch_connect();

                    let end = self.drive(ws, outbound_rx, &connection_id).await;
                    self.shared.outbound.write().take();

                    match end {
                        ConnectionEnd::Shutdown => {
                            *self.shared.status.write() = ConnectionStatus::Disconnected;
                            tracing::info!(connection_id = %connection_id, "disconnected");
                            self.registry.dispatch_close();
                            return;
                        }
                        ConnectionEnd::Lost(error) => {
                            *self.shared.status.write() = ConnectionStatus::Error;
                            tracing::warn!(
                                connection_id = %connection_id,
                                error = %error,
                                "connection lost"
                            );
                            self.registry.dispatch_error(&error);
                            self.registry.dispatch_close();
                        }
                    }
                }
                Ok(Err(err)) => {
                    *self.shared.status.write() = ConnectionStatus::Error;
                    let error = TransportError::ConnectionFailed(err.to_string());
                    tracing::warn!(url = %self.url, error = %error, "connect failed");
                    self.registry.dispatch_error(&error);
                }
                Err(_elapsed) => {
                    *self.shared.status.write() = ConnectionStatus::Error;
                    let error = TransportError::ConnectionFailed(format!(
                        "connect timed out after {:?}",
                        self.connect_timeout
                    ));
                    tracing::warn!(url = %self.url, error = %error, "connect timed out");
                    self.registry.dispatch_error(&error);
                }
            }

            match policy.next_delay() {
                Some(delay) => {
                    *self.shared.status.write() = ConnectionStatus::Reconnecting;
                    tracing::warn!(
                        attempt = policy.attempt(),
                        delay_ms = delay.as_millis(),
                        "scheduling reconnect"
                    );
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        _ = self.shutdown_rx.changed() => {
                            *self.shared.status.write() = ConnectionStatus::Disconnected;
                            return;
                        }
                    }
                }
                None => {
                    *self.shared.status.write() = ConnectionStatus::Disconnected;
                    if policy.attempt() > 0 {
                        let error = TransportError::ReconnectExhausted {
                            attempts: policy.attempt(),
                        };
                        tracing::error!(attempts = policy.attempt(), "giving up on reconnection");
                        self.registry.dispatch_error(&error);
                        if let Some(notifier) = &self.notifier {
                            notifier.notify(
                                Notification::error(NotificationKind::Transport, error.to_string())
                                    .with_title("Connection"),
                            );
                        }
                    }
                    return;
                }
            }
        }
    }

    /// Service one live connection until it ends.
    async fn drive(
        &mut self,
        ws: WsStream,
        mut outbound_rx: mpsc::Receiver<Envelope>,
        connection_id: &ConnectionId,
    ) -> ConnectionEnd {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let mut tick = tokio::time::interval(self.heartbeat.config().tick_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.heartbeat.record_activity();
                        match Envelope::parse(&text) {
                            Ok(envelope) => {
                                if envelope.kind == kind::PONG {
                                    match serde_json::from_value::<Pong>(envelope.data.clone()) {
                                        Ok(pong) => {
                                            self.heartbeat.record_pong(pong.seq);
                                        }
                                        Err(err) => {
                                            tracing::warn!(error = %err, "malformed pong payload");
                                        }
                                    }
                                }
                                self.registry.dispatch_message(&envelope);
                            }
                            Err(err) => {
                                tracing::warn!(
                                    connection_id = %connection_id,
                                    error = %err,
                                    "ignoring malformed frame"
                                );
                            }
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(err) = ws_tx.send(Message::Pong(payload)).await {
                            return ConnectionEnd::Lost(TransportError::SendFailed(err.to_string()));
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return ConnectionEnd::Lost(TransportError::ConnectionClosed);
                    }
                    // Binary and socket-level pong frames are outside the protocol.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        return ConnectionEnd::Lost(TransportError::ConnectionFailed(err.to_string()));
                    }
                    None => return ConnectionEnd::Lost(TransportError::ConnectionClosed),
                },
                outbound = outbound_rx.recv() => {
                    let Some(envelope) = outbound else { continue };
                    match envelope.to_text() {
                        Ok(text) => {
                            if let Err(err) = ws_tx.send(Message::Text(text)).await {
                                return ConnectionEnd::Lost(TransportError::SendFailed(err.to_string()));
                            }
                        }
                        Err(err) => tracing::warn!(error = %err, "failed to encode outbound frame"),
                    }
                },
                _ = tick.tick() => {
                    if let Liveness::Dead(missed) = self.heartbeat.check_liveness() {
                        return ConnectionEnd::Lost(TransportError::ConnectionFailed(format!(
                            "heartbeat timed out after {missed} missed pongs"
                        )));
                    }
                    if let Some(seq) = self.heartbeat.prepare_ping() {
                        tracing::trace!(connection_id = %connection_id, seq, "ping sent");
                        match Envelope::ping(seq).to_text() {
                            Ok(text) => {
                                if let Err(err) = ws_tx.send(Message::Text(text)).await {
                                    return ConnectionEnd::Lost(
                                        TransportError::SendFailed(err.to_string()),
                                    );
                                }
                            }
                            Err(err) => tracing::warn!(error = %err, "failed to encode ping"),
                        }
                    }
                },
                _ = self.shutdown_rx.changed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return ConnectionEnd::Shutdown;
                },
            }
        }
    }
}
