//! Transport Traits
//!
//! The client-side transport contract and the subscriber registry shared by
//! every implementation.
//!
//! # Design Philosophy
//!
//! The transport owns exactly one logical connection and knows nothing about
//! chat semantics: it routes `{type, data}` envelopes to subscribers by type
//! tag and reports its own lifecycle. Consumers receive the transport as
//! `Arc<dyn ChatTransport>` so production code and tests can inject different
//! implementations ([`crate::transport::WebSocketTransport`] over the wire,
//! [`crate::transport::InProcessTransport`] in memory) without the store
//! noticing.
//!
//! Failure semantics follow the connection contract: transport errors never
//! cross this boundary as panics or results from `send`; they surface through
//! `on_error` subscriptions and logs only.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::protocol::Envelope;

/// Unique identifier for one connection attempt's lifetime
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Generate a new unique connection ID from a random 128-bit value.
    #[must_use]
    pub fn new() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(format!("conn_{}", hex::encode(bytes)))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle state
///
/// `Disconnected` is reached by explicit [`ChatTransport::disconnect`] or by
/// exhausting the reconnect budget; `Error` is the transient state after an
/// unexpected failure, before either a reconnect attempt or giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No connection and none in progress
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Connected and usable
    Connected,
    /// Waiting out a backoff delay before retrying
    Reconnecting,
    /// An unexpected failure occurred
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// Errors that can occur during transport operations
#[derive(Debug)]
pub enum TransportError {
    /// Connection to the endpoint failed
    ConnectionFailed(String),
    /// Connection was closed unexpectedly
    ConnectionClosed,
    /// Failed to send a frame
    SendFailed(String),
    /// Frame serialization/deserialization error
    SerializationError(String),
    /// Endpoint URL could not be used
    InvalidUrl(String),
    /// IO error from the underlying socket
    IoError(std::io::Error),
    /// Reconnect budget spent without re-establishing the connection
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "Connection failed: {msg}"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::SendFailed(msg) => write!(f, "Send failed: {msg}"),
            Self::SerializationError(msg) => write!(f, "Serialization error: {msg}"),
            Self::InvalidUrl(msg) => write!(f, "Invalid endpoint URL: {msg}"),
            Self::IoError(e) => write!(f, "IO error: {e}"),
            Self::ReconnectExhausted { attempts } => {
                write!(f, "Failed to reconnect after {attempts} attempts")
            }
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err)
    }
}

/// Handler for inbound envelopes of a subscribed type tag
pub type MessageHandler = Box<dyn Fn(&Envelope) + Send + Sync>;
/// Handler for connection-established events
pub type ConnectHandler = Box<dyn Fn() + Send + Sync>;
/// Handler for connection-closed events
pub type CloseHandler = Box<dyn Fn() + Send + Sync>;
/// Handler for transport errors
pub type ErrorHandler = Box<dyn Fn(&TransportError) + Send + Sync>;

/// Transport contract for the chat client
///
/// One logical connection, categorized subscriptions, silent-drop sends.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Begin connecting. No-op while already connecting or connected.
    ///
    /// Non-blocking: the connection is driven in the background and progress
    /// is observable via [`ChatTransport::status`] and `on_connect`.
    fn connect(&self);

    /// Deliberately close the connection and cancel any pending reconnect.
    ///
    /// A terminal user action, not a failure. Idempotent.
    async fn disconnect(&self);

    /// Send an envelope as a JSON text frame.
    ///
    /// When the connection is not open the frame is dropped and logged;
    /// callers check [`ChatTransport::status`] or tolerate drops.
    fn send(&self, envelope: Envelope);

    /// Subscribe to inbound envelopes with the given type tag.
    fn on_message(&self, kind: &str, handler: MessageHandler) -> Subscription;

    /// Subscribe to connection-established events.
    fn on_connect(&self, handler: ConnectHandler) -> Subscription;

    /// Subscribe to connection-closed events.
    fn on_close(&self, handler: CloseHandler) -> Subscription;

    /// Subscribe to transport errors.
    fn on_error(&self, handler: ErrorHandler) -> Subscription;

    /// Current lifecycle state.
    fn status(&self) -> ConnectionStatus;

    /// Whether the connection is currently open.
    fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }
}

// ============================================
// Subscriber registry
// ============================================

enum SubscriptionTarget {
    Message(String),
    Connect,
    Close,
    Error,
}

/// Handle to an active subscription
///
/// Call [`Subscription::unsubscribe`] to remove the handler. Dropping the
/// handle without unsubscribing leaves the handler registered for the
/// transport's lifetime.
pub struct Subscription {
    registry: Arc<HandlerRegistry>,
    target: SubscriptionTarget,
    id: u64,
}

impl Subscription {
    /// Remove the handler from the registry.
    pub fn unsubscribe(self) {
        self.registry.remove(&self.target, self.id);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// Shared dispatch table for categorized transport events
///
/// Handlers per category run in subscription order. Dispatch snapshots the
/// handler list before invoking so handlers may subscribe or unsubscribe
/// reentrantly.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: AtomicU64,
    #[allow(clippy::type_complexity)]
    message: RwLock<HashMap<String, Vec<(u64, Arc<dyn Fn(&Envelope) + Send + Sync>)>>>,
    connect: RwLock<Vec<(u64, Arc<dyn Fn() + Send + Sync>)>>,
    close: RwLock<Vec<(u64, Arc<dyn Fn() + Send + Sync>)>>,
    error: RwLock<Vec<(u64, Arc<dyn Fn(&TransportError) + Send + Sync>)>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub(crate) fn subscribe_message(
        self: &Arc<Self>,
        kind: &str,
        handler: MessageHandler,
    ) -> Subscription {
        let id = self.next_id();
        self.message
            .write()
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::from(handler)));
        Subscription {
            registry: Arc::clone(self),
            target: SubscriptionTarget::Message(kind.to_string()),
            id,
        }
    }

    pub(crate) fn subscribe_connect(self: &Arc<Self>, handler: ConnectHandler) -> Subscription {
        let id = self.next_id();
        self.connect.write().push((id, Arc::from(handler)));
        Subscription {
            registry: Arc::clone(self),
            target: SubscriptionTarget::Connect,
            id,
        }
    }

    pub(crate) fn subscribe_close(self: &Arc<Self>, handler: CloseHandler) -> Subscription {
        let id = self.next_id();
        self.close.write().push((id, Arc::from(handler)));
        Subscription {
            registry: Arc::clone(self),
            target: SubscriptionTarget::Close,
            id,
        }
    }

    pub(crate) fn subscribe_error(self: &Arc<Self>, handler: ErrorHandler) -> Subscription {
        let id = self.next_id();
        self.error.write().push((id, Arc::from(handler)));
        Subscription {
            registry: Arc::clone(self),
            target: SubscriptionTarget::Error,
            id,
        }
    }

    fn remove(&self, target: &SubscriptionTarget, id: u64) {
        match target {
            SubscriptionTarget::Message(kind) => {
                let mut map = self.message.write();
                if let Some(handlers) = map.get_mut(kind) {
                    handlers.retain(|(handler_id, _)| *handler_id != id);
                    if handlers.is_empty() {
                        map.remove(kind);
                    }
                }
            }
            SubscriptionTarget::Connect => {
                self.connect.write().retain(|(handler_id, _)| *handler_id != id);
            }
            SubscriptionTarget::Close => {
                self.close.write().retain(|(handler_id, _)| *handler_id != id);
            }
            SubscriptionTarget::Error => {
                self.error.write().retain(|(handler_id, _)| *handler_id != id);
            }
        }
    }

    pub(crate) fn dispatch_message(&self, envelope: &Envelope) {
        let handlers: Vec<_> = self
            .message
            .read()
            .get(&envelope.kind)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(kind = %envelope.kind, "no subscribers for inbound frame");
        }
        for handler in handlers {
            handler(envelope);
        }
    }

    pub(crate) fn dispatch_connect(&self) {
        let handlers: Vec<_> = self
            .connect
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub(crate) fn dispatch_close(&self) {
        let handlers: Vec<_> = self
            .close
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler();
        }
    }

    pub(crate) fn dispatch_error(&self, error: &TransportError) {
        let handlers: Vec<_> = self
            .error
            .read()
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            handler(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::ConnectionFailed("refused".to_string());
        assert!(err.to_string().contains("Connection failed"));

        let err = TransportError::ReconnectExhausted { attempts: 3 };
        assert_eq!(err.to_string(), "Failed to reconnect after 3 attempts");

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = TransportError::IoError(io_err);
        assert!(err.to_string().contains("IO error"));
    }

    #[test]
    fn test_dispatch_in_subscription_order() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = Arc::clone(&seen);
        let _sub1 = registry.subscribe_message(
            "content",
            Box::new(move |_| first.lock().unwrap().push("first")),
        );
        let second = Arc::clone(&seen);
        let _sub2 = registry.subscribe_message(
            "content",
            Box::new(move |_| second.lock().unwrap().push("second")),
        );

        registry.dispatch_message(&Envelope::new("content", json!({})));
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_unsubscribe_removes_handler() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(0_u32));

        let counter = Arc::clone(&seen);
        let sub = registry.subscribe_message(
            "content",
            Box::new(move |_| *counter.lock().unwrap() += 1),
        );

        registry.dispatch_message(&Envelope::new("content", json!({})));
        sub.unsubscribe();
        registry.dispatch_message(&Envelope::new("content", json!({})));

        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_dispatch_unknown_kind_is_noop() {
        let registry = HandlerRegistry::new();
        registry.dispatch_message(&Envelope::new("nobody-listens", json!({})));
    }

    #[test]
    fn test_handlers_only_receive_their_kind() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let starts = Arc::clone(&seen);
        let _sub = registry.subscribe_message(
            "start",
            Box::new(move |env| starts.lock().unwrap().push(env.kind.clone())),
        );

        registry.dispatch_message(&Envelope::new("content", json!({})));
        registry.dispatch_message(&Envelope::new("start", json!({})));
        assert_eq!(*seen.lock().unwrap(), vec!["start".to_string()]);
    }

    #[test]
    fn test_reentrant_unsubscribe_during_dispatch() {
        let registry = HandlerRegistry::new();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&slot);
        let sub = registry.subscribe_connect(Box::new(move || {
            // Removing oneself mid-dispatch must not deadlock.
            if let Some(sub) = inner.lock().unwrap().take() {
                sub.unsubscribe();
            }
        }));
        *slot.lock().unwrap() = Some(sub);

        registry.dispatch_connect();
        registry.dispatch_connect();
    }

    #[test]
    fn test_lifecycle_dispatch() {
        let registry = HandlerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let opened = Arc::clone(&seen);
        let _c1 = registry.subscribe_connect(Box::new(move || opened.lock().unwrap().push("open")));
        let closed = Arc::clone(&seen);
        let _c2 = registry.subscribe_close(Box::new(move || closed.lock().unwrap().push("close")));
        let errored = Arc::clone(&seen);
        let _c3 = registry.subscribe_error(Box::new(move |err| {
            errored.lock().unwrap().push(if matches!(err, TransportError::ConnectionClosed) {
                "closed-error"
            } else {
                "other-error"
            });
        }));

        registry.dispatch_connect();
        registry.dispatch_error(&TransportError::ConnectionClosed);
        registry.dispatch_close();

        assert_eq!(*seen.lock().unwrap(), vec!["open", "closed-error", "close"]);
    }
}
