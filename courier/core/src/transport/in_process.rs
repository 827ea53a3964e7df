//! In-Process Transport
//!
//! Channel-backed [`ChatTransport`] for tests and embedded use. Inbound
//! frames are injected directly and flow through the same subscriber
//! registry as the WebSocket implementation, so consumers behave identically
//! against either.
//!
//! # Usage
//!
//! ```ignore
//! let (transport, mut sent_rx) = InProcessTransport::new_pair();
//! let transport = Arc::new(transport);
//! transport.connect();
//!
//! // Observe what the client sends:
//! let frame = sent_rx.recv().await;
//!
//! // Play a server frame to subscribers:
//! transport.inject(Envelope::new("content", json!({ ... })));
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::protocol::Envelope;

use super::traits::{
    ChatTransport, CloseHandler, ConnectHandler, ConnectionStatus, ErrorHandler, HandlerRegistry,
    MessageHandler, Subscription, TransportError,
};

/// In-process transport using tokio channels
///
/// Zero-I/O stand-in for the WebSocket transport. Frames sent by the client
/// appear on the receiver returned from [`InProcessTransport::new_pair`];
/// server behavior is scripted through [`InProcessTransport::inject`] and the
/// `simulate_*` methods.
pub struct InProcessTransport {
    registry: Arc<HandlerRegistry>,
    status: RwLock<ConnectionStatus>,
    sent_tx: mpsc::Sender<Envelope>,
}

impl InProcessTransport {
    /// Create a transport and the receiver observing frames the client sends.
    ///
    /// The transport starts disconnected; call [`ChatTransport::connect`].
    #[must_use]
    pub fn new_pair() -> (Self, mpsc::Receiver<Envelope>) {
        Self::new_pair_with_capacity(100)
    }

    /// Create with custom outbound channel capacity.
    #[must_use]
    pub fn new_pair_with_capacity(capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (sent_tx, sent_rx) = mpsc::channel(capacity);
        let transport = Self {
            registry: HandlerRegistry::new(),
            status: RwLock::new(ConnectionStatus::Disconnected),
            sent_tx,
        };
        (transport, sent_rx)
    }

    /// Deliver a server frame to subscribers.
    ///
    /// Frames injected while not connected are dropped, matching a real
    /// socket that cannot receive when closed.
    pub fn inject(&self, envelope: Envelope) {
        if *self.status.read() != ConnectionStatus::Connected {
            tracing::warn!(kind = %envelope.kind, "dropping injected frame, not connected");
            return;
        }
        self.registry.dispatch_message(&envelope);
    }

    /// Report a transport error to error subscribers and enter the error state.
    pub fn simulate_error(&self, error: &TransportError) {
        *self.status.write() = ConnectionStatus::Error;
        self.registry.dispatch_error(error);
    }

    /// Simulate an unexpected connection loss.
    ///
    /// Close subscribers fire and status becomes `Error`, as after a real
    /// socket drop (the fake performs no reconnection).
    pub fn simulate_connection_loss(&self) {
        *self.status.write() = ConnectionStatus::Error;
        self.registry.dispatch_close();
        self.registry.dispatch_error(&TransportError::ConnectionClosed);
    }
}

#[async_trait]
impl ChatTransport for InProcessTransport {
    fn connect(&self) {
        {
            let mut status = self.status.write();
            if matches!(
                *status,
                ConnectionStatus::Connecting | ConnectionStatus::Connected
            ) {
                return;
            }
            *status = ConnectionStatus::Connected;
        }
        self.registry.dispatch_connect();
    }

    async fn disconnect(&self) {
        let was_connected = {
            let mut status = self.status.write();
            let was_connected = *status == ConnectionStatus::Connected;
            *status = ConnectionStatus::Disconnected;
            was_connected
        };
        if was_connected {
            self.registry.dispatch_close();
        }
    }

    fn send(&self, envelope: Envelope) {
        if *self.status.read() != ConnectionStatus::Connected {
            tracing::warn!(kind = %envelope.kind, "dropping frame, not connected");
            return;
        }
        if let Err(err) = self.sent_tx.try_send(envelope) {
            tracing::warn!(error = %err, "dropping frame, peer not draining");
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
        *self.status.read()
    }
}
