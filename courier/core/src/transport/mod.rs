//! Transport Layer for Client-Backend Messaging
//!
//! Provides abstraction over the realtime connection to the backend:
//! - `WebSocket`: the production transport (`ws://` / `wss://`)
//! - `InProcess`: loopback transport for embedding and tests
//!
//! # Design Philosophy
//!
//! The transport layer separates the communication mechanism from the
//! session store and rendering surfaces. Consumers subscribe to typed
//! `{type, data}` envelopes and never touch sockets directly. This enables:
//! - Driving the store from a scripted transport in tests
//! - Swapping the wire mechanism without touching chat logic
//! - Centralized reconnect and liveness handling
//!
//! # Delivery contract
//!
//! Frames on one connection are dispatched to subscribers in arrival order.
//! `send()` never blocks and never fails loudly: frames sent while the
//! connection is down are dropped and logged.

pub mod backoff;
pub mod heartbeat;
pub mod in_process;
pub mod traits;
pub mod websocket;

// Re-exports for convenience
pub use backoff::{ReconnectConfig, ReconnectPolicy};
pub use heartbeat::{ConnectionHealth, HeartbeatConfig, HeartbeatMonitor, Liveness};
pub use in_process::InProcessTransport;
pub use traits::{
    ChatTransport, CloseHandler, ConnectHandler, ConnectionId, ConnectionStatus, ErrorHandler,
    MessageHandler, Subscription, TransportError,
};
pub use websocket::{WebSocketConfig, WebSocketTransport};
