//! Courier Core - Headless Chat/RAG Client
//!
//! This crate is the client core for courier, a chat/RAG (retrieval-augmented
//! generation) frontend, completely independent of any UI framework. It can
//! drive a TUI, native GUI, mobile app, or run headless for testing and
//! automation: the surface renders store state and forwards user intent, the
//! core does everything else.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         UI Surfaces                            │
//! │  ┌─────────┐  ┌─────────┐  ┌──────────┐  ┌──────────────────┐  │
//! │  │   TUI   │  │ Desktop │  │  Mobile  │  │ Headless / Tests │  │
//! │  └────┬────┘  └────┬────┘  └────┬─────┘  └────────┬─────────┘  │
//! │       └────────────┴──────┬─────┴─────────────────┘            │
//! │                           │                                    │
//! │                    commands (down)                             │
//! │                   StoreUpdate (up)                             │
//! │                           │                                    │
//! └───────────────────────────┼────────────────────────────────────┘
//!                             │
//! ┌───────────────────────────┼────────────────────────────────────┐
//! │                      COURIER CORE                              │
//! │  ┌────────────────────────┴───────────────────────────────┐    │
//! │  │                       ChatStore                         │    │
//! │  │   ┌──────────┐   ┌────────────┐   ┌────────────────┐   │    │
//! │  │   │ Sessions │   │ StreamSlot │   │    Notifier    │   │    │
//! │  │   └──────────┘   └────────────┘   └────────────────┘   │    │
//! │  └───────┬────────────────────────────────────┬───────────┘    │
//! │  ┌───────┴───────┐                    ┌───────┴────────┐       │
//! │  │    HttpApi    │                    │ ChatTransport  │       │
//! │  │  (REST, auth) │                    │  (WebSocket)   │       │
//! │  └───────────────┘                    └────────────────┘       │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ChatStore`]: Sessions, messages, and the streaming reducer in one place
//! - [`ChatTransport`]: Injectable transport seam (WebSocket or in-process)
//! - [`WebSocketTransport`]: Production transport with reconnect and heartbeat
//! - [`InProcessTransport`]: Deterministic transport for tests
//! - [`HttpApi`]: REST client with bearer auth and refresh-and-retry
//! - [`Notifier`]: Centralized notification channel shared by every layer
//! - [`ClientConfig`]: Resolved configuration (file, environment, overrides)
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use courier_core::{
//!     api::HttpApi,
//!     config::load_config,
//!     store::ChatStore,
//!     transport::{ChatTransport, WebSocketTransport},
//!     AuthState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     courier_core::init_logging("info");
//!
//!     let config = load_config()?;
//!     let auth = Arc::new(AuthState::persisted()?);
//!     auth.load().await?;
//!
//!     let api = Arc::new(HttpApi::new(config.rest_url.clone(), Arc::clone(&auth)));
//!     let transport: Arc<dyn ChatTransport> =
//!         Arc::new(WebSocketTransport::new(config.websocket_config()));
//!
//!     let mut store = ChatStore::new(api, transport);
//!     store.connect();
//!     store.fetch_sessions().await?;
//!
//!     store.send_message("What does the Q3 report say?", None).await?;
//!
//!     // Main loop: apply stream frames as they arrive, re-render after each
//!     while let Some(_frame) = store.next_event().await {
//!         for message in store.messages() {
//!             // render message
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`protocol`]: Wire envelope and the typed stream frame family
//! - [`transport`]: WebSocket transport, reconnect backoff, heartbeat, pub/sub
//! - [`api`]: REST client, typed endpoints, token persistence
//! - [`session`]: Session and message domain types with delivery states
//! - [`store`]: The chat store joining REST state with live stream frames
//! - [`notify`]: Centralized user-facing notifications
//! - [`config`]: TOML configuration file, environment, and override layering
//! - [`settings`]: Accessibility and theme settings, persisted
//! - [`history`]: Capped recent-query history, persisted
//!
//! # No UI Dependencies
//!
//! This crate has **zero** dependencies on any UI framework. Rendering,
//! input handling, and form validation belong to the surface; everything a
//! surface needs to read is reachable from [`ChatStore`] accessors.

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod config;
pub mod history;
pub mod notify;
pub mod protocol;
pub mod session;
pub mod settings;
pub mod store;
pub mod transport;

// Protocol exports
pub use protocol::{
    CitationMarker, Envelope, MessageId, MessageRole, SessionId, SourceCitation, StreamFrame,
};

// Session exports
pub use session::{ChatMessage, DeliveryState, Session};

// Store exports
pub use store::{ChatStore, SendPhase, SendReceipt, StoreError, StoreUpdate};

// Transport exports
pub use transport::{
    ChatTransport, ConnectionId, ConnectionStatus, HeartbeatConfig, InProcessTransport,
    ReconnectConfig, Subscription, TransportError, WebSocketConfig, WebSocketTransport,
};

// API exports
pub use api::{
    ApiError, AuthState, ChatApi, HttpApi, MessageRecord, SessionRecord, TokenError, TokenPair,
    UploadHandle,
};

// Notification exports
pub use notify::{Notification, NotificationKind, Notifier, NotifyLevel, Urgency};

// Config exports
pub use config::{
    default_config_path, load_config, load_config_from_path, ClientConfig, ConfigError,
    ConfigOverrides, ConfigSource,
};

// Settings exports
pub use settings::{AccessibilitySettings, FontScale, Settings, SettingsStore, Theme};

// History exports
pub use history::{HistoryEntry, PromptHistory};

/// Install a `tracing` subscriber writing to stderr.
///
/// Intended for surfaces and test binaries; libraries embedding courier-core
/// that already install their own subscriber should skip this. `RUST_LOG`
/// takes precedence over `level`, which is applied to this crate only.
/// Calling it more than once is harmless; later calls are no-ops.
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("courier_core={level}")));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
