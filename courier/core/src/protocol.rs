//! Wire Protocol
//!
//! JSON envelopes exchanged with the backend over the WebSocket transport,
//! plus the identifier and citation types shared by the wire, the REST DTOs,
//! and the session store.
//!
//! # Design Philosophy
//!
//! The backend speaks a minimal framing: every message is a JSON text frame
//! of the shape `{"type": string, "data": object}`. The transport routes
//! frames to subscribers by the `type` tag alone and never interprets the
//! payload; payload decoding happens at the subscriber with the typed
//! structs defined here. No versioning or schema negotiation exists on the
//! wire, so unknown tags are delivered to whoever subscribed to them and
//! otherwise ignored.
//!
//! Known inbound tags are the streaming family ([`kind::STREAM_START`],
//! [`kind::STREAM_CONTENT`], [`kind::STREAM_END`], [`kind::STREAM_ERROR`])
//! and the heartbeat reply [`kind::PONG`]. The client sends [`kind::PING`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Inbound and outbound message type tags.
pub mod kind {
    /// A stream has started; binds a server message id to the stream slot.
    pub const STREAM_START: &str = "start";
    /// Partial assistant content for the active stream.
    pub const STREAM_CONTENT: &str = "content";
    /// The stream finished; may carry authoritative final content.
    pub const STREAM_END: &str = "end";
    /// The stream failed server-side.
    pub const STREAM_ERROR: &str = "error";
    /// Heartbeat request (client to server).
    pub const PING: &str = "ping";
    /// Heartbeat reply (server to client).
    pub const PONG: &str = "pong";
}

// ============================================
// Identifiers
// ============================================

/// Session identifier
///
/// Assigned by the backend when a session is created; opaque to the client.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message identifier
///
/// Server-assigned for confirmed messages. Optimistically created user
/// messages carry a temporary id derived from their correlation uuid until
/// the server response replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Build the temporary id for an optimistic entry from its correlation uuid.
    #[must_use]
    pub fn temporary(correlation: &Uuid) -> Self {
        Self(format!("temp_{correlation}"))
    }

    /// Whether this id is a client-side temporary id awaiting reconciliation.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self.0.starts_with("temp_")
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// User input
    User,
    /// Assistant response
    Assistant,
    /// System message
    System,
}

// ============================================
// Citations
// ============================================

/// A retrieved source attached to a finalized assistant message
///
/// Read-only: fetched from the backend, never mutated by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Source identifier
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Optional link to the source document
    #[serde(default)]
    pub url: Option<String>,
    /// Optional excerpt or body text
    #[serde(default)]
    pub content: Option<String>,
    /// Retrieval relevance score
    pub score: f64,
    /// Backend-defined metadata bag
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
}

/// An inline citation marker within assistant content
///
/// Points a character offset in the message text at an index into the
/// message's source list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationMarker {
    /// Character offset into the final content
    pub offset: usize,
    /// Index into the attached source list
    pub source_index: usize,
}

// ============================================
// Envelope
// ============================================

/// The `{type, data}` JSON envelope carried in every WebSocket text frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type tag used for subscriber routing
    #[serde(rename = "type")]
    pub kind: String,
    /// Untyped payload; decoded by subscribers
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope from a tag and payload.
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Build a heartbeat ping envelope.
    #[must_use]
    pub fn ping(seq: u64) -> Self {
        Self::new(kind::PING, serde_json::json!({ "seq": seq }))
    }

    /// Serialize to the wire text representation.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error; only possible if `data`
    /// contains a non-string map key, which the typed payloads never do.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse an envelope from a wire text frame.
    ///
    /// # Errors
    ///
    /// Returns a decode error when the frame is not a `{type, data}` object.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

// ============================================
// Stream family payloads
// ============================================

/// Payload of a [`kind::STREAM_START`] frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamStart {
    /// Session the stream belongs to
    pub session_id: SessionId,
    /// Server-assigned id for the assistant message being streamed
    pub message_id: MessageId,
}

/// Payload of a [`kind::STREAM_CONTENT`] frame
///
/// `content` is a delta: the reducer appends it to the accumulated buffer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamContent {
    /// Message the content belongs to
    pub message_id: MessageId,
    /// Partial content to append
    pub content: String,
}

/// Payload of a [`kind::STREAM_END`] frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamEnd {
    /// Message that completed
    pub message_id: MessageId,
    /// Authoritative final content; wins over the accumulated buffer
    #[serde(default)]
    pub final_content: Option<String>,
    /// Sources retrieved for this response
    #[serde(default)]
    pub sources: Vec<SourceCitation>,
    /// Inline citation markers into `sources`
    #[serde(default)]
    pub citations: Vec<CitationMarker>,
}

/// Payload of a [`kind::STREAM_ERROR`] frame
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StreamError {
    /// Message the stream was feeding, when known
    #[serde(default)]
    pub message_id: Option<MessageId>,
    /// Error description from the backend
    pub error: String,
}

/// Payload of a [`kind::PONG`] frame
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    /// Sequence number echoed from the ping
    pub seq: u64,
}

/// A decoded frame from the streaming family
#[derive(Clone, Debug, PartialEq)]
pub enum StreamFrame {
    /// Stream opened
    Start(StreamStart),
    /// Partial content arrived
    Content(StreamContent),
    /// Stream finished
    End(StreamEnd),
    /// Stream failed
    Error(StreamError),
}

impl StreamFrame {
    /// Decode a stream-family frame from an envelope.
    ///
    /// Returns `Ok(None)` for tags outside the streaming family.
    ///
    /// # Errors
    ///
    /// Returns the decode error when the tag is in the family but the
    /// payload does not match its schema.
    pub fn decode(envelope: &Envelope) -> Result<Option<Self>, serde_json::Error> {
        let data = envelope.data.clone();
        let frame = match envelope.kind.as_str() {
            kind::STREAM_START => Some(Self::Start(serde_json::from_value(data)?)),
            kind::STREAM_CONTENT => Some(Self::Content(serde_json::from_value(data)?)),
            kind::STREAM_END => Some(Self::End(serde_json::from_value(data)?)),
            kind::STREAM_ERROR => Some(Self::Error(serde_json::from_value(data)?)),
            _ => None,
        };
        Ok(frame)
    }

    /// The message id the frame targets, when it carries one.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        match self {
            Self::Start(p) => Some(&p.message_id),
            Self::Content(p) => Some(&p.message_id),
            Self::End(p) => Some(&p.message_id),
            Self::Error(p) => p.message_id.as_ref(),
        }
    }
}
