//! REST Wire Types
//!
//! Request and response shapes for the backend's HTTP API. These are the
//! documents as the server sends them; [`crate::session`] holds the client's
//! working copies. Conversions live here so the store never sees raw wire
//! records.
//!
//! Timestamps on the wire are Unix epoch milliseconds. Unknown fields are
//! tolerated everywhere; absent optional fields default.

use serde::{Deserialize, Serialize};

use crate::protocol::{CitationMarker, MessageId, MessageRole, SessionId, SourceCitation};
use crate::session::{ChatMessage, DeliveryState, Session};

// =============================================================================
// Auth
// =============================================================================

/// Login credentials
#[derive(Clone, Serialize)]
pub struct LoginRequest {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
}

/// Account creation payload
#[derive(Clone, Serialize)]
pub struct RegisterRequest {
    /// Account email
    pub email: String,
    /// Account password
    pub password: String,
    /// Optional display name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Refresh-token exchange payload
#[derive(Clone, Serialize)]
pub struct RefreshRequest {
    /// The refresh token previously issued by the server
    pub refresh_token: String,
}

/// Successful auth response carrying a fresh token pair
#[derive(Clone, Debug, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for authorized requests
    pub access_token: String,
    /// Token used to mint new access tokens
    pub refresh_token: String,
    /// Profile of the authenticated account, when the server includes it
    #[serde(default)]
    pub user: Option<UserProfile>,
}

/// Account profile
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Server-assigned account id
    pub id: String,
    /// Account email
    pub email: String,
    /// Optional display name
    #[serde(default)]
    pub display_name: Option<String>,
}

// =============================================================================
// Sessions & messages
// =============================================================================

/// A session as the server returns it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Server-assigned identifier
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// Creation time (Unix timestamp ms)
    #[serde(default)]
    pub created_at: u64,
    /// Last activity (Unix timestamp ms); falls back to `created_at`
    #[serde(default)]
    pub last_activity: u64,
    /// Message count when the server reports one
    #[serde(default)]
    pub message_count: Option<u32>,
}

impl From<SessionRecord> for Session {
    fn from(record: SessionRecord) -> Self {
        let last_activity = if record.last_activity == 0 {
            record.created_at
        } else {
            record.last_activity
        };
        Self {
            id: record.id,
            title: record.title,
            created_at: record.created_at,
            last_activity,
            message_count: record.message_count,
        }
    }
}

/// Session creation payload
#[derive(Clone, Serialize)]
pub struct CreateSessionRequest {
    /// Optional initial title; the server assigns a default otherwise
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Session rename payload
#[derive(Clone, Serialize)]
pub struct UpdateSessionRequest {
    /// New display title
    pub title: String,
}

/// A message as the server returns it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageRecord {
    /// Server-assigned identifier
    pub id: MessageId,
    /// Owning session
    pub session_id: SessionId,
    /// Author role
    pub role: MessageRole,
    /// Message content
    #[serde(default)]
    pub content: String,
    /// Creation time (Unix timestamp ms)
    #[serde(default)]
    pub created_at: u64,
    /// Retrieved sources, for assistant messages
    #[serde(default)]
    pub sources: Vec<SourceCitation>,
    /// Inline citation markers into `sources`
    #[serde(default)]
    pub citations: Vec<CitationMarker>,
}

impl From<MessageRecord> for ChatMessage {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            session_id: record.session_id,
            role: record.role,
            content: record.content,
            created_at: record.created_at,
            sources: record.sources,
            citations: record.citations,
            delivery: DeliveryState::Sent,
            streaming: false,
        }
    }
}

/// Message creation payload
#[derive(Clone, Serialize)]
pub struct PostMessageRequest {
    /// Message content
    pub content: String,
    /// Author role; user for everything the client posts
    pub role: MessageRole,
}

// =============================================================================
// Documents
// =============================================================================

/// An uploaded document in the retrieval corpus
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Server-assigned identifier
    pub id: String,
    /// Original file name
    pub name: String,
    /// Size in bytes
    #[serde(default)]
    pub size: u64,
    /// MIME type when known
    #[serde(default)]
    pub content_type: Option<String>,
    /// Upload time (Unix timestamp ms)
    #[serde(default)]
    pub uploaded_at: u64,
    /// Ingestion status as the server reports it (e.g. "indexed")
    #[serde(default)]
    pub status: Option<String>,
}

// =============================================================================
// Feedback
// =============================================================================

/// Thumbs rating on an assistant response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRating {
    /// Helpful response
    Up,
    /// Unhelpful response
    Down,
}

/// Feedback submission payload
#[derive(Clone, Serialize)]
pub struct FeedbackRequest {
    /// The assistant message being rated
    pub message_id: MessageId,
    /// Thumbs up or down
    pub rating: FeedbackRating,
    /// Optional free-form comment
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

// =============================================================================
// Metrics
// =============================================================================

/// Usage metrics snapshot
///
/// The server's metrics document grows over time; typed fields cover the
/// stable core and everything else lands in `extra`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MetricsSnapshot {
    /// Total sessions on the account
    #[serde(default)]
    pub total_sessions: u64,
    /// Total messages exchanged
    #[serde(default)]
    pub total_messages: u64,
    /// Documents in the retrieval corpus
    #[serde(default)]
    pub total_documents: u64,
    /// Mean response latency in milliseconds
    #[serde(default)]
    pub avg_response_ms: Option<f64>,
    /// Fields this client version does not model
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

// =============================================================================
// Fine-tuning
// =============================================================================

/// Lifecycle state of a fine-tuning job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FineTuneStatus {
    /// Queued, not yet started
    Pending,
    /// Training in progress
    Running,
    /// Finished successfully
    Succeeded,
    /// Finished with an error
    Failed,
    /// Cancelled before completion
    Cancelled,
}

/// A fine-tuning job as the server returns it
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FineTuneJob {
    /// Server-assigned identifier
    pub id: String,
    /// Current lifecycle state
    pub status: FineTuneStatus,
    /// Base model being tuned
    #[serde(default)]
    pub base_model: Option<String>,
    /// Creation time (Unix timestamp ms)
    #[serde(default)]
    pub created_at: u64,
    /// Completion fraction in `[0, 1]` while running
    #[serde(default)]
    pub progress: Option<f64>,
    /// Failure detail for failed jobs
    #[serde(default)]
    pub error: Option<String>,
}

/// Fine-tuning job creation payload
#[derive(Clone, Serialize)]
pub struct CreateFineTuneRequest {
    /// Base model to tune; server default when omitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model: Option<String>,
    /// Documents to train on; entire corpus when empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,
}
