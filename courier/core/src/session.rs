//! Session Data Model
//!
//! Sessions and chat messages as the store holds them in memory. A session is
//! a persisted conversation thread; messages belong to exactly one session.
//!
//! # Design Philosophy
//!
//! The backend owns the durable truth; this model is the client's working
//! copy. Two lifecycle wrinkles shape it:
//!
//! - User messages appear *optimistically*: the entry is visible immediately
//!   with a temporary id and a `Pending` delivery state carrying a
//!   correlation uuid. The server response replaces it (matched by
//!   correlation) or, on failure, the entry turns visibly `Failed` instead
//!   of vanishing.
//! - Assistant messages are born as empty streaming placeholders and mutate
//!   in place as stream content arrives, then finalize with sources.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::protocol::{CitationMarker, MessageId, MessageRole, SessionId, SourceCitation};

/// Milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    #[allow(clippy::cast_possible_truncation)]
    let ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    ms
}

/// A conversation thread
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Server-assigned identifier
    pub id: SessionId,
    /// Display title
    pub title: String,
    /// When the session was created (Unix timestamp ms)
    pub created_at: u64,
    /// Last activity in the session (Unix timestamp ms)
    pub last_activity: u64,
    /// Message count when the backend reports one
    pub message_count: Option<u32>,
}

impl Session {
    /// Record activity now.
    pub fn touch(&mut self) {
        self.last_activity = now_ms();
    }
}

/// Delivery state of a message, for the optimistic-update lifecycle
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryState {
    /// Optimistic local entry awaiting server confirmation
    Pending {
        /// Correlation uuid matched against the eventual server response
        correlation: Uuid,
    },
    /// Confirmed by (or originated from) the server
    Sent,
    /// The post failed; the entry stays visible with the reason
    Failed {
        /// Why delivery failed
        reason: String,
    },
}

/// A message in a conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message id (temporary until confirmed for optimistic entries)
    pub id: MessageId,
    /// Owning session
    pub session_id: SessionId,
    /// Who sent this message
    pub role: MessageRole,
    /// Message content
    pub content: String,
    /// When the message was created (Unix timestamp ms)
    pub created_at: u64,
    /// Sources retrieved for this response (assistant messages)
    pub sources: Vec<SourceCitation>,
    /// Inline citation markers into `sources`
    pub citations: Vec<CitationMarker>,
    /// Delivery state for the optimistic lifecycle
    pub delivery: DeliveryState,
    /// Whether the message is still being streamed
    pub streaming: bool,
}

impl ChatMessage {
    /// Create an optimistic user message with a fresh correlation uuid.
    ///
    /// The returned uuid is what the send workflow matches the server
    /// response against.
    #[must_use]
    pub fn optimistic_user(session_id: SessionId, content: impl Into<String>) -> (Self, Uuid) {
        let correlation = Uuid::new_v4();
        let message = Self {
            id: MessageId::temporary(&correlation),
            session_id,
            role: MessageRole::User,
            content: content.into(),
            created_at: now_ms(),
            sources: Vec::new(),
            citations: Vec::new(),
            delivery: DeliveryState::Pending { correlation },
            streaming: false,
        };
        (message, correlation)
    }

    /// Create an empty assistant placeholder for an incoming stream.
    #[must_use]
    pub fn streaming_placeholder(session_id: SessionId, id: MessageId) -> Self {
        Self {
            id,
            session_id,
            role: MessageRole::Assistant,
            content: String::new(),
            created_at: now_ms(),
            sources: Vec::new(),
            citations: Vec::new(),
            delivery: DeliveryState::Sent,
            streaming: true,
        }
    }

    /// Append streamed content.
    pub fn append(&mut self, text: &str) {
        self.content.push_str(text);
    }

    /// Mark streaming as complete.
    pub fn complete(&mut self) {
        self.streaming = false;
    }

    /// Mark delivery as failed, keeping the entry visible.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.streaming = false;
        self.delivery = DeliveryState::Failed {
            reason: reason.into(),
        };
    }

    /// Correlation uuid while the message is pending.
    #[must_use]
    pub fn correlation(&self) -> Option<Uuid> {
        match self.delivery {
            DeliveryState::Pending { correlation } => Some(correlation),
            _ => None,
        }
    }

    /// Whether this entry failed delivery.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.delivery, DeliveryState::Failed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_id() -> SessionId {
        SessionId("s1".to_string())
    }

    #[test]
    fn test_optimistic_user_has_matching_temp_id() {
        let (message, correlation) = ChatMessage::optimistic_user(session_id(), "hello");
        assert!(message.id.is_temporary());
        assert_eq!(message.id, MessageId::temporary(&correlation));
        assert_eq!(message.correlation(), Some(correlation));
        assert_eq!(message.role, MessageRole::User);
        assert!(!message.streaming);
    }

    #[test]
    fn test_streaming_placeholder_starts_empty() {
        let placeholder =
            ChatMessage::streaming_placeholder(session_id(), MessageId("m1".to_string()));
        assert!(placeholder.streaming);
        assert!(placeholder.content.is_empty());
        assert_eq!(placeholder.role, MessageRole::Assistant);
        assert_eq!(placeholder.delivery, DeliveryState::Sent);
    }

    #[test]
    fn test_append_then_complete() {
        let mut message =
            ChatMessage::streaming_placeholder(session_id(), MessageId("m1".to_string()));
        message.append("Hello");
        message.append(", world");
        message.complete();
        assert_eq!(message.content, "Hello, world");
        assert!(!message.streaming);
    }

    #[test]
    fn test_failed_entry_stays_visible() {
        let (mut message, _) = ChatMessage::optimistic_user(session_id(), "hello");
        message.fail("network unreachable");
        assert!(message.is_failed());
        assert_eq!(message.content, "hello");
        assert_eq!(message.correlation(), None);
    }

    #[test]
    fn test_session_touch_advances_activity() {
        let mut session = Session {
            id: session_id(),
            title: "New chat".to_string(),
            created_at: 1000,
            last_activity: 1000,
            message_count: None,
        };
        session.touch();
        assert!(session.last_activity >= 1000);
    }
}
