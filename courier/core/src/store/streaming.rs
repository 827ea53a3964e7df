//! Stream Slot Reducer
//!
//! Bookkeeping for the single in-flight assistant response. The slot owns
//! the accumulated buffer; the store mirrors it into the visible message.
//!
//! At most one response streams at a time. The slot is `Option`-shaped so an
//! idle reducer has no dangling session or message fields by construction:
//! either a stream is active and all three fields exist, or none do.

use crate::protocol::{MessageId, SessionId};

/// Bookkeeping for the stream currently being materialized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveStream {
    /// Session receiving the response
    pub session_id: SessionId,
    /// Message entry the content flows into
    pub message_id: MessageId,
    /// Content accumulated from deltas so far
    pub buffer: String,
}

/// A finished stream with its resolved content
///
/// `content` is the server's authoritative final content when one was
/// delivered, otherwise the accumulated buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishedStream {
    /// Session that received the response
    pub session_id: SessionId,
    /// Message the content belongs to
    pub message_id: MessageId,
    /// Resolved final content
    pub content: String,
}

/// Holder for the at-most-one active stream
#[derive(Debug, Default)]
pub struct StreamSlot {
    active: Option<ActiveStream>,
}

impl StreamSlot {
    /// Create an idle slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a stream is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The active stream's bookkeeping.
    #[must_use]
    pub fn active(&self) -> Option<&ActiveStream> {
        self.active.as_ref()
    }

    /// The active stream's target message id.
    #[must_use]
    pub fn message_id(&self) -> Option<&MessageId> {
        self.active.as_ref().map(|a| &a.message_id)
    }

    /// Bind the slot to a new stream with an empty buffer.
    ///
    /// Returns `false` when a stream is already active; the slot is
    /// unchanged in that case.
    pub fn begin(&mut self, session_id: SessionId, message_id: MessageId) -> bool {
        if self.active.is_some() {
            return false;
        }
        self.active = Some(ActiveStream {
            session_id,
            message_id,
            buffer: String::new(),
        });
        true
    }

    /// Re-target the active stream to a new message id, keeping the buffer.
    ///
    /// Used when the server assigns the real id for a client-side
    /// placeholder. Returns the previous id, or `None` when idle.
    pub fn rebind(&mut self, message_id: MessageId) -> Option<MessageId> {
        let active = self.active.as_mut()?;
        Some(std::mem::replace(&mut active.message_id, message_id))
    }

    /// Append a content delta to the buffer. Returns `false` when idle.
    pub fn push(&mut self, delta: &str) -> bool {
        match self.active.as_mut() {
            Some(active) => {
                active.buffer.push_str(delta);
                true
            }
            None => false,
        }
    }

    /// Finish the stream, clearing the slot.
    ///
    /// The resolved content is `final_content` when the server delivered
    /// one, else the accumulated buffer. Returns `None` when idle.
    pub fn finish(&mut self, final_content: Option<String>) -> Option<FinishedStream> {
        let active = self.active.take()?;
        let content = final_content.unwrap_or(active.buffer);
        Some(FinishedStream {
            session_id: active.session_id,
            message_id: active.message_id,
            content,
        })
    }

    /// Clear the slot without finishing, returning what was active.
    pub fn abort(&mut self) -> Option<ActiveStream> {
        self.active.take()
    }
}
