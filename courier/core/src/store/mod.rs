//! Chat Store
//!
//! The headless state machine surfaces render from: the session list, the
//! current session's messages, and the streaming slot, kept consistent across
//! REST calls and live stream frames.
//!
//! # Design Philosophy
//!
//! Single writer, no locks. The owner holds the store exclusively and drives
//! it from one loop: commands are `&mut self` methods, and inbound stream
//! frames are applied only when the owner pumps them ([`ChatStore::pump_events`]
//! or [`ChatStore::next_event`]). Transport handlers never touch store state;
//! they decode frames and enqueue them.
//!
//! Mutations follow optimistic-update rules. User-visible state changes
//! immediately; when the backend rejects the change it is rolled back, or the
//! entry is marked `Failed` where rolling back would destroy user input. A
//! failed operation is always observable twice: as a typed [`StoreError`] to
//! the caller and as a notification for the user.
//!
//! Surfaces stay dumb. They call commands, drain [`StoreUpdate`] hints, and
//! re-read the slices those hints name.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::api::{ApiError, ChatApi};
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::protocol::{
    kind, CitationMarker, MessageId, MessageRole, SessionId, SourceCitation, StreamContent,
    StreamEnd, StreamError, StreamFrame, StreamStart,
};
use crate::session::{ChatMessage, Session};
use crate::transport::{ChatTransport, ConnectionStatus};

mod streaming;

pub use streaming::{ActiveStream, FinishedStream, StreamSlot};

/// Capacity of the queue buffering decoded stream frames until pumped.
const EVENT_QUEUE_CAPACITY: usize = 256;

/// Capacity of the update-hint channel drained by surfaces.
const UPDATE_CAPACITY: usize = 64;

// ============================================
// Updates & errors
// ============================================

/// Hint naming which slice of store state changed
///
/// Hints carry no payload; surfaces re-read the named slice. Delivery is
/// best-effort and a dropped hint is recovered by the next one, so surfaces
/// must treat any hint as "re-read, don't diff".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreUpdate {
    /// The session list changed
    Sessions,
    /// The current-session selection changed
    CurrentSession,
    /// The visible message collection changed
    Messages,
    /// Streaming started, progressed, or ended
    Streaming,
    /// The last-error slot changed
    Error,
}

/// Phase of the send workflow that failed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendPhase {
    /// Creating the session for a first message
    EnsuringSession,
    /// Posting the user message
    PostingUser,
}

impl fmt::Display for SendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::EnsuringSession => "creating the session",
            Self::PostingUser => "posting the message",
        };
        write!(f, "{s}")
    }
}

/// Errors from store commands
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced session is not in the session list
    #[error("unknown session: {0}")]
    SessionNotFound(SessionId),
    /// The referenced message is not in the visible collection
    #[error("unknown message: {0}")]
    MessageNotFound(MessageId),
    /// The regeneration target is not an assistant message
    #[error("cannot regenerate a non-assistant message: {0}")]
    NotAssistant(MessageId),
    /// The regeneration target has no user message before it
    #[error("no user message precedes {0}")]
    NoPrecedingUserMessage(MessageId),
    /// A response is already streaming
    #[error("a response is already streaming")]
    StreamBusy,
    /// A send-workflow phase failed
    #[error("send failed while {phase}: {source}")]
    SendFailed {
        /// Workflow phase that failed
        phase: SendPhase,
        /// Underlying REST failure
        #[source]
        source: ApiError,
    },
    /// A REST call outside the send workflow failed
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Outcome of a successful [`ChatStore::send_message`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendReceipt {
    /// Session the message went to
    pub session_id: SessionId,
    /// Server-confirmed id of the posted user message
    pub user_message_id: MessageId,
    /// Placeholder id the assistant response streams into, temporary until
    /// the stream start frame rebinds it
    pub assistant_message_id: MessageId,
    /// Whether this send created the session
    pub created_session: bool,
}

// ============================================
// Store
// ============================================

/// Session and message state shared by every surface
///
/// Generic over [`ChatApi`] so tests script the backend; production code uses
/// [`crate::api::HttpApi`]. The transport is injected as a trait object for
/// the same reason.
pub struct ChatStore<A: ChatApi> {
    api: Arc<A>,
    transport: Arc<dyn ChatTransport>,
    notifier: Option<Notifier>,
    sessions: Vec<Session>,
    messages: Vec<ChatMessage>,
    current_session: Option<SessionId>,
    stream: StreamSlot,
    last_error: Option<String>,
    events_rx: mpsc::Receiver<StreamFrame>,
    updates_tx: mpsc::Sender<StoreUpdate>,
    updates_rx: Option<mpsc::Receiver<StoreUpdate>>,
}

impl<A: ChatApi> ChatStore<A> {
    /// Create a store bound to a backend API and a transport.
    ///
    /// Subscribes to the streaming frame family immediately; frames queue
    /// until the owner pumps them. The subscription handles are dropped,
    /// which leaves the handlers registered for the transport's lifetime.
    #[must_use]
    pub fn new(api: Arc<A>, transport: Arc<dyn ChatTransport>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CAPACITY);

        for tag in [
            kind::STREAM_START,
            kind::STREAM_CONTENT,
            kind::STREAM_END,
            kind::STREAM_ERROR,
        ] {
            let tx = events_tx.clone();
            drop(transport.on_message(
                tag,
                Box::new(move |envelope| match StreamFrame::decode(envelope) {
                    Ok(Some(frame)) => match tx.try_send(frame) {
                        Ok(()) | Err(TrySendError::Closed(_)) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(
                                kind = %envelope.kind,
                                "event queue full, dropping stream frame"
                            );
                        }
                    },
                    Ok(None) => {}
                    Err(err) => {
                        tracing::warn!(
                            kind = %envelope.kind,
                            error = %err,
                            "undecodable stream frame"
                        );
                    }
                }),
            ));
        }

        Self {
            api,
            transport,
            notifier: None,
            sessions: Vec::new(),
            messages: Vec::new(),
            current_session: None,
            stream: StreamSlot::new(),
            last_error: None,
            events_rx,
            updates_tx,
            updates_rx: Some(updates_rx),
        }
    }

    /// Attach a notifier for user-facing error reporting.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Notifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Take the update-hint receiver. `None` after the first call.
    pub fn take_updates(&mut self) -> Option<mpsc::Receiver<StoreUpdate>> {
        self.updates_rx.take()
    }

    // ============================================
    // Read access
    // ============================================

    /// Sessions, most recently active first.
    #[must_use]
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// Messages of the current session, oldest first.
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// The selected session, when one is selected.
    #[must_use]
    pub fn current_session(&self) -> Option<&SessionId> {
        self.current_session.as_ref()
    }

    /// Whether a response is currently streaming.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.stream.is_active()
    }

    /// Message id the active stream feeds, when one is active.
    #[must_use]
    pub fn streaming_message_id(&self) -> Option<&MessageId> {
        self.stream.message_id()
    }

    /// The most recent operation failure, until cleared.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Clear the last-error slot.
    pub fn clear_error(&mut self) {
        if self.last_error.take().is_some() {
            self.emit(StoreUpdate::Error);
        }
    }

    // ============================================
    // Transport passthrough
    // ============================================

    /// Begin connecting the transport.
    pub fn connect(&self) {
        self.transport.connect();
    }

    /// Disconnect the transport.
    pub async fn disconnect(&self) {
        self.transport.disconnect().await;
    }

    /// Current transport lifecycle state.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.transport.status()
    }

    // ============================================
    // Sessions
    // ============================================

    /// Reload the session list from the backend.
    ///
    /// # Errors
    ///
    /// Returns the REST failure; the in-memory list is left untouched.
    pub async fn fetch_sessions(&mut self) -> Result<(), StoreError> {
        let records = match self.api.list_sessions().await {
            Ok(records) => records,
            Err(err) => {
                self.fail(
                    NotificationKind::Api,
                    "Sessions",
                    format!("Failed to load sessions: {err}"),
                );
                return Err(err.into());
            }
        };
        self.sessions = records.into_iter().map(Session::from).collect();
        self.sessions
            .sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        self.emit(StoreUpdate::Sessions);
        Ok(())
    }

    /// Create a session and select it.
    ///
    /// # Errors
    ///
    /// Returns the REST failure; nothing changes locally in that case.
    pub async fn create_session(
        &mut self,
        title: Option<String>,
    ) -> Result<SessionId, StoreError> {
        let record = match self.api.create_session(title).await {
            Ok(record) => record,
            Err(err) => {
                self.fail(
                    NotificationKind::Api,
                    "Sessions",
                    format!("Failed to create session: {err}"),
                );
                return Err(err.into());
            }
        };
        let session = Session::from(record);
        let id = session.id.clone();
        self.sessions.insert(0, session);
        self.current_session = Some(id.clone());
        self.messages.clear();
        self.emit(StoreUpdate::Sessions);
        self.emit(StoreUpdate::CurrentSession);
        self.emit(StoreUpdate::Messages);
        Ok(id)
    }

    /// Switch to a session from the list and load its messages.
    ///
    /// # Errors
    ///
    /// [`StoreError::SessionNotFound`] when the id is not in the session
    /// list, otherwise any failure from the message fetch.
    pub async fn select_session(&mut self, session_id: &SessionId) -> Result<(), StoreError> {
        if !self.sessions.iter().any(|s| s.id == *session_id) {
            return Err(StoreError::SessionNotFound(session_id.clone()));
        }
        self.fetch_messages(session_id).await
    }

    /// Load the messages of `session_id`, replacing the visible collection,
    /// and make it the current session.
    ///
    /// The collection always mirrors exactly one session; concurrent fetches
    /// resolve last-write-wins.
    ///
    /// # Errors
    ///
    /// Returns the REST failure; the collection and selection are untouched.
    pub async fn fetch_messages(&mut self, session_id: &SessionId) -> Result<(), StoreError> {
        let records = match self.api.list_messages(session_id).await {
            Ok(records) => records,
            Err(err) => {
                self.fail(
                    NotificationKind::Api,
                    "Messages",
                    format!("Failed to load messages: {err}"),
                );
                return Err(err.into());
            }
        };
        self.messages = records.into_iter().map(ChatMessage::from).collect();
        if self.current_session.as_ref() != Some(session_id) {
            self.current_session = Some(session_id.clone());
            self.emit(StoreUpdate::CurrentSession);
        }
        self.emit(StoreUpdate::Messages);
        Ok(())
    }

    /// Delete a session, removing it from the list immediately.
    ///
    /// The removal rolls back if the backend rejects it. Deleting the
    /// current session clears the selection and the visible messages, and
    /// aborts a stream bound to the session.
    ///
    /// # Errors
    ///
    /// [`StoreError::SessionNotFound`] for an unknown id, otherwise the REST
    /// failure after rollback.
    pub async fn delete_session(&mut self, session_id: &SessionId) -> Result<(), StoreError> {
        let position = self
            .sessions
            .iter()
            .position(|s| s.id == *session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;

        let removed = self.sessions.remove(position);
        let was_current = self.current_session.as_ref() == Some(session_id);
        let saved_messages = if was_current {
            self.current_session = None;
            std::mem::take(&mut self.messages)
        } else {
            Vec::new()
        };
        self.emit(StoreUpdate::Sessions);
        if was_current {
            self.emit(StoreUpdate::CurrentSession);
            self.emit(StoreUpdate::Messages);
        }

        if let Err(err) = self.api.delete_session(session_id).await {
            self.sessions.insert(position, removed);
            if was_current {
                self.current_session = Some(session_id.clone());
                self.messages = saved_messages;
                self.emit(StoreUpdate::CurrentSession);
                self.emit(StoreUpdate::Messages);
            }
            self.emit(StoreUpdate::Sessions);
            self.fail(
                NotificationKind::Api,
                "Sessions",
                format!("Failed to delete session: {err}"),
            );
            return Err(err.into());
        }

        if self.stream.active().map(|a| &a.session_id) == Some(session_id) {
            self.stream.abort();
            self.emit(StoreUpdate::Streaming);
        }
        Ok(())
    }

    /// Rename a session, applying the new title immediately.
    ///
    /// The previous title is restored if the backend rejects the rename; on
    /// success the server's record replaces the local entry, since the
    /// server may normalize the title.
    ///
    /// # Errors
    ///
    /// [`StoreError::SessionNotFound`] for an unknown id, otherwise the REST
    /// failure after rollback.
    pub async fn rename_session(
        &mut self,
        session_id: &SessionId,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        let title = title.into();
        let position = self
            .sessions
            .iter()
            .position(|s| s.id == *session_id)
            .ok_or_else(|| StoreError::SessionNotFound(session_id.clone()))?;

        let previous = std::mem::replace(&mut self.sessions[position].title, title.clone());
        self.emit(StoreUpdate::Sessions);

        match self.api.rename_session(session_id, title).await {
            Ok(record) => {
                self.sessions[position] = Session::from(record);
                self.emit(StoreUpdate::Sessions);
                Ok(())
            }
            Err(err) => {
                self.sessions[position].title = previous;
                self.emit(StoreUpdate::Sessions);
                self.fail(
                    NotificationKind::Api,
                    "Sessions",
                    format!("Failed to rename session: {err}"),
                );
                Err(err.into())
            }
        }
    }

    // ============================================
    // Sending
    // ============================================

    /// Send a user message, optionally into an explicit session.
    ///
    /// The workflow runs three phases, each observable through update hints:
    ///
    /// 1. Ensure a session: the explicit `session_id` when given, else the
    ///    current session, else create exactly one new session.
    /// 2. Post the user message optimistically: it appears immediately as
    ///    `Pending`, is reconciled to the server record on success, and turns
    ///    visibly `Failed` on error instead of vanishing.
    /// 3. Open an assistant placeholder and bind the stream slot to it; the
    ///    response then arrives as stream frames.
    ///
    /// # Errors
    ///
    /// [`StoreError::StreamBusy`] when a response is already streaming, and
    /// [`StoreError::SendFailed`] naming the phase when a REST call fails.
    pub async fn send_message(
        &mut self,
        content: impl Into<String>,
        session_id: Option<SessionId>,
    ) -> Result<SendReceipt, StoreError> {
        if self.stream.is_active() {
            return Err(StoreError::StreamBusy);
        }
        let content = content.into();

        // Phase 1: ensure a session.
        let explicit = session_id.or_else(|| self.current_session.clone());
        let (session_id, created_session) = match explicit {
            Some(id) => (id, false),
            None => {
                let record = match self.api.create_session(None).await {
                    Ok(record) => record,
                    Err(err) => {
                        self.send_fail(SendPhase::EnsuringSession, &err);
                        return Err(StoreError::SendFailed {
                            phase: SendPhase::EnsuringSession,
                            source: err,
                        });
                    }
                };
                let session = Session::from(record);
                let id = session.id.clone();
                self.sessions.insert(0, session);
                self.emit(StoreUpdate::Sessions);
                (id, true)
            }
        };
        if self.current_session.as_ref() != Some(&session_id) {
            self.current_session = Some(session_id.clone());
            self.messages.clear();
            self.emit(StoreUpdate::CurrentSession);
            self.emit(StoreUpdate::Messages);
        }

        // Phase 2: post the user message optimistically.
        let (optimistic, correlation) =
            ChatMessage::optimistic_user(session_id.clone(), content.clone());
        self.messages.push(optimistic);
        self.emit(StoreUpdate::Messages);

        let user_message_id = match self.api.post_message(&session_id, content).await {
            Ok(record) => {
                let confirmed = ChatMessage::from(record);
                let id = confirmed.id.clone();
                if let Some(entry) = self
                    .messages
                    .iter_mut()
                    .find(|m| m.correlation() == Some(correlation))
                {
                    *entry = confirmed;
                } else {
                    self.messages.push(confirmed);
                }
                self.emit(StoreUpdate::Messages);
                id
            }
            Err(err) => {
                if let Some(entry) = self
                    .messages
                    .iter_mut()
                    .find(|m| m.correlation() == Some(correlation))
                {
                    entry.fail(err.to_string());
                }
                self.emit(StoreUpdate::Messages);
                self.send_fail(SendPhase::PostingUser, &err);
                return Err(StoreError::SendFailed {
                    phase: SendPhase::PostingUser,
                    source: err,
                });
            }
        };
        self.touch_session(&session_id);

        // Phase 3: open the assistant placeholder and bind the stream.
        let placeholder_id = MessageId::temporary(&Uuid::new_v4());
        if !self
            .stream
            .begin(session_id.clone(), placeholder_id.clone())
        {
            return Err(StoreError::StreamBusy);
        }
        self.messages.push(ChatMessage::streaming_placeholder(
            session_id.clone(),
            placeholder_id.clone(),
        ));
        self.emit(StoreUpdate::Messages);
        self.emit(StoreUpdate::Streaming);

        Ok(SendReceipt {
            session_id,
            user_message_id,
            assistant_message_id: placeholder_id,
            created_session,
        })
    }

    /// Request a fresh response for the assistant message `message_id`.
    ///
    /// Validates locally that the target is a visible assistant message with
    /// a user message before it, asks the backend to regenerate, then swaps
    /// the old entry for a streaming placeholder in place. Nothing changes
    /// locally unless the backend accepts the request.
    ///
    /// # Errors
    ///
    /// [`StoreError::StreamBusy`] while a response is streaming, the
    /// validation errors above, or the REST failure.
    pub async fn regenerate_response(&mut self, message_id: &MessageId) -> Result<(), StoreError> {
        if self.stream.is_active() {
            return Err(StoreError::StreamBusy);
        }
        let position = self
            .messages
            .iter()
            .position(|m| m.id == *message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.clone()))?;
        let target = &self.messages[position];
        if target.role != MessageRole::Assistant {
            return Err(StoreError::NotAssistant(message_id.clone()));
        }
        if !self.messages[..position]
            .iter()
            .any(|m| m.role == MessageRole::User)
        {
            return Err(StoreError::NoPrecedingUserMessage(message_id.clone()));
        }
        let session_id = target.session_id.clone();

        if let Err(err) = self.api.regenerate(&session_id, message_id).await {
            self.fail(
                NotificationKind::Api,
                "Regenerate",
                format!("Failed to regenerate response: {err}"),
            );
            return Err(err.into());
        }

        let placeholder_id = MessageId::temporary(&Uuid::new_v4());
        if !self
            .stream
            .begin(session_id.clone(), placeholder_id.clone())
        {
            return Err(StoreError::StreamBusy);
        }
        self.messages[position] = ChatMessage::streaming_placeholder(session_id, placeholder_id);
        self.emit(StoreUpdate::Messages);
        self.emit(StoreUpdate::Streaming);
        Ok(())
    }

    // ============================================
    // Streaming
    // ============================================

    /// Begin streaming into `message_id` of `session_id`.
    ///
    /// Reuses the message entry when it is already visible, otherwise opens
    /// a placeholder when the session is current. Returns `false` while
    /// another stream is active.
    pub fn start_streaming(&mut self, session_id: SessionId, message_id: MessageId) -> bool {
        if !self.stream.begin(session_id.clone(), message_id.clone()) {
            return false;
        }
        if let Some(entry) = self.messages.iter_mut().find(|m| m.id == message_id) {
            entry.streaming = true;
        } else if self.current_session.as_ref() == Some(&session_id) {
            self.messages
                .push(ChatMessage::streaming_placeholder(session_id, message_id));
        }
        self.emit(StoreUpdate::Messages);
        self.emit(StoreUpdate::Streaming);
        true
    }

    /// Append a content delta to the active stream and its message entry.
    ///
    /// Deltas with no active stream are dropped with a debug log.
    pub fn update_stream_content(&mut self, delta: &str) {
        if !self.stream.push(delta) {
            tracing::debug!("dropping stream content with no active stream");
            return;
        }
        let target = self.stream.message_id().cloned();
        if let Some(id) = target {
            if let Some(entry) = self.messages.iter_mut().find(|m| m.id == id) {
                entry.append(delta);
                self.emit(StoreUpdate::Messages);
            }
        }
        self.emit(StoreUpdate::Streaming);
    }

    /// Finish the active stream, finalizing its message entry.
    ///
    /// `final_content` wins over the accumulated buffer when present;
    /// sources and citations attach to the finalized message.
    pub fn end_streaming(
        &mut self,
        final_content: Option<String>,
        sources: Vec<SourceCitation>,
        citations: Vec<CitationMarker>,
    ) {
        let Some(finished) = self.stream.finish(final_content) else {
            tracing::debug!("ignoring stream end with no active stream");
            return;
        };
        if let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.id == finished.message_id)
        {
            entry.content = finished.content;
            entry.sources = sources;
            entry.citations = citations;
            entry.complete();
            self.emit(StoreUpdate::Messages);
        }
        self.touch_session(&finished.session_id);
        self.emit(StoreUpdate::Streaming);
    }

    /// Cancel the active stream, keeping partial content.
    ///
    /// A partial response is finalized as-is; a placeholder that received
    /// nothing is removed. Returns `false` when no stream is active. The
    /// backend keeps generating; later frames for the cancelled stream are
    /// dropped.
    pub fn cancel_streaming(&mut self) -> bool {
        let Some(active) = self.stream.abort() else {
            return false;
        };
        if active.buffer.is_empty() {
            let before = self.messages.len();
            self.messages.retain(|m| m.id != active.message_id);
            if self.messages.len() != before {
                self.emit(StoreUpdate::Messages);
            }
        } else if let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.id == active.message_id)
        {
            entry.complete();
            self.emit(StoreUpdate::Messages);
        }
        self.emit(StoreUpdate::Streaming);
        true
    }

    // ============================================
    // Stream frame application
    // ============================================

    /// Apply one decoded stream frame to store state.
    pub fn apply_stream_event(&mut self, frame: StreamFrame) {
        match frame {
            StreamFrame::Start(start) => self.on_stream_start(start),
            StreamFrame::Content(content) => self.on_stream_content(content),
            StreamFrame::End(end) => self.on_stream_end(end),
            StreamFrame::Error(error) => self.on_stream_error(error),
        }
    }

    /// Drain and apply all queued stream frames. Returns how many applied.
    pub fn pump_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(frame) = self.events_rx.try_recv() {
            self.apply_stream_event(frame);
            applied += 1;
        }
        applied
    }

    /// Wait for the next stream frame, apply it, and return it.
    ///
    /// Intended as one arm of the owner's select loop. Returns `None` when
    /// the frame senders are gone, which only happens at teardown.
    pub async fn next_event(&mut self) -> Option<StreamFrame> {
        let frame = self.events_rx.recv().await?;
        self.apply_stream_event(frame.clone());
        Some(frame)
    }

    fn on_stream_start(&mut self, start: StreamStart) {
        let rebindable = self
            .stream
            .active()
            .map(|a| a.session_id == start.session_id && a.message_id.is_temporary())
            .unwrap_or(false);
        if rebindable {
            // The server assigned the real id for our placeholder.
            if let Some(previous) = self.stream.rebind(start.message_id.clone()) {
                if let Some(entry) = self.messages.iter_mut().find(|m| m.id == previous) {
                    entry.id = start.message_id;
                    self.emit(StoreUpdate::Messages);
                }
            }
            self.emit(StoreUpdate::Streaming);
            return;
        }
        if self.stream.is_active() {
            tracing::debug!(
                session = %start.session_id,
                message = %start.message_id,
                "ignoring stream start while another stream is active"
            );
            return;
        }
        if self.current_session.as_ref() != Some(&start.session_id) {
            tracing::debug!(
                session = %start.session_id,
                "ignoring stream start for a non-current session"
            );
            return;
        }
        // A response this client did not request, e.g. another device posted
        // to the same session.
        self.start_streaming(start.session_id, start.message_id);
    }

    fn on_stream_content(&mut self, content: StreamContent) {
        if self.stream.message_id() != Some(&content.message_id) {
            tracing::debug!(
                message = %content.message_id,
                "dropping content for an unknown stream"
            );
            return;
        }
        self.update_stream_content(&content.content);
    }

    fn on_stream_end(&mut self, end: StreamEnd) {
        if self.stream.message_id() != Some(&end.message_id) {
            tracing::debug!(
                message = %end.message_id,
                "dropping stream end for an unknown stream"
            );
            return;
        }
        self.end_streaming(end.final_content, end.sources, end.citations);
    }

    fn on_stream_error(&mut self, error: StreamError) {
        // An error frame without a message id kills whatever is streaming.
        let applies = match (&error.message_id, self.stream.message_id()) {
            (Some(id), Some(active)) => id == active,
            (None, Some(_)) => true,
            _ => false,
        };
        if !applies {
            tracing::debug!("dropping stream error with no matching stream");
            return;
        }
        let Some(active) = self.stream.abort() else {
            return;
        };
        if let Some(entry) = self
            .messages
            .iter_mut()
            .find(|m| m.id == active.message_id)
        {
            entry.fail(error.error.clone());
            self.emit(StoreUpdate::Messages);
        }
        self.fail(
            NotificationKind::Stream,
            "Response",
            format!("Response failed: {}", error.error),
        );
        self.emit(StoreUpdate::Streaming);
    }

    // ============================================
    // Internals
    // ============================================

    fn touch_session(&mut self, session_id: &SessionId) {
        let Some(position) = self.sessions.iter().position(|s| s.id == *session_id) else {
            return;
        };
        self.sessions[position].touch();
        // Most recently active stays first.
        if position > 0 {
            let session = self.sessions.remove(position);
            self.sessions.insert(0, session);
        }
        self.emit(StoreUpdate::Sessions);
    }

    fn fail(&mut self, kind: NotificationKind, title: &str, message: String) {
        tracing::warn!(%message, "store operation failed");
        self.last_error = Some(message.clone());
        if let Some(notifier) = &self.notifier {
            notifier.notify(Notification::error(kind, message).with_title(title));
        }
        self.emit(StoreUpdate::Error);
    }

    fn send_fail(&mut self, phase: SendPhase, err: &ApiError) {
        self.fail(
            NotificationKind::Api,
            "Send",
            format!("Send failed while {phase}: {err}"),
        );
    }

    fn emit(&self, update: StoreUpdate) {
        match self.updates_tx.try_send(update) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                tracing::trace!(?update, "update channel full, hint dropped");
            }
        }
    }
}
