//! Notifications
//!
//! The centralized notification surface. Transport, API client, and store all
//! report user-facing conditions here instead of rendering anything
//! themselves; surfaces drain the channel and decide how to present each
//! notification (toast, status line, spoken announcement).
//!
//! # Design Philosophy
//!
//! Errors in this crate follow one rule: typed errors for callers,
//! notifications for users. A failed REST call returns an error to the
//! calling code *and* emits a notification so the user sees it even when the
//! caller ignores the return value. Notifications are best-effort; if no
//! surface is draining the channel they are dropped with a log line rather
//! than blocking core work.
//!
//! Each notification carries a screen-reader announcement and an urgency
//! mapping to ARIA live-region politeness, so assistive surfaces can present
//! them without interpreting visual styling.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Severity of a notification
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotifyLevel {
    /// Informational message
    Info,
    /// Operation succeeded
    Success,
    /// Something degraded but recoverable
    Warning,
    /// Operation failed
    Error,
}

/// Which subsystem raised a notification
///
/// Surfaces route on this: an [`NotificationKind::Auth`] error means the
/// user's session expired and a login surface should take over.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// WebSocket connection lifecycle
    Transport,
    /// REST request outcome
    Api,
    /// Streaming response lifecycle
    Stream,
    /// Authentication state change
    Auth,
}

/// Urgency levels for accessibility announcements
///
/// Maps to ARIA live region politeness levels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Urgency {
    /// Immediate announcement, interrupts current speech
    Immediate,
    /// Normal announcement, queued after current speech
    Normal,
    /// Low priority, announced when convenient
    Low,
}

impl Urgency {
    /// ARIA live region value
    #[must_use]
    pub fn aria_live(&self) -> &'static str {
        match self {
            Urgency::Immediate => "assertive",
            Urgency::Normal | Urgency::Low => "polite",
        }
    }
}

/// A user-facing notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Severity
    pub level: NotifyLevel,
    /// Raising subsystem
    pub kind: NotificationKind,
    /// Title (optional)
    pub title: Option<String>,
    /// Message content
    pub message: String,
}

impl Notification {
    /// Build an info-level notification.
    #[must_use]
    pub fn info(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Info,
            kind,
            title: None,
            message: message.into(),
        }
    }

    /// Build a success-level notification.
    #[must_use]
    pub fn success(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Success,
            kind,
            title: None,
            message: message.into(),
        }
    }

    /// Build a warning-level notification.
    #[must_use]
    pub fn warning(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Warning,
            kind,
            title: None,
            message: message.into(),
        }
    }

    /// Build an error-level notification.
    #[must_use]
    pub fn error(kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            level: NotifyLevel::Error,
            kind,
            title: None,
            message: message.into(),
        }
    }

    /// Attach a title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Text announcement suitable for screen readers.
    #[must_use]
    pub fn screen_reader_announcement(&self) -> String {
        let prefix = match self.level {
            NotifyLevel::Error => "Error",
            NotifyLevel::Warning => "Warning",
            NotifyLevel::Success => "Success",
            NotifyLevel::Info => "Notice",
        };
        match &self.title {
            Some(title) => format!("{prefix}: {title} - {}", self.message),
            None => format!("{prefix}: {}", self.message),
        }
    }

    /// Urgency for interrupt behavior.
    #[must_use]
    pub fn urgency(&self) -> Urgency {
        match self.level {
            NotifyLevel::Error => Urgency::Immediate,
            NotifyLevel::Warning | NotifyLevel::Success => Urgency::Normal,
            NotifyLevel::Info => Urgency::Low,
        }
    }

    /// ARIA role for rendering this notification.
    #[must_use]
    pub fn aria_role(&self) -> &'static str {
        match self.level {
            NotifyLevel::Error | NotifyLevel::Warning => "alert",
            NotifyLevel::Info | NotifyLevel::Success => "status",
        }
    }
}

/// Cloneable handle for emitting notifications
///
/// Shared by the transport, the API client, and the store. Emission never
/// blocks: a full or closed channel drops the notification with a warning.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: mpsc::Sender<Notification>,
}

impl Notifier {
    /// Default channel capacity for notification delivery.
    pub const DEFAULT_CAPACITY: usize = 100;

    /// Create a notifier and the receiver a surface drains.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit a notification.
    pub fn notify(&self, notification: Notification) {
        if let Err(err) = self.tx.try_send(notification) {
            tracing::warn!(error = %err, "dropping notification, channel unavailable");
        }
    }
}
