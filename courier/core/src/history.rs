//! Recent-Query History
//!
//! A capped list of the prompts the user has sent, newest first, persisted
//! as a JSON array at `~/.config/courier/history.json`. Surfaces use it for
//! up-arrow recall and "recent searches" pickers.
//!
//! Consecutive duplicates coalesce: re-sending the prompt at the head of the
//! list refreshes its timestamp instead of inserting a second copy. The same
//! prompt further down is left alone, so the list still reflects what was
//! actually typed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the persisted history document.
pub const HISTORY_FILENAME: &str = "history.json";

/// History entries kept when no limit is configured.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Errors related to history persistence
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Failed to write the history file
    #[error("failed to write history file: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to read the history file
    #[error("failed to read history file at {path}: {reason}")]
    ReadFailed {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// History file contents are not a valid history document
    #[error("invalid history file format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    /// No user config directory on this system
    #[error("no user config directory available")]
    NoConfigDir,
}

/// One remembered prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// The prompt text exactly as sent
    pub text: String,
    /// When it was (last) sent
    pub at: DateTime<Utc>,
}

/// Default history file path (`~/.config/courier/history.json`)
///
/// # Errors
///
/// Returns [`HistoryError::NoConfigDir`] when the platform exposes no user
/// config directory.
pub fn default_history_path() -> Result<PathBuf, HistoryError> {
    let config_dir = dirs::config_dir().ok_or(HistoryError::NoConfigDir)?;
    Ok(config_dir
        .join(crate::config::CONFIG_DIR_NAME)
        .join(HISTORY_FILENAME))
}

/// Capped recent-query list with save-on-update persistence
#[derive(Debug)]
pub struct PromptHistory {
    /// Newest first
    entries: Vec<HistoryEntry>,
    limit: usize,
    path: Option<PathBuf>,
}

impl PromptHistory {
    /// Create a history that never touches the filesystem.
    ///
    /// A `limit` of zero falls back to [`DEFAULT_HISTORY_LIMIT`].
    #[must_use]
    pub fn in_memory(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: effective_limit(limit),
            path: None,
        }
    }

    /// Create a history persisted at the given path.
    #[must_use]
    pub fn persisted_at(path: PathBuf, limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: effective_limit(limit),
            path: Some(path),
        }
    }

    /// Create a history persisted at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NoConfigDir`] when the platform exposes no
    /// user config directory.
    pub fn persisted(limit: usize) -> Result<Self, HistoryError> {
        Ok(Self::persisted_at(default_history_path()?, limit))
    }

    /// Load persisted entries, if any.
    ///
    /// Returns `Ok(true)` when a history file was found and applied. Files
    /// written under a larger limit are truncated to the current one.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load(&mut self) -> Result<bool, HistoryError> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(HistoryError::ReadFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        let mut entries: Vec<HistoryEntry> = serde_json::from_str(&contents)?;
        entries.truncate(self.limit);
        self.entries = entries;
        tracing::debug!(path = %path.display(), count = self.entries.len(), "Loaded history");
        Ok(true)
    }

    /// Entries, newest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Number of remembered prompts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum entries kept.
    #[must_use]
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Record a sent prompt and persist.
    ///
    /// Blank input is ignored. If `text` matches the newest entry, that
    /// entry's timestamp is refreshed instead of inserting a duplicate.
    /// Oldest entries fall off once the cap is reached.
    ///
    /// # Errors
    ///
    /// Returns an error when the history file cannot be written.
    pub async fn record(&mut self, text: impl Into<String>) -> Result<(), HistoryError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Ok(());
        }

        if let Some(head) = self.entries.first_mut() {
            if head.text == text {
                head.at = Utc::now();
                return self.save().await;
            }
        }

        self.entries.insert(
            0,
            HistoryEntry {
                text,
                at: Utc::now(),
            },
        );
        self.entries.truncate(self.limit);
        self.save().await
    }

    /// Forget everything and persist the empty list.
    ///
    /// # Errors
    ///
    /// Returns an error when the history file cannot be written.
    pub async fn clear(&mut self) -> Result<(), HistoryError> {
        self.entries.clear();
        self.save().await
    }

    /// Write the current entries to disk (no-op for in-memory histories).
    async fn save(&self) -> Result<(), HistoryError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if tokio::fs::metadata(parent).await.is_err() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 {
        DEFAULT_HISTORY_LIMIT
    } else {
        limit
    }
}

// =============================================================================
// Tests
// =============================================================================
