//! Auth Token Persistence
//!
//! Holds the access/refresh token pair for the authenticated account and
//! persists it across restarts, so surfaces stay logged in without
//! re-prompting.
//!
//! # Security Model
//!
//! - Tokens are stored as JSON at `~/.config/courier/tokens.json`
//! - The token file has 0o600 permissions (owner read/write only)
//! - The parent directory is created with 0o700 permissions
//! - Debug output never contains token material
//!
//! The in-memory cell is the source of truth while running; the file is
//! written on every change and removed on logout.

use std::fmt;
use std::path::PathBuf;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::session::now_ms;

/// Token file name within the config directory
pub const TOKEN_FILENAME: &str = "tokens.json";

/// Errors related to token persistence
#[derive(Debug, Error)]
pub enum TokenError {
    /// Failed to write or remove the token file
    #[error("failed to write token file: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to read the token file
    #[error("failed to read token file at {path}: {reason}")]
    ReadFailed {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Token file contents are not a valid token pair
    #[error("invalid token file format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    /// No user config directory on this system
    #[error("no user config directory available")]
    NoConfigDir,
}

/// Access/refresh token pair issued by the backend
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// Bearer token attached to authorized requests
    pub access_token: String,
    /// Token exchanged for a fresh pair when the access token expires
    pub refresh_token: String,
    /// When this pair was obtained (Unix timestamp ms)
    #[serde(default)]
    pub obtained_at: u64,
}

impl TokenPair {
    /// Create a pair obtained now.
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            obtained_at: now_ms(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Token material stays out of logs
        write!(f, "TokenPair([REDACTED])")
    }
}

/// Default token file path (`~/.config/courier/tokens.json`)
///
/// # Errors
///
/// Returns [`TokenError::NoConfigDir`] when the platform exposes no user
/// config directory.
pub fn default_token_path() -> Result<PathBuf, TokenError> {
    let config_dir = dirs::config_dir().ok_or(TokenError::NoConfigDir)?;
    Ok(config_dir
        .join(crate::config::CONFIG_DIR_NAME)
        .join(TOKEN_FILENAME))
}

/// Shared authentication state
///
/// Cloned by reference (`Arc`) into the API client; the HTTP layer reads the
/// bearer on every request and swaps the pair after a refresh.
pub struct AuthState {
    tokens: RwLock<Option<TokenPair>>,
    path: Option<PathBuf>,
}

impl AuthState {
    /// Auth state that never touches disk. For tests and embedders that
    /// manage credentials themselves.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tokens: RwLock::new(None),
            path: None,
        }
    }

    /// Auth state persisted at an explicit path.
    #[must_use]
    pub fn persisted_at(path: PathBuf) -> Self {
        Self {
            tokens: RwLock::new(None),
            path: Some(path),
        }
    }

    /// Auth state persisted at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::NoConfigDir`] when no config directory exists.
    pub fn persisted() -> Result<Self, TokenError> {
        Ok(Self::persisted_at(default_token_path()?))
    }

    /// Load the persisted pair into memory.
    ///
    /// Returns `Ok(false)` when there is nothing to load (no path configured
    /// or no file yet), `Ok(true)` when a pair was loaded.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load(&self) -> Result<bool, TokenError> {
        let Some(path) = &self.path else {
            return Ok(false);
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(err) => {
                return Err(TokenError::ReadFailed {
                    path: path.clone(),
                    reason: err.to_string(),
                })
            }
        };

        let pair: TokenPair = serde_json::from_str(&contents)?;
        *self.tokens.write() = Some(pair);
        tracing::debug!(path = %path.display(), "auth tokens loaded");
        Ok(true)
    }

    /// Current access token, if authenticated.
    #[must_use]
    pub fn bearer(&self) -> Option<String> {
        self.tokens.read().as_ref().map(|t| t.access_token.clone())
    }

    /// Current refresh token, if authenticated.
    #[must_use]
    pub fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    /// Snapshot of the current pair.
    #[must_use]
    pub fn tokens(&self) -> Option<TokenPair> {
        self.tokens.read().clone()
    }

    /// Whether a token pair is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.tokens.read().is_some()
    }

    /// Install a new pair and persist it.
    ///
    /// The in-memory cell is updated even when persisting fails, so the
    /// running process stays authenticated.
    ///
    /// # Errors
    ///
    /// Returns an error when the token file cannot be written.
    pub async fn store(&self, pair: TokenPair) -> Result<(), TokenError> {
        *self.tokens.write() = Some(pair.clone());

        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if tokio::fs::metadata(parent).await.is_err() {
                tokio::fs::create_dir_all(parent).await?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let perms = std::fs::Permissions::from_mode(0o700);
                    tokio::fs::set_permissions(parent, perms).await?;
                }
            }
        }

        let json = serde_json::to_string_pretty(&pair)?;

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(path).await?;

        // Tighten permissions on files created by earlier versions too
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))
                .await?;
        }

        file.write_all(json.as_bytes()).await?;
        file.write_all(b"\n").await?;
        file.sync_all().await?;

        tracing::debug!(path = %path.display(), "auth tokens written");
        Ok(())
    }

    /// Drop the pair and remove the token file. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be removed.
    pub async fn clear(&self) -> Result<(), TokenError> {
        self.tokens.write().take();

        let Some(path) = &self.path else {
            return Ok(());
        };

        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "auth tokens removed");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(TokenError::WriteFailed(err)),
        }
    }
}

impl fmt::Debug for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthState")
            .field("authenticated", &self.is_authenticated())
            .field("path", &self.path)
            .finish()
    }
}
