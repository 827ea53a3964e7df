//! TOML Configuration File Support
//!
//! Centralized configuration loading for the client, supporting a TOML
//! configuration file at `~/.config/courier/client.toml`.
//!
//! # Configuration Priority
//!
//! Configuration values are loaded with the following priority (highest first):
//! 1. Explicit overrides from the embedding surface (CLI flags, app settings)
//! 2. Environment variables (`COURIER_*`)
//! 3. TOML configuration file
//! 4. Default values
//!
//! # XDG Base Directory Compliance
//!
//! The configuration file follows the XDG Base Directory specification:
//! `$XDG_CONFIG_HOME/courier/client.toml` (typically
//! `~/.config/courier/client.toml`). Stored tokens, settings, and prompt
//! history live in the same directory.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! rest_url = "https://rag.example.com"
//! ws_url = "wss://rag.example.com/ws"
//! request_timeout_secs = 30
//! connect_timeout_secs = 10
//!
//! [reconnect]
//! enabled = true
//! max_attempts = 5
//! initial_delay_ms = 1000
//! max_delay_ms = 30000
//! backoff_factor = 2.0
//! jitter = 0.25
//!
//! [heartbeat]
//! enabled = true
//! interval_secs = 30
//! timeout_secs = 10
//! max_missed_pongs = 3
//!
//! [history]
//! max_entries = 50
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{HeartbeatConfig, ReconnectConfig, WebSocketConfig};

/// Directory under the XDG config root holding every client file.
pub const CONFIG_DIR_NAME: &str = "courier";

/// File name of the client configuration file.
pub const CONFIG_FILENAME: &str = "client.toml";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where a configuration value came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from an explicit surface override
    Override,
    /// Value from an environment variable
    Env,
    /// Value from the TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// Server section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Base URL of the REST backend
    pub rest_url: Option<String>,

    /// WebSocket endpoint URL
    pub ws_url: Option<String>,

    /// REST request timeout in seconds
    pub request_timeout_secs: Option<u64>,

    /// WebSocket connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
}

/// Reconnect section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectToml {
    /// Whether to reconnect automatically after an unexpected close
    pub enabled: Option<bool>,

    /// Attempts allowed before giving up
    pub max_attempts: Option<u32>,

    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: Option<u64>,

    /// Upper bound on any retry delay in milliseconds
    pub max_delay_ms: Option<u64>,

    /// Multiplier applied per attempt
    pub backoff_factor: Option<f64>,

    /// Jitter as a fraction of the base delay, in `[0.0, 1.0]`
    pub jitter: Option<f64>,
}

/// Heartbeat section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatToml {
    /// Whether heartbeat is enabled
    pub enabled: Option<bool>,

    /// Interval between pings in seconds
    pub interval_secs: Option<u64>,

    /// Maximum time to wait for a pong in seconds
    pub timeout_secs: Option<u64>,

    /// Consecutive missed pongs before the connection is dead
    pub max_missed_pongs: Option<u32>,
}

/// History section of the TOML configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryToml {
    /// Maximum prompt history entries kept
    pub max_entries: Option<usize>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// Server endpoints section
    pub server: ServerToml,

    /// Reconnect tuning section
    pub reconnect: ReconnectToml,

    /// Heartbeat tuning section
    pub heartbeat: HeartbeatToml,

    /// Prompt history section
    pub history: HistoryToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Centralized client configuration
///
/// Consolidates values from every source and remembers the strongest source
/// applied. Use [`load_config`] for proper priority handling.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the REST backend
    pub rest_url: String,

    /// WebSocket endpoint URL
    pub ws_url: String,

    /// REST request timeout
    pub request_timeout: Duration,

    /// WebSocket connect timeout
    pub connect_timeout: Duration,

    /// Reconnect tuning
    pub reconnect: ReconnectConfig,

    /// Heartbeat tuning
    pub heartbeat: HeartbeatConfig,

    /// Maximum prompt history entries kept
    pub history_limit: usize,

    /// Path of the config file that was loaded, when one was
    pub config_file_path: Option<PathBuf>,

    /// Strongest source that contributed values
    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_url: "http://127.0.0.1:8000".to_string(),
            ws_url: "ws://127.0.0.1:8000/ws".to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            history_limit: 50,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The strongest source that contributed values.
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Build the WebSocket transport configuration from these values.
    ///
    /// The auth token is not part of persistent configuration; attach it with
    /// [`WebSocketConfig::with_token`] after login.
    #[must_use]
    pub fn websocket_config(&self) -> WebSocketConfig {
        WebSocketConfig::new(self.ws_url.clone())
            .with_connect_timeout(self.connect_timeout)
            .with_reconnect(self.reconnect.clone())
            .with_heartbeat(self.heartbeat.clone())
    }

    /// Check value coherence.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for URLs with the wrong
    /// scheme or a zero history limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.rest_url.starts_with("http://") && !self.rest_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "rest_url must be http:// or https://: {}",
                self.rest_url
            )));
        }
        if !self.ws_url.starts_with("ws://") && !self.ws_url.starts_with("wss://") {
            return Err(ConfigError::ValidationError(format!(
                "ws_url must be ws:// or wss://: {}",
                self.ws_url
            )));
        }
        if self.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "history.max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/courier/client.toml` or
/// `~/.config/courier/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME))
}

/// Load configuration from all sources with proper priority
///
/// Priority order (highest first):
/// 1. Explicit overrides (not handled here; apply [`ConfigOverrides`] after)
/// 2. Environment variables
/// 3. TOML configuration file
/// 4. Default values
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or the
/// resulting values fail validation. A missing config file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// # Errors
///
/// Returns an error if the specified config file cannot be read or parsed,
/// or the resulting values fail validation.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(ref config_path) = path {
        if config_path.exists() {
            let toml_content =
                std::fs::read_to_string(config_path).map_err(|e| ConfigError::ReadError {
                    path: config_path.clone(),
                    source: e,
                })?;

            let toml_config: ClientToml = toml::from_str(&toml_content)?;
            apply_toml_config(&mut config, &toml_config);
            config.config_file_path = Some(config_path.clone());
            config.source = ConfigSource::File;

            tracing::info!(
                path = %config_path.display(),
                "Loaded configuration from file"
            );
        } else {
            tracing::debug!(
                path = %config_path.display(),
                "Config file not found, using defaults"
            );
        }
    }

    apply_env_config(&mut config);
    config.validate()?;

    Ok(config)
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    // Server settings
    if let Some(ref url) = toml.server.rest_url {
        config.rest_url = url.clone();
    }
    if let Some(ref url) = toml.server.ws_url {
        config.ws_url = url.clone();
    }
    if let Some(secs) = toml.server.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.server.connect_timeout_secs {
        config.connect_timeout = Duration::from_secs(secs);
    }

    // Reconnect settings
    if let Some(enabled) = toml.reconnect.enabled {
        config.reconnect.auto_reconnect = enabled;
    }
    if let Some(attempts) = toml.reconnect.max_attempts {
        config.reconnect.max_attempts = attempts;
    }
    if let Some(ms) = toml.reconnect.initial_delay_ms {
        config.reconnect.initial_delay = Duration::from_millis(ms);
    }
    if let Some(ms) = toml.reconnect.max_delay_ms {
        config.reconnect.max_delay = Duration::from_millis(ms);
    }
    if let Some(factor) = toml.reconnect.backoff_factor {
        config.reconnect.backoff_factor = factor;
    }
    if let Some(jitter) = toml.reconnect.jitter {
        config.reconnect.jitter = jitter;
    }

    // Heartbeat settings
    if let Some(enabled) = toml.heartbeat.enabled {
        config.heartbeat.enabled = enabled;
    }
    if let Some(secs) = toml.heartbeat.interval_secs {
        config.heartbeat.heartbeat_interval = Duration::from_secs(secs);
    }
    if let Some(secs) = toml.heartbeat.timeout_secs {
        config.heartbeat.response_timeout = Duration::from_secs(secs);
    }
    if let Some(max_missed) = toml.heartbeat.max_missed_pongs {
        config.heartbeat.max_missed_pongs = max_missed;
    }

    // History settings
    if let Some(limit) = toml.history.max_entries {
        config.history_limit = limit;
    }
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig) {
    if let Ok(url) = std::env::var("COURIER_SERVER_URL") {
        config.rest_url = url;
        config.source = ConfigSource::Env;
    }
    if let Ok(url) = std::env::var("COURIER_WS_URL") {
        config.ws_url = url;
        config.source = ConfigSource::Env;
    }
    if let Ok(timeout) = std::env::var("COURIER_REQUEST_TIMEOUT") {
        if let Ok(secs) = timeout.parse::<u64>() {
            config.request_timeout = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(enabled) = std::env::var("COURIER_AUTO_RECONNECT") {
        let enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.reconnect.auto_reconnect = enabled;
        config.source = ConfigSource::Env;
    }
    if let Ok(attempts) = std::env::var("COURIER_RECONNECT_ATTEMPTS") {
        if let Ok(n) = attempts.parse::<u32>() {
            config.reconnect.max_attempts = n;
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(enabled) = std::env::var("COURIER_HEARTBEAT") {
        let enabled = enabled != "0" && enabled.to_lowercase() != "false";
        config.heartbeat.enabled = enabled;
        config.source = ConfigSource::Env;
    }
    if let Ok(interval) = std::env::var("COURIER_HEARTBEAT_INTERVAL") {
        if let Ok(secs) = interval.parse::<u64>() {
            config.heartbeat.heartbeat_interval = Duration::from_secs(secs);
            config.source = ConfigSource::Env;
        }
    }
    if let Ok(limit) = std::env::var("COURIER_HISTORY_LIMIT") {
        if let Ok(n) = limit.parse::<usize>() {
            config.history_limit = n;
            config.source = ConfigSource::Env;
        }
    }
}

// =============================================================================
// Surface Override Support
// =============================================================================

/// Builder for applying explicit surface overrides to configuration
///
/// Use this after [`load_config`] to apply CLI flags or in-app settings.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// REST base URL override
    pub rest_url: Option<String>,

    /// WebSocket URL override
    pub ws_url: Option<String>,

    /// Request timeout override (seconds)
    pub request_timeout_secs: Option<u64>,

    /// Auto-reconnect override
    pub auto_reconnect: Option<bool>,

    /// History limit override
    pub history_limit: Option<usize>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the REST base URL override.
    #[must_use]
    pub fn with_rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    /// Set the WebSocket URL override.
    #[must_use]
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Set the request timeout override.
    #[must_use]
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = Some(secs);
        self
    }

    /// Set the auto-reconnect override.
    #[must_use]
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = Some(enabled);
        self
    }

    /// Set the history limit override.
    #[must_use]
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }

    /// Apply the overrides to a configuration.
    pub fn apply(&self, config: &mut ClientConfig) {
        if self.rest_url.is_some()
            || self.ws_url.is_some()
            || self.request_timeout_secs.is_some()
            || self.auto_reconnect.is_some()
            || self.history_limit.is_some()
        {
            config.source = ConfigSource::Override;
        }

        if let Some(ref url) = self.rest_url {
            config.rest_url = url.clone();
        }
        if let Some(ref url) = self.ws_url {
            config.ws_url = url.clone();
        }
        if let Some(secs) = self.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(enabled) = self.auto_reconnect {
            config.reconnect.auto_reconnect = enabled;
        }
        if let Some(limit) = self.history_limit {
            config.history_limit = limit;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
