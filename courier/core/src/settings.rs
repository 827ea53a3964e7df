//! Accessibility & Theme Settings
//!
//! User-facing presentation preferences: theme selection and the
//! accessibility switches (font scale, contrast, motion, screen reader).
//! The core stores the choices and the derived values; how a surface turns
//! `scale_factor()` into pixels or a palette is its own business.
//!
//! # Design Philosophy
//!
//! - **Derived state only**: every mapping here (font step to scale factor,
//!   theme to dark/light) is a pure function of the stored settings.
//! - **Save on every update**: each setter persists immediately, so a crash
//!   never loses a preference the user already made.
//! - **Fixed keys**: the JSON file uses flat stable field names, so files
//!   written by older builds keep loading (unknown fields are ignored,
//!   missing fields take defaults).
//!
//! Settings live at `~/.config/courier/settings.json` next to the token
//! file and prompt history.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the persisted settings document.
pub const SETTINGS_FILENAME: &str = "settings.json";

/// Errors related to settings persistence
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to write the settings file
    #[error("failed to write settings file: {0}")]
    WriteFailed(#[from] std::io::Error),

    /// Failed to read the settings file
    #[error("failed to read settings file at {path}: {reason}")]
    ReadFailed {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// Settings file contents are not a valid settings document
    #[error("invalid settings file format: {0}")]
    InvalidFormat(#[from] serde_json::Error),

    /// No user config directory on this system
    #[error("no user config directory available")]
    NoConfigDir,
}

// =============================================================================
// Setting Types
// =============================================================================

/// Theme selection
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// Follow the platform preference
    #[default]
    System,
    /// Always light
    Light,
    /// Always dark
    Dark,
}

impl Theme {
    /// Resolve to a concrete dark/light decision.
    ///
    /// `system_prefers_dark` is the platform hint the surface observed; it
    /// only matters for [`Theme::System`].
    #[must_use]
    pub fn dark(&self, system_prefers_dark: bool) -> bool {
        match self {
            Self::System => system_prefers_dark,
            Self::Light => false,
            Self::Dark => true,
        }
    }
}

/// Font size step
///
/// Surfaces multiply their base size by [`FontScale::factor`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontScale {
    /// 87.5% of the base size
    Small,
    /// The base size
    #[default]
    Medium,
    /// 112.5% of the base size
    Large,
    /// 125% of the base size
    ExtraLarge,
}

impl FontScale {
    /// Multiplier for the surface's base font size.
    #[must_use]
    pub fn factor(&self) -> f32 {
        match self {
            Self::Small => 0.875,
            Self::Medium => 1.0,
            Self::Large => 1.125,
            Self::ExtraLarge => 1.25,
        }
    }

    /// The next larger step, saturating at [`FontScale::ExtraLarge`].
    #[must_use]
    pub fn step_up(&self) -> Self {
        match self {
            Self::Small => Self::Medium,
            Self::Medium => Self::Large,
            Self::Large | Self::ExtraLarge => Self::ExtraLarge,
        }
    }

    /// The next smaller step, saturating at [`FontScale::Small`].
    #[must_use]
    pub fn step_down(&self) -> Self {
        match self {
            Self::Small | Self::Medium => Self::Small,
            Self::Large => Self::Medium,
            Self::ExtraLarge => Self::Large,
        }
    }
}

/// Accessibility switches
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessibilitySettings {
    /// Font size step
    pub font_scale: FontScale,
    /// High-contrast palette
    pub high_contrast: bool,
    /// Suppress animations and transitions
    pub reduce_motion: bool,
    /// Screen-reader mode (surfaces emit announcements, see `notify`)
    pub screen_reader: bool,
}

/// The persisted settings document
///
/// Serialized flat: `theme` plus the accessibility fields side by side, so
/// the file keeps the same stable keys the settings have always used.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Theme selection
    pub theme: Theme,
    /// Accessibility switches
    #[serde(flatten)]
    pub accessibility: AccessibilitySettings,
}

// =============================================================================
// Persistence
// =============================================================================

/// Default settings file path (`~/.config/courier/settings.json`)
///
/// # Errors
///
/// Returns [`SettingsError::NoConfigDir`] when the platform exposes no user
/// config directory.
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    let config_dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
    Ok(config_dir
        .join(crate::config::CONFIG_DIR_NAME)
        .join(SETTINGS_FILENAME))
}

/// Settings with save-on-update persistence
///
/// Owned by the surface loop like the chat store; all mutation goes through
/// `&mut self` setters, each of which writes the file before returning.
#[derive(Debug)]
pub struct SettingsStore {
    settings: Settings,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// Create a store that never touches the filesystem.
    ///
    /// Used in tests and by surfaces that manage persistence themselves.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            settings: Settings::default(),
            path: None,
        }
    }

    /// Create a store persisted at the given path.
    #[must_use]
    pub fn persisted_at(path: PathBuf) -> Self {
        Self {
            settings: Settings::default(),
            path: Some(path),
        }
    }

    /// Create a store persisted at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`SettingsError::NoConfigDir`] when the platform exposes no
    /// user config directory.
    pub fn persisted() -> Result<Self, SettingsError> {
        Ok(Self::persisted_at(default_settings_path()?))
    }

    /// Load persisted settings, if any.
    ///
    /// Returns `Ok(true)` when a settings file was found and applied,
    /// `Ok(false)` when there was none (defaults stay in place).
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub async fn load(&mut self) -> Result<bool, SettingsError> {
        let Some(ref path) = self.path else {
            return Ok(false);
        };

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(SettingsError::ReadFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            }
        };

        self.settings = serde_json::from_str(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(true)
    }

    /// Current settings snapshot.
    #[must_use]
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Current theme selection.
    #[must_use]
    pub fn theme(&self) -> Theme {
        self.settings.theme
    }

    /// Current accessibility switches.
    #[must_use]
    pub fn accessibility(&self) -> AccessibilitySettings {
        self.settings.accessibility
    }

    /// Select a theme and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be written.
    pub async fn set_theme(&mut self, theme: Theme) -> Result<(), SettingsError> {
        self.settings.theme = theme;
        self.save().await
    }

    /// Set the font step and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be written.
    pub async fn set_font_scale(&mut self, scale: FontScale) -> Result<(), SettingsError> {
        self.settings.accessibility.font_scale = scale;
        self.save().await
    }

    /// Toggle the high-contrast palette and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be written.
    pub async fn set_high_contrast(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.settings.accessibility.high_contrast = enabled;
        self.save().await
    }

    /// Toggle motion reduction and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be written.
    pub async fn set_reduce_motion(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.settings.accessibility.reduce_motion = enabled;
        self.save().await
    }

    /// Toggle screen-reader mode and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the settings file cannot be written.
    pub async fn set_screen_reader(&mut self, enabled: bool) -> Result<(), SettingsError> {
        self.settings.accessibility.screen_reader = enabled;
        self.save().await
    }

    /// Write the current settings to disk (no-op for in-memory stores).
    async fn save(&self) -> Result<(), SettingsError> {
        let Some(ref path) = self.path else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            if tokio::fs::metadata(parent).await.is_err() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(&self.settings)?;
        tokio::fs::write(path, json).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
