//! Live-session configuration.

use serde::{Deserialize, Serialize};

/// Live broadcast session configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// Multiplier applied to a credential's device capacity to compute the
    /// maximum participant count for a live session. Headroom above the
    /// device cap tolerates reconnect overlap, where a device briefly holds
    /// two participant records while rejoining.
    #[serde(default = "default_headroom_multiplier")]
    pub headroom_multiplier: u32,
    /// Default toggles applied to newly started live sessions.
    #[serde(default)]
    pub default_settings: DefaultSettings,
}

/// Default media/chat toggles for new live sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultSettings {
    /// Whether attendee audio is enabled by default.
    #[serde(default = "default_true")]
    pub audio_enabled: bool,
    /// Whether attendee video is enabled by default.
    #[serde(default = "default_true")]
    pub video_enabled: bool,
    /// Whether the session is recorded by default.
    #[serde(default)]
    pub recording_enabled: bool,
    /// Whether chat is enabled by default.
    #[serde(default = "default_true")]
    pub chat_enabled: bool,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            headroom_multiplier: default_headroom_multiplier(),
            default_settings: DefaultSettings::default(),
        }
    }
}

impl Default for DefaultSettings {
    fn default() -> Self {
        Self {
            audio_enabled: true,
            video_enabled: true,
            recording_enabled: false,
            chat_enabled: true,
        }
    }
}

fn default_headroom_multiplier() -> u32 {
    2
}

fn default_true() -> bool {
    true
}
