//! Presenter control actions against participants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A control action a presenter may issue against a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "control_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlAction {
    /// Mute the target's audio.
    Mute,
    /// Unmute the target's audio.
    Unmute,
    /// Enable the target's video.
    VideoOn,
    /// Disable the target's video.
    VideoOff,
    /// Remove the target from the session.
    Remove,
}

impl std::fmt::Display for ControlAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mute => write!(f, "mute"),
            Self::Unmute => write!(f, "unmute"),
            Self::VideoOn => write!(f, "video_on"),
            Self::VideoOff => write!(f, "video_off"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// One immutable control-action record in a session's ordered log.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ControlRecord {
    /// Unique record identifier.
    pub id: Uuid,
    /// The live session this record belongs to.
    pub live_session_id: Uuid,
    /// The presenter who issued the action.
    pub issued_by: Uuid,
    /// The participant key the action targets.
    pub target: String,
    /// The action taken.
    pub action: ControlAction,
    /// When the action was issued.
    pub issued_at: DateTime<Utc>,
}
