//! Live session entity model and status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Status of a live broadcast session.
///
/// The forward path is `Scheduled → Starting → Live → Full → Ended`;
/// `Cancelled` and `Ended` are terminal and reachable from any non-terminal
/// state. `Full → Live` is the only backward transition, taken when a
/// participant leaves a full session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "live_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    /// Created but not yet joined.
    Scheduled,
    /// First join in flight; transient.
    Starting,
    /// Broadcasting with room for more participants.
    Live,
    /// Broadcasting at the participant ceiling.
    Full,
    /// Ended normally by the presenter.
    Ended,
    /// Cancelled before ending normally.
    Cancelled,
}

impl LiveStatus {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ended | Self::Cancelled)
    }

    /// Whether a direct transition to `next` is legal.
    pub fn can_transition_to(self, next: LiveStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            // Cancel and end are reachable from any non-terminal state.
            (_, Self::Cancelled) | (_, Self::Ended) => true,
            (Self::Scheduled, Self::Starting) => true,
            (Self::Starting, Self::Live) => true,
            (Self::Live, Self::Full) => true,
            (Self::Full, Self::Live) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for LiveStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Starting => write!(f, "starting"),
            Self::Live => write!(f, "live"),
            Self::Full => write!(f, "full"),
            Self::Ended => write!(f, "ended"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Media and chat toggles for a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveSettings {
    /// Whether attendee audio is enabled.
    pub audio_enabled: bool,
    /// Whether attendee video is enabled.
    pub video_enabled: bool,
    /// Whether the session is recorded.
    pub recording_enabled: bool,
    /// Whether chat is enabled.
    pub chat_enabled: bool,
}

/// One broadcast occasion tied to exactly one credential and presenter.
///
/// Retained after termination for history and recording metadata.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LiveSession {
    /// The meeting identifier.
    pub id: Uuid,
    /// The owning credential.
    pub credential_id: Uuid,
    /// The presenter identity.
    pub presenter_id: Uuid,
    /// Session title shown to participants.
    pub title: String,
    /// Current status.
    pub status: LiveStatus,
    /// When the session is scheduled to begin.
    pub scheduled_start: DateTime<Utc>,
    /// When the session actually started (first join).
    pub started_at: Option<DateTime<Utc>>,
    /// When the session ended or was cancelled.
    pub ended_at: Option<DateTime<Utc>>,
    /// Total duration in seconds, computed at end time.
    pub duration_seconds: Option<i64>,
    /// Participant ceiling (credential capacity × headroom).
    pub max_participants: i32,
    /// Participants currently present (open roster records).
    pub participant_count: i32,
    /// Media and chat toggles.
    #[sqlx(json)]
    pub settings: LiveSettings,
    /// When the session record was created.
    pub created_at: DateTime<Utc>,
}

impl LiveSession {
    /// Whether the session is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether the roster is at its ceiling.
    pub fn is_at_capacity(&self) -> bool {
        self.participant_count >= self.max_participants
    }

    /// The instant duration is measured from: the actual start, or the
    /// scheduled start if the session was never explicitly started.
    pub fn effective_start(&self) -> DateTime<Utc> {
        self.started_at.unwrap_or(self.scheduled_start)
    }
}
