//! Live session participant records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::role::ParticipantRole;

/// One occupant of a live session.
///
/// Participant records are append-only: the only mutation is stamping the
/// leave instant. A record with `left_at` unset counts toward the session's
/// participant count, and at most one open record exists per
/// (session, participant key).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Participant {
    /// Unique record identifier.
    pub id: Uuid,
    /// The live session this record belongs to.
    pub live_session_id: Uuid,
    /// Presenter id or device identity key.
    pub participant_key: String,
    /// Role held in this session.
    pub role: ParticipantRole,
    /// Name shown in the roster.
    pub display_name: String,
    /// When the participant joined.
    pub joined_at: DateTime<Utc>,
    /// When the participant left; unset while present.
    pub left_at: Option<DateTime<Utc>>,
}

impl Participant {
    /// Whether the participant is currently present.
    pub fn is_present(&self) -> bool {
        self.left_at.is_none()
    }
}
