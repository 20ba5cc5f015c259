//! Live-session domain events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events related to live broadcast sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    /// A live session was started.
    Started {
        /// The meeting ID.
        meeting_id: Uuid,
        /// The owning credential.
        credential_id: Uuid,
        /// The presenter.
        presenter_id: Uuid,
    },
    /// A participant joined.
    ParticipantJoined {
        /// The meeting ID.
        meeting_id: Uuid,
        /// The participant's identity key.
        participant_key: String,
        /// Participant count after the join.
        participant_count: u32,
    },
    /// A participant left (or was removed).
    ParticipantLeft {
        /// The meeting ID.
        meeting_id: Uuid,
        /// The participant's identity key.
        participant_key: String,
        /// Participant count after the leave.
        participant_count: u32,
    },
    /// The session reached its participant ceiling.
    BecameFull {
        /// The meeting ID.
        meeting_id: Uuid,
        /// The ceiling that was reached.
        max_participants: u32,
    },
    /// The session ended.
    Ended {
        /// The meeting ID.
        meeting_id: Uuid,
        /// Total duration in seconds.
        duration_seconds: i64,
    },
    /// The session was cancelled before ending normally.
    Cancelled {
        /// The meeting ID.
        meeting_id: Uuid,
    },
}
