//! Device admission domain events.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events related to device admission and session lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdmissionEvent {
    /// A device was admitted and a new session created.
    Admitted {
        /// The device session ID.
        session_id: Uuid,
        /// The owning credential.
        credential_id: Uuid,
        /// Whether the decision was made in degraded (fail-open) mode.
        degraded: bool,
    },
    /// An existing session was reused for a returning device.
    Reused {
        /// The device session ID.
        session_id: Uuid,
        /// The owning credential.
        credential_id: Uuid,
    },
    /// A device was admitted by displacing the least-recently-active one.
    Evicted {
        /// The newly created session.
        session_id: Uuid,
        /// The session that was displaced.
        displaced_session_id: Uuid,
        /// The owning credential.
        credential_id: Uuid,
    },
    /// Admission was rejected.
    Rejected {
        /// The owning credential.
        credential_id: Uuid,
        /// The rejection reason.
        reason: String,
    },
    /// A session was reclaimed by the staleness sweep.
    SweptStale {
        /// The device session ID.
        session_id: Uuid,
        /// The owning credential.
        credential_id: Uuid,
        /// How long the session had been idle in seconds.
        idle_seconds: i64,
    },
    /// A session was terminated because its credential was deactivated.
    CredentialDeactivated {
        /// The owning credential.
        credential_id: Uuid,
        /// How many sessions were force-expired.
        sessions_expired: u64,
    },
}
