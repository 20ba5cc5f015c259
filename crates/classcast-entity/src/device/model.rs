//! Device session entity model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::identity::IdentityKey;

/// Why a device session stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "termination_reason", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The session is still active.
    None,
    /// Displaced by a newer device when the credential was at capacity.
    LimitExceededEvicted,
    /// Reclaimed by the staleness sweep after exceeding the idle TTL.
    StaleExpired,
    /// Explicitly ended by the device or an administrator.
    Manual,
    /// Force-expired because the owning credential was deactivated.
    CredentialDeactivated,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::LimitExceededEvicted => write!(f, "limit_exceeded_evicted"),
            Self::StaleExpired => write!(f, "stale_expired"),
            Self::Manual => write!(f, "manual"),
            Self::CredentialDeactivated => write!(f, "credential_deactivated"),
        }
    }
}

/// One admitted device's occupancy of a credential's capacity.
///
/// Sessions are created on admission and flipped inactive on eviction,
/// staleness, manual revoke, or credential deactivation. They are retained
/// for audit and only physically deleted by the retention purge.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeviceSession {
    /// Unique session identifier.
    pub id: Uuid,
    /// The credential whose capacity this session occupies.
    pub credential_id: Uuid,
    /// Stable identity of the physical device.
    pub identity_key: IdentityKey,
    /// Opaque token presented on heartbeats.
    pub session_token: String,
    /// Whether the session currently counts toward capacity.
    pub active: bool,
    /// Why the session was terminated, if it was.
    pub terminated_reason: TerminationReason,
    /// When the session was created (admission time).
    pub created_at: DateTime<Utc>,
    /// Last heartbeat or reuse instant.
    pub last_activity: DateTime<Utc>,
    /// When the session was terminated.
    pub terminated_at: Option<DateTime<Utc>>,
}

impl DeviceSession {
    /// Check whether the session counts toward capacity at `now` given the
    /// staleness TTL.
    pub fn is_live(&self, now: DateTime<Utc>, staleness_ttl: Duration) -> bool {
        self.active && now - self.last_activity < staleness_ttl
    }

    /// How long the session has been idle, in seconds.
    pub fn idle_seconds(&self) -> i64 {
        (Utc::now() - self.last_activity).num_seconds().max(0)
    }
}

/// Data required to create a new device session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeviceSession {
    /// The owning credential.
    pub credential_id: Uuid,
    /// Stable identity of the device.
    pub identity_key: IdentityKey,
    /// Opaque session token.
    pub session_token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(active: bool, idle: Duration) -> DeviceSession {
        let now = Utc::now();
        DeviceSession {
            id: Uuid::new_v4(),
            credential_id: Uuid::new_v4(),
            identity_key: IdentityKey::new("device-a"),
            session_token: "tok".to_string(),
            active,
            terminated_reason: TerminationReason::None,
            created_at: now - idle,
            last_activity: now - idle,
            terminated_at: None,
        }
    }

    #[test]
    fn test_is_live_respects_ttl() {
        let ttl = Duration::hours(24);
        assert!(session(true, Duration::hours(1)).is_live(Utc::now(), ttl));
        assert!(!session(true, Duration::hours(25)).is_live(Utc::now(), ttl));
        assert!(!session(false, Duration::hours(1)).is_live(Utc::now(), ttl));
    }
}
