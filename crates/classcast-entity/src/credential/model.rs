//! Credential entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A shared classroom login identity scoping a device-count capacity.
///
/// Credentials are created by a manager and soft-deleted rather than
/// destroyed; deactivation force-expires every device session under them.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Credential {
    /// Unique credential identifier.
    pub id: Uuid,
    /// Human-readable name (e.g. the classroom).
    pub name: String,
    /// Maximum concurrent active devices.
    pub capacity: i32,
    /// Whether the credential is usable. False means soft-deleted.
    pub active: bool,
    /// Optional hard expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
    /// Last time a device was admitted under this credential.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Cached count of active, non-stale device sessions. Refreshed by the
    /// admission controller and the reconcile job; never authoritative for
    /// admission decisions.
    pub active_device_count: i32,
    /// When the credential was created.
    pub created_at: DateTime<Utc>,
    /// When the credential was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Check whether the credential has passed its expiry instant.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }

    /// Check whether devices may currently be admitted under this
    /// credential.
    pub fn is_usable(&self) -> bool {
        self.active && !self.is_expired()
    }
}

/// Data required to create a new credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCredential {
    /// Human-readable name.
    pub name: String,
    /// Maximum concurrent active devices (1..=50, validated upstream).
    pub capacity: i32,
    /// Optional hard expiry instant.
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(active: bool, expires_at: Option<DateTime<Utc>>) -> Credential {
        Credential {
            id: Uuid::new_v4(),
            name: "room-101".to_string(),
            capacity: 5,
            active,
            expires_at,
            last_used_at: None,
            active_device_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_usable_states() {
        assert!(credential(true, None).is_usable());
        assert!(credential(true, Some(Utc::now() + Duration::hours(1))).is_usable());
        assert!(!credential(false, None).is_usable());
        assert!(!credential(true, Some(Utc::now() - Duration::hours(1))).is_usable());
    }
}
