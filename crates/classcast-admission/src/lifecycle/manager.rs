//! Heartbeats, voluntary session teardown, and credential administration.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use classcast_core::config::admission::AdmissionConfig;
use classcast_core::error::AppError;
use classcast_core::events::AdmissionEvent;
use classcast_core::result::AppResult;
use classcast_entity::credential::{CreateCredential, Credential};
use classcast_entity::device::{DeviceSession, TerminationReason};

use crate::registry::SessionRegistry;

/// Session and credential lifecycle operations.
///
/// Unlike admission, nothing here fails open: a registry outage surfaces as
/// `StoreUnavailable` to the caller.
pub struct LifecycleManager {
    registry: Arc<dyn SessionRegistry>,
    config: AdmissionConfig,
}

impl LifecycleManager {
    /// Creates a new lifecycle manager.
    pub fn new(registry: Arc<dyn SessionRegistry>, config: AdmissionConfig) -> Self {
        Self { registry, config }
    }

    fn stale_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::hours(self.config.staleness_ttl_hours as i64)
    }

    /// Records liveness for a session.
    ///
    /// Heartbeats against terminated sessions are rejected, and a heartbeat
    /// arriving after the staleness window has already elapsed terminates
    /// the session instead of reviving it. The staleness clock decides, not
    /// whether the sweep got there first.
    pub async fn heartbeat(&self, session_token: &str) -> AppResult<DeviceSession> {
        let Some(session) = self.registry.find_by_token(session_token).await? else {
            return Err(AppError::not_found("No session for this token"));
        };

        if !session.active {
            return Err(AppError::inactive(format!(
                "Session was terminated: {}",
                session.terminated_reason
            )));
        }

        let ttl = Duration::hours(self.config.staleness_ttl_hours as i64);
        if !session.is_live(Utc::now(), ttl) {
            self.registry
                .terminate(session.id, TerminationReason::StaleExpired)
                .await?;
            debug!(
                session_id = %session.id,
                idle_seconds = session.idle_seconds(),
                "Heartbeat arrived after staleness window; session expired"
            );
            return Err(AppError::expired("Session idle past the staleness window"));
        }

        self.registry
            .touch_by_token(session_token)
            .await?
            .ok_or_else(|| AppError::inactive("Session terminated concurrently"))
    }

    /// Ends a session voluntarily. Idempotent: ending an already-terminated
    /// session succeeds without effect.
    pub async fn end_session(&self, session_token: &str) -> AppResult<()> {
        let Some(session) = self.registry.find_by_token(session_token).await? else {
            return Err(AppError::not_found("No session for this token"));
        };
        if !session.active {
            return Ok(());
        }
        self.registry
            .terminate(session.id, TerminationReason::Manual)
            .await?;
        if let Err(e) = self
            .registry
            .refresh_active_count(session.credential_id, self.stale_cutoff())
            .await
        {
            debug!(credential_id = %session.credential_id, error = %e, "Count refresh skipped");
        }
        info!(session_id = %session.id, credential_id = %session.credential_id, "Session ended");
        Ok(())
    }

    /// Registers a new shared credential.
    pub async fn create_credential(&self, data: &CreateCredential) -> AppResult<Credential> {
        if !self.config.capacity_in_bounds(data.capacity) {
            return Err(AppError::validation(format!(
                "Capacity {} outside allowed range {}..={}",
                data.capacity, self.config.min_capacity, self.config.max_capacity
            )));
        }
        let credential = self.registry.create_credential(data).await?;
        info!(credential_id = %credential.id, capacity = credential.capacity, "Credential created");
        Ok(credential)
    }

    /// Lists registered credentials.
    pub async fn list_credentials(&self) -> AppResult<Vec<Credential>> {
        self.registry.list_credentials().await
    }

    /// Changes a credential's device capacity. Shrinking below the current
    /// live usage is refused rather than evicting anyone.
    pub async fn update_capacity(
        &self,
        credential_id: Uuid,
        new_capacity: i32,
    ) -> AppResult<Credential> {
        if !self.config.capacity_in_bounds(new_capacity) {
            return Err(AppError::validation(format!(
                "Capacity {} outside allowed range {}..={}",
                new_capacity, self.config.min_capacity, self.config.max_capacity
            )));
        }
        self.registry
            .update_capacity(credential_id, new_capacity, self.stale_cutoff())
            .await
    }

    /// Deactivates a credential and force-terminates all of its sessions.
    /// Subsequent admissions and heartbeats under it are rejected.
    pub async fn deactivate_credential(&self, credential_id: Uuid) -> AppResult<u64> {
        self.registry.deactivate_credential(credential_id).await?;
        let terminated = self
            .registry
            .terminate_all_by_credential(credential_id, TerminationReason::CredentialDeactivated)
            .await?;
        let event = AdmissionEvent::CredentialDeactivated {
            credential_id,
            sessions_expired: terminated,
        };
        info!(event = ?event, "Credential deactivated");
        Ok(terminated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemorySessionRegistry;
    use classcast_core::error::ErrorKind;
    use classcast_entity::device::{IdentityKey, NewDeviceSession};

    fn credential(capacity: i32) -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            name: "lab-a".to_string(),
            capacity,
            active: true,
            expires_at: None,
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Arc<MemorySessionRegistry>, LifecycleManager, Uuid) {
        let registry = Arc::new(MemorySessionRegistry::new());
        let cred = credential(5);
        let cred_id = cred.id;
        registry.put_credential(cred).await;
        let manager = LifecycleManager::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            AdmissionConfig::default(),
        );
        (registry, manager, cred_id)
    }

    async fn admit(registry: &MemorySessionRegistry, cred_id: Uuid, token: &str) -> DeviceSession {
        registry
            .insert_if_under_capacity(
                &NewDeviceSession {
                    credential_id: cred_id,
                    identity_key: IdentityKey::new(format!("dev:{token}")),
                    session_token: token.to_string(),
                },
                Utc::now() - Duration::hours(24),
            )
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_heartbeat_refreshes_activity() {
        let (registry, manager, cred_id) = setup().await;
        let session = admit(&registry, cred_id, "tok").await;
        registry
            .backdate_activity(session.id, Utc::now() - Duration::hours(1))
            .await;

        let refreshed = manager.heartbeat("tok").await.unwrap();
        assert!(refreshed.idle_seconds() < 5);
    }

    #[tokio::test]
    async fn test_heartbeat_rejected_for_unknown_token() {
        let (_registry, manager, _cred_id) = setup().await;
        let err = manager.heartbeat("nope").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_heartbeat_rejected_after_termination() {
        let (registry, manager, cred_id) = setup().await;
        let session = admit(&registry, cred_id, "tok").await;
        registry
            .terminate(session.id, TerminationReason::Manual)
            .await
            .unwrap();

        let err = manager.heartbeat("tok").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Inactive);
    }

    #[tokio::test]
    async fn test_heartbeat_past_staleness_window_expires_session() {
        let (registry, manager, cred_id) = setup().await;
        let session = admit(&registry, cred_id, "tok").await;
        registry
            .backdate_activity(session.id, Utc::now() - Duration::hours(25))
            .await;

        let err = manager.heartbeat("tok").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Expired);

        let stored = registry.get_session(session.id).await.unwrap();
        assert!(!stored.active);
        assert_eq!(stored.terminated_reason, TerminationReason::StaleExpired);
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent() {
        let (registry, manager, cred_id) = setup().await;
        let session = admit(&registry, cred_id, "tok").await;

        manager.end_session("tok").await.unwrap();
        manager.end_session("tok").await.unwrap();

        let stored = registry.get_session(session.id).await.unwrap();
        assert!(!stored.active);
        assert_eq!(stored.terminated_reason, TerminationReason::Manual);
    }

    #[tokio::test]
    async fn test_deactivate_terminates_every_session() {
        let (registry, manager, cred_id) = setup().await;
        let a = admit(&registry, cred_id, "tok-a").await;
        let b = admit(&registry, cred_id, "tok-b").await;

        let terminated = manager.deactivate_credential(cred_id).await.unwrap();
        assert_eq!(terminated, 2);

        for id in [a.id, b.id] {
            let stored = registry.get_session(id).await.unwrap();
            assert!(!stored.active);
            assert_eq!(
                stored.terminated_reason,
                TerminationReason::CredentialDeactivated
            );
        }
        let cred = registry.find_credential(cred_id).await.unwrap().unwrap();
        assert!(!cred.active);
    }

    #[tokio::test]
    async fn test_capacity_bounds_enforced() {
        let (_registry, manager, cred_id) = setup().await;

        let err = manager.update_capacity(cred_id, 0).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = manager.update_capacity(cred_id, 51).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);

        let updated = manager.update_capacity(cred_id, 10).await.unwrap();
        assert_eq!(updated.capacity, 10);
    }

    #[tokio::test]
    async fn test_capacity_cannot_shrink_below_live_usage() {
        let (registry, manager, cred_id) = setup().await;
        admit(&registry, cred_id, "tok-a").await;
        admit(&registry, cred_id, "tok-b").await;
        admit(&registry, cred_id, "tok-c").await;

        let err = manager.update_capacity(cred_id, 2).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }
}
