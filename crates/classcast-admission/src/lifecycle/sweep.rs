//! Background reclamation of stale sessions and audit retention.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use classcast_core::config::admission::AdmissionConfig;
use classcast_core::config::worker::WorkerConfig;
use classcast_core::events::AdmissionEvent;
use classcast_core::result::AppResult;
use classcast_entity::device::TerminationReason;

use crate::registry::SessionRegistry;

/// Reclaims sessions idle past the staleness TTL and purges terminated
/// sessions past the audit retention window.
///
/// The sweep is a janitor, not a gatekeeper: stale sessions already stopped
/// counting toward capacity the moment their TTL elapsed, because every
/// capacity read filters on the staleness cutoff. The sweep just turns that
/// logical state into durable terminations.
pub struct StaleSweeper {
    registry: Arc<dyn SessionRegistry>,
    staleness_ttl_hours: u64,
    retention_days: u32,
}

impl StaleSweeper {
    /// Creates a new sweeper.
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        admission: &AdmissionConfig,
        worker: &WorkerConfig,
    ) -> Self {
        Self {
            registry,
            staleness_ttl_hours: admission.staleness_ttl_hours,
            retention_days: worker.retention_days,
        }
    }

    fn stale_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::hours(self.staleness_ttl_hours as i64)
    }

    /// Terminates every active session idle since before the staleness
    /// cutoff. Returns how many were reclaimed.
    pub async fn run_sweep(&self) -> AppResult<u64> {
        let cutoff = self.stale_cutoff();
        let stale = self.registry.find_stale(cutoff).await?;
        if stale.is_empty() {
            debug!("Staleness sweep found nothing to reclaim");
            return Ok(0);
        }

        let mut swept = 0u64;
        let mut touched_credentials = HashSet::new();
        for session in &stale {
            // A heartbeat or eviction may have raced us; terminate returns
            // false when the session is no longer active.
            if self
                .registry
                .terminate(session.id, TerminationReason::StaleExpired)
                .await?
            {
                swept += 1;
                touched_credentials.insert(session.credential_id);
                let event = AdmissionEvent::SweptStale {
                    session_id: session.id,
                    credential_id: session.credential_id,
                    idle_seconds: session.idle_seconds(),
                };
                debug!(event = ?event, "Stale session reclaimed");
            }
        }

        for credential_id in touched_credentials {
            if let Err(e) = self
                .registry
                .refresh_active_count(credential_id, cutoff)
                .await
            {
                warn!(credential_id = %credential_id, error = %e, "Count refresh failed after sweep");
            }
        }

        info!(swept, "Staleness sweep completed");
        Ok(swept)
    }

    /// Physically deletes terminated sessions older than the retention
    /// window. Active sessions are never purged.
    pub async fn purge_expired(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - Duration::days(self.retention_days as i64);
        let purged = self.registry.purge_terminated_before(cutoff).await?;
        if purged > 0 {
            info!(purged, retention_days = self.retention_days, "Retention purge completed");
        }
        Ok(purged)
    }

    /// Recomputes every credential's cached active-device count from the
    /// session registry, repairing any drift from degraded-mode admissions.
    pub async fn reconcile_counts(&self) -> AppResult<u64> {
        let cutoff = self.stale_cutoff();
        let credentials = self.registry.list_credentials().await?;
        let mut reconciled = 0u64;
        for credential in &credentials {
            let count = self
                .registry
                .refresh_active_count(credential.id, cutoff)
                .await?;
            if count != credential.active_device_count as i64 {
                debug!(
                    credential_id = %credential.id,
                    cached = credential.active_device_count,
                    actual = count,
                    "Active-count drift reconciled"
                );
                reconciled += 1;
            }
        }
        Ok(reconciled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemorySessionRegistry;
    use classcast_entity::credential::Credential;
    use classcast_entity::device::{IdentityKey, NewDeviceSession};
    use uuid::Uuid;

    fn credential(capacity: i32) -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            name: "lab-b".to_string(),
            capacity,
            active: true,
            expires_at: None,
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup() -> (Arc<MemorySessionRegistry>, StaleSweeper, Uuid) {
        let registry = Arc::new(MemorySessionRegistry::new());
        let cred = credential(10);
        let cred_id = cred.id;
        registry.put_credential(cred).await;
        let sweeper = StaleSweeper::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            &AdmissionConfig::default(),
            &WorkerConfig::default(),
        );
        (registry, sweeper, cred_id)
    }

    async fn admit(
        registry: &MemorySessionRegistry,
        cred_id: Uuid,
        token: &str,
    ) -> classcast_entity::device::DeviceSession {
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
    async fn test_sweep_reclaims_only_sessions_past_ttl() {
        let (registry, sweeper, cred_id) = setup().await;
        let stale = admit(&registry, cred_id, "stale").await;
        let fresh = admit(&registry, cred_id, "fresh").await;
        registry
            .backdate_activity(stale.id, Utc::now() - Duration::hours(25))
            .await;
        registry
            .backdate_activity(fresh.id, Utc::now() - Duration::hours(23))
            .await;

        let swept = sweeper.run_sweep().await.unwrap();
        assert_eq!(swept, 1);

        let stale_stored = registry.get_session(stale.id).await.unwrap();
        assert!(!stale_stored.active);
        assert_eq!(
            stale_stored.terminated_reason,
            TerminationReason::StaleExpired
        );
        assert!(registry.get_session(fresh.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_sweep_refreshes_credential_counts() {
        let (registry, sweeper, cred_id) = setup().await;
        let stale = admit(&registry, cred_id, "stale").await;
        admit(&registry, cred_id, "fresh").await;
        registry
            .backdate_activity(stale.id, Utc::now() - Duration::hours(30))
            .await;

        sweeper.run_sweep().await.unwrap();

        let cred = registry.find_credential(cred_id).await.unwrap().unwrap();
        assert_eq!(cred.active_device_count, 1);
    }

    #[tokio::test]
    async fn test_purge_removes_only_old_terminated_sessions() {
        let (registry, sweeper, cred_id) = setup().await;
        let old = admit(&registry, cred_id, "old").await;
        let recent = admit(&registry, cred_id, "recent").await;
        let live = admit(&registry, cred_id, "live").await;

        registry
            .terminate(old.id, TerminationReason::Manual)
            .await
            .unwrap();
        registry
            .terminate(recent.id, TerminationReason::Manual)
            .await
            .unwrap();
        registry
            .backdate_termination(old.id, Utc::now() - Duration::days(120))
            .await;

        let purged = sweeper.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert!(registry.get_session(old.id).await.is_none());
        assert!(registry.get_session(recent.id).await.is_some());
        assert!(registry.get_session(live.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_count_drift() {
        let (registry, sweeper, cred_id) = setup().await;
        admit(&registry, cred_id, "a").await;
        admit(&registry, cred_id, "b").await;

        // Simulate drift from a degraded-mode admission.
        let mut cred = registry.find_credential(cred_id).await.unwrap().unwrap();
        cred.active_device_count = 7;
        registry.put_credential(cred).await;

        let reconciled = sweeper.reconcile_counts().await.unwrap();
        assert_eq!(reconciled, 1);

        let cred = registry.find_credential(cred_id).await.unwrap().unwrap();
        assert_eq!(cred.active_device_count, 2);
    }
}
