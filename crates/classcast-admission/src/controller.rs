//! Capacity-bounded admission decisions.
//!
//! `try_admit` is the single entry point deciding, for one join attempt,
//! whether the device is admitted fresh, reuses its existing session,
//! displaces the least-recently-active device, or is rejected. Decisions
//! for the same credential are serialized through a per-credential mutex
//! held across the whole read-decide-write sequence, so two concurrent
//! attempts against a full credential can never both land as plain admits.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

use classcast_core::config::admission::AdmissionConfig;
use classcast_core::error::{AppError, ErrorKind};
use classcast_core::events::AdmissionEvent;
use classcast_core::result::AppResult;
use classcast_entity::device::{DeviceSession, IdentityKey, NewDeviceSession, TerminationReason};

use crate::notify::EvictionNotifier;
use crate::registry::SessionRegistry;

/// Why an admission attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The credential does not exist, is deactivated, or is expired.
    CredentialUnavailable,
    /// The eviction policy could not free room (capacity misconfigured
    /// to zero).
    CapacityExceeded,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CredentialUnavailable => write!(f, "credential_unavailable"),
            Self::CapacityExceeded => write!(f, "capacity_exceeded"),
        }
    }
}

/// Outcome of one admission attempt.
#[derive(Debug, Clone)]
pub enum AdmissionDecision {
    /// A new session was created under capacity.
    Admit {
        /// The created session.
        session: DeviceSession,
        /// True when the registry was unreachable and the fail-open policy
        /// granted access without durable bookkeeping.
        degraded: bool,
    },
    /// The device already held an active session; it was refreshed.
    Reused {
        /// The refreshed session.
        session: DeviceSession,
    },
    /// Admission succeeded by displacing the least-recently-active device.
    Evicted {
        /// The created session.
        session: DeviceSession,
        /// The session that was displaced to make room.
        displaced: DeviceSession,
    },
    /// Admission was denied.
    Rejected {
        /// Why the attempt was denied.
        reason: RejectReason,
    },
}

impl AdmissionDecision {
    /// Whether the device got in.
    pub fn is_admitted(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }

    /// The session granted to the caller, when admitted.
    pub fn session(&self) -> Option<&DeviceSession> {
        match self {
            Self::Admit { session, .. } | Self::Reused { session } | Self::Evicted { session, .. } => {
                Some(session)
            }
            Self::Rejected { .. } => None,
        }
    }

    /// Whether the decision was made without the registry (fail-open).
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Admit { degraded: true, .. })
    }
}

/// Decides admit / reuse / evict / reject for join attempts against shared
/// credentials.
pub struct AdmissionController {
    /// Durable session registry.
    registry: Arc<dyn SessionRegistry>,
    /// Best-effort eviction notification channel.
    notifier: Arc<dyn EvictionNotifier>,
    /// Admission configuration.
    config: AdmissionConfig,
    /// Per-credential critical sections. Scoped to one credential so
    /// unrelated credentials' admission traffic is never serialized.
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Sessions granted while the registry was unreachable, awaiting
    /// durable write-back.
    degraded_backlog: Mutex<Vec<DeviceSession>>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("config", &self.config)
            .finish()
    }
}

impl AdmissionController {
    /// Creates a new admission controller.
    pub fn new(
        registry: Arc<dyn SessionRegistry>,
        notifier: Arc<dyn EvictionNotifier>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            registry,
            notifier,
            config,
            locks: DashMap::new(),
            degraded_backlog: Mutex::new(Vec::new()),
        }
    }

    /// The staleness cutoff instant: sessions idle since before it no
    /// longer count toward capacity.
    fn stale_cutoff(&self) -> DateTime<Utc> {
        Utc::now() - Duration::hours(self.config.staleness_ttl_hours as i64)
    }

    #[cfg(test)]
    fn tracked_credentials(&self) -> usize {
        self.locks.len()
    }

    fn credential_lock(&self, credential_id: Uuid) -> Arc<Mutex<()>> {
        self.locks
            .entry(credential_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Attempts to admit a device under a credential.
    ///
    /// Registry failures on this path fail **open** when configured: the
    /// device is admitted with a degraded-mode marker and the failure is
    /// logged with full context. Classroom availability outranks strict
    /// enforcement here; every other operation in the system surfaces
    /// `StoreUnavailable` instead.
    pub async fn try_admit(
        &self,
        credential_id: Uuid,
        identity_key: IdentityKey,
        session_token: String,
    ) -> AppResult<AdmissionDecision> {
        self.replay_degraded_backlog().await;

        let lock = self.credential_lock(credential_id);
        let guard = lock.lock().await;

        let result = self
            .decide(credential_id, &identity_key, &session_token)
            .await;

        match result {
            Ok(decision) => {
                if let AdmissionDecision::Rejected { reason } = &decision {
                    warn!(
                        event = ?AdmissionEvent::Rejected {
                            credential_id,
                            reason: reason.to_string(),
                        },
                        "Admission rejected"
                    );
                    // An unusable credential will never admit again; drop
                    // its lock entry so requests against arbitrary unknown
                    // ids cannot grow the map without bound.
                    if *reason == RejectReason::CredentialUnavailable {
                        drop(guard);
                        self.locks.remove(&credential_id);
                        return Ok(decision);
                    }
                }
                self.commit_bookkeeping(credential_id, &decision).await;
                Ok(decision)
            }
            Err(e) if e.kind == ErrorKind::StoreUnavailable && self.config.fail_open => {
                error!(
                    credential_id = %credential_id,
                    identity_key = %identity_key,
                    error = %e,
                    "Session registry unreachable during admission; failing open"
                );
                let now = Utc::now();
                let session = DeviceSession {
                    id: Uuid::new_v4(),
                    credential_id,
                    identity_key,
                    session_token,
                    active: true,
                    terminated_reason: TerminationReason::None,
                    created_at: now,
                    last_activity: now,
                    terminated_at: None,
                };
                self.degraded_backlog.lock().await.push(session.clone());
                Ok(AdmissionDecision::Admit {
                    session,
                    degraded: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Writes back sessions granted while the registry was unreachable.
    ///
    /// Returns how many became durable. Sessions the registry still
    /// refuses stay queued for the next pass; the count-reconcile job
    /// calls this, and every admission attempt retries it opportunistically
    /// so a recovered store catches up without waiting for the cron tick.
    pub async fn flush_degraded(&self) -> AppResult<usize> {
        let mut backlog = self.degraded_backlog.lock().await;
        if backlog.is_empty() {
            return Ok(0);
        }

        let mut restored = 0;
        while let Some(session) = backlog.first().cloned() {
            match self.registry.restore_session(&session).await {
                Ok(_) => {
                    backlog.remove(0);
                    restored += 1;
                    debug!(
                        session_id = %session.id,
                        credential_id = %session.credential_id,
                        "Degraded-mode session made durable"
                    );
                    if let Err(e) = self
                        .registry
                        .refresh_active_count(session.credential_id, self.stale_cutoff())
                        .await
                    {
                        warn!(
                            credential_id = %session.credential_id,
                            error = %e,
                            "Failed to refresh active count after write-back"
                        );
                    }
                }
                Err(e) => {
                    // Still down; keep the remainder for the next pass.
                    warn!(
                        pending = backlog.len(),
                        error = %e,
                        "Degraded-session write-back halted"
                    );
                    return Err(e);
                }
            }
        }
        Ok(restored)
    }

    async fn replay_degraded_backlog(&self) {
        let pending = { !self.degraded_backlog.lock().await.is_empty() };
        if pending {
            // Best effort; admission proceeds either way.
            let _ = self.flush_degraded().await;
        }
    }

    /// Read-only occupancy query for capacity-aware UIs.
    pub async fn active_device_count(&self, credential_id: Uuid) -> AppResult<i64> {
        let live = self
            .registry
            .live_sessions(credential_id, self.stale_cutoff())
            .await?;
        Ok(live.len() as i64)
    }

    /// The decision sequence proper. Runs entirely under the caller's
    /// per-credential lock; every step that writes is individually atomic
    /// in the registry, and a lost race (a sweep terminating the victim
    /// mid-eviction) re-reads the working set and re-decides.
    async fn decide(
        &self,
        credential_id: Uuid,
        identity_key: &IdentityKey,
        session_token: &str,
    ) -> AppResult<AdmissionDecision> {
        let Some(credential) = self.registry.find_credential(credential_id).await? else {
            warn!(credential_id = %credential_id, "Admission against unknown credential");
            return Ok(AdmissionDecision::Rejected {
                reason: RejectReason::CredentialUnavailable,
            });
        };

        if !credential.is_usable() {
            warn!(
                credential_id = %credential_id,
                active = credential.active,
                expired = credential.is_expired(),
                "Admission against unusable credential"
            );
            return Ok(AdmissionDecision::Rejected {
                reason: RejectReason::CredentialUnavailable,
            });
        }

        let cutoff = self.stale_cutoff();
        let new_session = NewDeviceSession {
            credential_id,
            identity_key: identity_key.clone(),
            session_token: session_token.to_string(),
        };

        for _ in 0..4 {
            let live = self.registry.live_sessions(credential_id, cutoff).await?;

            // Same device returning: refresh and reuse.
            if let Some(existing) = live.iter().find(|s| &s.identity_key == identity_key) {
                match self.registry.touch(existing.id, session_token).await? {
                    Some(session) => return Ok(AdmissionDecision::Reused { session }),
                    None => continue,
                }
            }

            // Room under capacity: conditional insert.
            if (live.len() as i32) < credential.capacity {
                match self
                    .registry
                    .insert_if_under_capacity(&new_session, cutoff)
                    .await?
                {
                    Some(session) => {
                        return Ok(AdmissionDecision::Admit {
                            session,
                            degraded: false,
                        });
                    }
                    None => continue,
                }
            }

            // At capacity: displace the least-recently-active session.
            // `live` is ordered most-recent first with ties on latest
            // creation, so the last entry is the eviction victim.
            let Some(victim) = live.last().cloned() else {
                return Ok(AdmissionDecision::Rejected {
                    reason: RejectReason::CapacityExceeded,
                });
            };

            match self
                .registry
                .evict_and_insert(victim.id, &new_session)
                .await?
            {
                Some(session) => {
                    return Ok(AdmissionDecision::Evicted {
                        session,
                        displaced: victim,
                    });
                }
                None => continue,
            }
        }

        Err(AppError::internal(format!(
            "Admission for credential {credential_id} kept losing commit races"
        )))
    }

    /// Post-commit bookkeeping: cached occupancy refresh, last-used stamp,
    /// and the eviction notification. All best-effort; a failure here never
    /// takes back a committed decision.
    async fn commit_bookkeeping(&self, credential_id: Uuid, decision: &AdmissionDecision) {
        if !decision.is_admitted() || decision.is_degraded() {
            return;
        }

        let event = match decision {
            AdmissionDecision::Admit { session, degraded } => AdmissionEvent::Admitted {
                session_id: session.id,
                credential_id,
                degraded: *degraded,
            },
            AdmissionDecision::Reused { session } => AdmissionEvent::Reused {
                session_id: session.id,
                credential_id,
            },
            AdmissionDecision::Evicted { session, displaced } => AdmissionEvent::Evicted {
                session_id: session.id,
                displaced_session_id: displaced.id,
                credential_id,
            },
            AdmissionDecision::Rejected { .. } => return,
        };
        debug!(event = ?event, "Admission decision committed");

        if let Err(e) = self
            .registry
            .refresh_active_count(credential_id, self.stale_cutoff())
            .await
        {
            warn!(credential_id = %credential_id, error = %e, "Failed to refresh active count");
        }
        if let Err(e) = self
            .registry
            .touch_credential_last_used(credential_id)
            .await
        {
            warn!(credential_id = %credential_id, error = %e, "Failed to stamp last-used");
        }

        if matches!(decision, AdmissionDecision::Evicted { .. }) {
            let notifier = Arc::clone(&self.notifier);
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&event).await {
                    warn!(error = %e, "Eviction notification failed");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::LogNotifier;
    use crate::registry::MemorySessionRegistry;
    use async_trait::async_trait;
    use classcast_entity::credential::Credential;

    fn credential(capacity: i32) -> Credential {
        let now = Utc::now();
        Credential {
            id: Uuid::new_v4(),
            name: "room-101".to_string(),
            capacity,
            active: true,
            expires_at: None,
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn setup(capacity: i32) -> (Arc<MemorySessionRegistry>, AdmissionController, Uuid) {
        let registry = Arc::new(MemorySessionRegistry::new());
        let cred = credential(capacity);
        let cred_id = cred.id;
        registry.put_credential(cred).await;
        let controller = AdmissionController::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        );
        (registry, controller, cred_id)
    }

    fn key(name: &str) -> IdentityKey {
        IdentityKey::new(format!("dev:{name}"))
    }

    #[tokio::test]
    async fn test_admit_under_capacity() {
        let (_registry, controller, cred_id) = setup(2).await;

        let a = controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();
        let b = controller
            .try_admit(cred_id, key("b"), "tok-b".into())
            .await
            .unwrap();

        assert!(matches!(a, AdmissionDecision::Admit { degraded: false, .. }));
        assert!(matches!(b, AdmissionDecision::Admit { degraded: false, .. }));
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_reuse_is_idempotent() {
        let (_registry, controller, cred_id) = setup(2).await;

        let first = controller
            .try_admit(cred_id, key("a"), "tok-1".into())
            .await
            .unwrap();
        let first_id = first.session().unwrap().id;

        for i in 0..3 {
            let again = controller
                .try_admit(cred_id, key("a"), format!("tok-{i}"))
                .await
                .unwrap();
            match again {
                AdmissionDecision::Reused { session } => assert_eq!(session.id, first_id),
                other => panic!("expected Reused, got {other:?}"),
            }
        }
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_eviction_displaces_least_recently_active() {
        let (registry, controller, cred_id) = setup(2).await;

        let a = controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();
        let a_id = a.session().unwrap().id;
        let _b = controller
            .try_admit(cred_id, key("b"), "tok-b".into())
            .await
            .unwrap();

        // A has been quiet longer than B.
        registry
            .backdate_activity(a_id, Utc::now() - Duration::hours(2))
            .await;

        let c = controller
            .try_admit(cred_id, key("c"), "tok-c".into())
            .await
            .unwrap();
        match c {
            AdmissionDecision::Evicted { displaced, .. } => assert_eq!(displaced.id, a_id),
            other => panic!("expected Evicted, got {other:?}"),
        }

        let a_session = registry.get_session(a_id).await.unwrap();
        assert!(!a_session.active);
        assert_eq!(
            a_session.terminated_reason,
            TerminationReason::LimitExceededEvicted
        );
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_eviction_tie_broken_by_earliest_creation() {
        let (registry, controller, cred_id) = setup(2).await;

        let a = controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();
        let a_id = a.session().unwrap().id;
        let b = controller
            .try_admit(cred_id, key("b"), "tok-b".into())
            .await
            .unwrap();
        let b_id = b.session().unwrap().id;

        // Identical last activity; A was created first.
        let instant = Utc::now() - Duration::minutes(30);
        registry.backdate_activity(a_id, instant).await;
        registry.backdate_activity(b_id, instant).await;
        registry
            .backdate_creation(a_id, instant - Duration::minutes(5))
            .await;
        registry.backdate_creation(b_id, instant).await;

        let c = controller
            .try_admit(cred_id, key("c"), "tok-c".into())
            .await
            .unwrap();
        match c {
            AdmissionDecision::Evicted { displaced, .. } => assert_eq!(displaced.id, a_id),
            other => panic!("expected Evicted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_for_unknown_inactive_or_expired_credential() {
        let (registry, controller, _cred_id) = setup(2).await;

        let unknown = controller
            .try_admit(Uuid::new_v4(), key("a"), "tok".into())
            .await
            .unwrap();
        assert!(matches!(
            unknown,
            AdmissionDecision::Rejected {
                reason: RejectReason::CredentialUnavailable
            }
        ));

        let mut inactive = credential(2);
        inactive.active = false;
        let inactive_id = inactive.id;
        registry.put_credential(inactive).await;
        let decision = controller
            .try_admit(inactive_id, key("a"), "tok".into())
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AdmissionDecision::Rejected {
                reason: RejectReason::CredentialUnavailable
            }
        ));

        let mut expired = credential(2);
        expired.expires_at = Some(Utc::now() - Duration::hours(1));
        let expired_id = expired.id;
        registry.put_credential(expired).await;
        let decision = controller
            .try_admit(expired_id, key("a"), "tok".into())
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AdmissionDecision::Rejected {
                reason: RejectReason::CredentialUnavailable
            }
        ));
    }

    #[tokio::test]
    async fn test_zero_capacity_rejects_with_capacity_exceeded() {
        // Capacity zero can only appear via bad data, never via the config
        // bounds; admission must still answer deterministically.
        let (registry, _, _) = setup(2).await;
        let cred = credential(0);
        let cred_id = cred.id;
        registry.put_credential(cred).await;
        let controller = AdmissionController::new(
            registry as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        );

        let decision = controller
            .try_admit(cred_id, key("a"), "tok".into())
            .await
            .unwrap();
        assert!(matches!(
            decision,
            AdmissionDecision::Rejected {
                reason: RejectReason::CapacityExceeded
            }
        ));
    }

    #[tokio::test]
    async fn test_capacity_never_exceeded_under_concurrent_burst() {
        let (_registry, controller, cred_id) = setup(3).await;
        let controller = Arc::new(controller);

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let controller = Arc::clone(&controller);
                tokio::spawn(async move {
                    controller
                        .try_admit(cred_id, key(&format!("device-{i}")), format!("tok-{i}"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        for result in futures::future::join_all(handles).await {
            assert!(result.unwrap().is_admitted());
        }

        // Regardless of interleaving, the live set never exceeds capacity.
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 3);
    }

    /// Registry stub whose every call fails as the store being down.
    #[derive(Debug)]
    struct UnreachableRegistry;

    #[async_trait]
    impl SessionRegistry for UnreachableRegistry {
        async fn find_credential(
            &self,
            _id: Uuid,
        ) -> AppResult<Option<classcast_entity::credential::Credential>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn create_credential(
            &self,
            _data: &classcast_entity::credential::CreateCredential,
        ) -> AppResult<classcast_entity::credential::Credential> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn list_credentials(
            &self,
        ) -> AppResult<Vec<classcast_entity::credential::Credential>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn update_capacity(
            &self,
            _id: Uuid,
            _new_capacity: i32,
            _stale_cutoff: DateTime<Utc>,
        ) -> AppResult<classcast_entity::credential::Credential> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn deactivate_credential(&self, _id: Uuid) -> AppResult<()> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn touch_credential_last_used(&self, _id: Uuid) -> AppResult<()> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn refresh_active_count(
            &self,
            _id: Uuid,
            _stale_cutoff: DateTime<Utc>,
        ) -> AppResult<i64> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn live_sessions(
            &self,
            _credential_id: Uuid,
            _stale_cutoff: DateTime<Utc>,
        ) -> AppResult<Vec<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn insert_if_under_capacity(
            &self,
            _data: &NewDeviceSession,
            _stale_cutoff: DateTime<Utc>,
        ) -> AppResult<Option<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn evict_and_insert(
            &self,
            _evicted_id: Uuid,
            _data: &NewDeviceSession,
        ) -> AppResult<Option<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn restore_session(&self, _session: &DeviceSession) -> AppResult<bool> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn touch(
            &self,
            _session_id: Uuid,
            _new_token: &str,
        ) -> AppResult<Option<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn find_by_token(&self, _session_token: &str) -> AppResult<Option<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn touch_by_token(&self, _session_token: &str) -> AppResult<Option<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn terminate(
            &self,
            _session_id: Uuid,
            _reason: TerminationReason,
        ) -> AppResult<bool> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn terminate_all_by_credential(
            &self,
            _credential_id: Uuid,
            _reason: TerminationReason,
        ) -> AppResult<u64> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn find_stale(
            &self,
            _stale_cutoff: DateTime<Utc>,
        ) -> AppResult<Vec<DeviceSession>> {
            Err(AppError::store_unavailable("registry down"))
        }
        async fn purge_terminated_before(&self, _cutoff: DateTime<Utc>) -> AppResult<u64> {
            Err(AppError::store_unavailable("registry down"))
        }
    }

    #[tokio::test]
    async fn test_stale_device_readmits_with_a_fresh_session() {
        let (registry, controller, cred_id) = setup(2).await;

        let first = controller
            .try_admit(cred_id, key("a"), "tok-old".into())
            .await
            .unwrap();
        let first_id = first.session().unwrap().id;

        // Idle past the TTL but never swept.
        registry
            .backdate_activity(first_id, Utc::now() - Duration::hours(25))
            .await;

        let again = controller
            .try_admit(cred_id, key("a"), "tok-new".into())
            .await
            .unwrap();
        match again {
            AdmissionDecision::Admit { degraded, ref session } => {
                assert!(!degraded);
                assert_ne!(session.id, first_id);
            }
            other => panic!("expected fresh Admit, got {other:?}"),
        }

        // The abandoned row gave up its active-identity slot.
        let old = registry.get_session(first_id).await.unwrap();
        assert!(!old.active);
        assert_eq!(old.terminated_reason, TerminationReason::StaleExpired);
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unusable_credential_lock_is_pruned() {
        let (_registry, controller, cred_id) = setup(2).await;

        controller
            .try_admit(Uuid::new_v4(), key("stray-1"), "tok-1".into())
            .await
            .unwrap();
        controller
            .try_admit(Uuid::new_v4(), key("stray-2"), "tok-2".into())
            .await
            .unwrap();
        assert_eq!(controller.tracked_credentials(), 0);

        controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();
        assert_eq!(controller.tracked_credentials(), 1);
    }

    /// Registry wrapper that can be taken down and brought back up.
    #[derive(Debug)]
    struct FlakyRegistry {
        inner: MemorySessionRegistry,
        down: std::sync::atomic::AtomicBool,
    }

    impl FlakyRegistry {
        fn new() -> Self {
            Self {
                inner: MemorySessionRegistry::new(),
                down: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, std::sync::atomic::Ordering::SeqCst);
        }

        fn check(&self) -> AppResult<()> {
            if self.down.load(std::sync::atomic::Ordering::SeqCst) {
                Err(AppError::store_unavailable("registry down"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl SessionRegistry for FlakyRegistry {
        async fn find_credential(
            &self,
            id: Uuid,
        ) -> AppResult<Option<classcast_entity::credential::Credential>> {
            self.check()?;
            self.inner.find_credential(id).await
        }
        async fn create_credential(
            &self,
            data: &classcast_entity::credential::CreateCredential,
        ) -> AppResult<classcast_entity::credential::Credential> {
            self.check()?;
            self.inner.create_credential(data).await
        }
        async fn list_credentials(
            &self,
        ) -> AppResult<Vec<classcast_entity::credential::Credential>> {
            self.check()?;
            self.inner.list_credentials().await
        }
        async fn update_capacity(
            &self,
            id: Uuid,
            new_capacity: i32,
            stale_cutoff: DateTime<Utc>,
        ) -> AppResult<classcast_entity::credential::Credential> {
            self.check()?;
            self.inner.update_capacity(id, new_capacity, stale_cutoff).await
        }
        async fn deactivate_credential(&self, id: Uuid) -> AppResult<()> {
            self.check()?;
            self.inner.deactivate_credential(id).await
        }
        async fn touch_credential_last_used(&self, id: Uuid) -> AppResult<()> {
            self.check()?;
            self.inner.touch_credential_last_used(id).await
        }
        async fn refresh_active_count(
            &self,
            id: Uuid,
            stale_cutoff: DateTime<Utc>,
        ) -> AppResult<i64> {
            self.check()?;
            self.inner.refresh_active_count(id, stale_cutoff).await
        }
        async fn live_sessions(
            &self,
            credential_id: Uuid,
            stale_cutoff: DateTime<Utc>,
        ) -> AppResult<Vec<DeviceSession>> {
            self.check()?;
            self.inner.live_sessions(credential_id, stale_cutoff).await
        }
        async fn insert_if_under_capacity(
            &self,
            data: &NewDeviceSession,
            stale_cutoff: DateTime<Utc>,
        ) -> AppResult<Option<DeviceSession>> {
            self.check()?;
            self.inner.insert_if_under_capacity(data, stale_cutoff).await
        }
        async fn evict_and_insert(
            &self,
            evicted_id: Uuid,
            data: &NewDeviceSession,
        ) -> AppResult<Option<DeviceSession>> {
            self.check()?;
            self.inner.evict_and_insert(evicted_id, data).await
        }
        async fn restore_session(&self, session: &DeviceSession) -> AppResult<bool> {
            self.check()?;
            self.inner.restore_session(session).await
        }
        async fn touch(
            &self,
            session_id: Uuid,
            new_token: &str,
        ) -> AppResult<Option<DeviceSession>> {
            self.check()?;
            self.inner.touch(session_id, new_token).await
        }
        async fn find_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
            self.check()?;
            self.inner.find_by_token(session_token).await
        }
        async fn touch_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
            self.check()?;
            self.inner.touch_by_token(session_token).await
        }
        async fn terminate(&self, session_id: Uuid, reason: TerminationReason) -> AppResult<bool> {
            self.check()?;
            self.inner.terminate(session_id, reason).await
        }
        async fn terminate_all_by_credential(
            &self,
            credential_id: Uuid,
            reason: TerminationReason,
        ) -> AppResult<u64> {
            self.check()?;
            self.inner
                .terminate_all_by_credential(credential_id, reason)
                .await
        }
        async fn find_stale(&self, stale_cutoff: DateTime<Utc>) -> AppResult<Vec<DeviceSession>> {
            self.check()?;
            self.inner.find_stale(stale_cutoff).await
        }
        async fn purge_terminated_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
            self.check()?;
            self.inner.purge_terminated_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn test_degraded_admission_becomes_durable_after_recovery() {
        let registry = Arc::new(FlakyRegistry::new());
        let cred = credential(2);
        let cred_id = cred.id;
        registry.inner.put_credential(cred).await;
        let controller = AdmissionController::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        );

        registry.set_down(true);
        let decision = controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();
        assert!(decision.is_degraded());
        let granted = decision.session().unwrap().clone();

        // Nothing durable yet; the token cannot heartbeat.
        registry.set_down(false);
        assert!(registry.inner.find_by_token("tok-a").await.unwrap().is_none());

        assert_eq!(controller.flush_degraded().await.unwrap(), 1);
        let durable = registry
            .inner
            .find_by_token("tok-a")
            .await
            .unwrap()
            .expect("degraded session written back");
        assert_eq!(durable.id, granted.id);
        assert!(durable.active);

        // Replaying an empty backlog is a no-op.
        assert_eq!(controller.flush_degraded().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_degraded_backlog_drains_on_next_admission() {
        let registry = Arc::new(FlakyRegistry::new());
        let cred = credential(3);
        let cred_id = cred.id;
        registry.inner.put_credential(cred).await;
        let controller = AdmissionController::new(
            Arc::clone(&registry) as Arc<dyn SessionRegistry>,
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        );

        registry.set_down(true);
        controller
            .try_admit(cred_id, key("a"), "tok-a".into())
            .await
            .unwrap();

        // Store comes back; a later admission replays the backlog first.
        registry.set_down(false);
        controller
            .try_admit(cred_id, key("b"), "tok-b".into())
            .await
            .unwrap();

        assert!(registry.inner.find_by_token("tok-a").await.unwrap().is_some());
        assert_eq!(controller.active_device_count(cred_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_fail_open_when_registry_unreachable() {
        let controller = AdmissionController::new(
            Arc::new(UnreachableRegistry),
            Arc::new(LogNotifier),
            AdmissionConfig::default(),
        );

        let decision = controller
            .try_admit(Uuid::new_v4(), key("a"), "tok".into())
            .await
            .unwrap();
        match decision {
            AdmissionDecision::Admit { degraded, ref session } => {
                assert!(degraded);
                assert!(session.active);
            }
            other => panic!("expected degraded Admit, got {other:?}"),
        }
        assert!(decision.is_degraded());
    }

    #[tokio::test]
    async fn test_fail_closed_when_configured() {
        let config = AdmissionConfig {
            fail_open: false,
            ..AdmissionConfig::default()
        };
        let controller = AdmissionController::new(
            Arc::new(UnreachableRegistry),
            Arc::new(LogNotifier),
            config,
        );

        let err = controller
            .try_admit(Uuid::new_v4(), key("a"), "tok".into())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::StoreUnavailable);
    }
}
