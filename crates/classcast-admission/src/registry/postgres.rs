//! Postgres-backed session registry delegating to the sqlx repositories.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use classcast_core::result::AppResult;
use classcast_database::repositories::{CredentialRepository, DeviceSessionRepository};
use classcast_entity::credential::{CreateCredential, Credential};
use classcast_entity::device::{DeviceSession, NewDeviceSession, TerminationReason};

use super::SessionRegistry;

/// Session registry backed by PostgreSQL.
///
/// Admission-critical writes run through the repository's transactional
/// methods; everything else is a straight delegation.
#[derive(Debug, Clone)]
pub struct PostgresSessionRegistry {
    /// Credential persistence.
    credentials: Arc<CredentialRepository>,
    /// Device session persistence.
    sessions: Arc<DeviceSessionRepository>,
}

impl PostgresSessionRegistry {
    /// Creates a registry over the given repositories.
    pub fn new(
        credentials: Arc<CredentialRepository>,
        sessions: Arc<DeviceSessionRepository>,
    ) -> Self {
        Self {
            credentials,
            sessions,
        }
    }
}

#[async_trait]
impl SessionRegistry for PostgresSessionRegistry {
    async fn find_credential(&self, id: Uuid) -> AppResult<Option<Credential>> {
        self.credentials.find_by_id(id).await
    }

    async fn create_credential(&self, data: &CreateCredential) -> AppResult<Credential> {
        self.credentials.create(data).await
    }

    async fn list_credentials(&self) -> AppResult<Vec<Credential>> {
        self.credentials.find_all_active().await
    }

    async fn update_capacity(
        &self,
        id: Uuid,
        new_capacity: i32,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Credential> {
        self.credentials
            .update_capacity(id, new_capacity, stale_cutoff)
            .await
    }

    async fn deactivate_credential(&self, id: Uuid) -> AppResult<()> {
        self.credentials.deactivate(id).await
    }

    async fn touch_credential_last_used(&self, id: Uuid) -> AppResult<()> {
        self.credentials.touch_last_used(id).await
    }

    async fn refresh_active_count(
        &self,
        id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<i64> {
        self.credentials.refresh_active_count(id, stale_cutoff).await
    }

    async fn live_sessions(
        &self,
        credential_id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<DeviceSession>> {
        self.sessions
            .find_live_by_credential(credential_id, stale_cutoff)
            .await
    }

    async fn insert_if_under_capacity(
        &self,
        data: &NewDeviceSession,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Option<DeviceSession>> {
        self.sessions
            .insert_if_under_capacity(data, stale_cutoff)
            .await
    }

    async fn evict_and_insert(
        &self,
        evicted_id: Uuid,
        data: &NewDeviceSession,
    ) -> AppResult<Option<DeviceSession>> {
        self.sessions.evict_and_insert(evicted_id, data).await
    }

    async fn restore_session(&self, session: &DeviceSession) -> AppResult<bool> {
        self.sessions.restore(session).await
    }

    async fn touch(&self, session_id: Uuid, new_token: &str) -> AppResult<Option<DeviceSession>> {
        self.sessions.touch(session_id, new_token).await
    }

    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        self.sessions.find_by_token(session_token).await
    }

    async fn touch_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        self.sessions.touch_by_token(session_token).await
    }

    async fn terminate(&self, session_id: Uuid, reason: TerminationReason) -> AppResult<bool> {
        self.sessions.terminate(session_id, reason).await
    }

    async fn terminate_all_by_credential(
        &self,
        credential_id: Uuid,
        reason: TerminationReason,
    ) -> AppResult<u64> {
        self.sessions
            .terminate_all_by_credential(credential_id, reason)
            .await
    }

    async fn find_stale(&self, stale_cutoff: DateTime<Utc>) -> AppResult<Vec<DeviceSession>> {
        self.sessions.find_stale(stale_cutoff).await
    }

    async fn purge_terminated_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        self.sessions.purge_terminated_before(cutoff).await
    }
}
