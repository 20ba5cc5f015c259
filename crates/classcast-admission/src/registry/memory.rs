//! In-memory session registry using a Tokio mutex for single-node
//! deployments and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use classcast_core::error::AppError;
use classcast_core::result::AppResult;
use classcast_entity::credential::{CreateCredential, Credential};
use classcast_entity::device::{DeviceSession, NewDeviceSession, TerminationReason};

use super::SessionRegistry;

/// Internal state for the memory-based registry.
#[derive(Debug, Default)]
struct InnerState {
    /// Credentials by id.
    credentials: HashMap<Uuid, Credential>,
    /// Device sessions by id.
    sessions: HashMap<Uuid, DeviceSession>,
    /// Session id by token.
    token_index: HashMap<String, Uuid>,
}

impl InnerState {
    fn live_for(&self, credential_id: Uuid, cutoff: DateTime<Utc>) -> Vec<DeviceSession> {
        let mut live: Vec<DeviceSession> = self
            .sessions
            .values()
            .filter(|s| {
                s.credential_id == credential_id && s.active && s.last_activity >= cutoff
            })
            .cloned()
            .collect();
        live.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then(b.created_at.cmp(&a.created_at))
        });
        live
    }

    fn insert_session(&mut self, data: &NewDeviceSession) -> DeviceSession {
        let now = Utc::now();
        let session = DeviceSession {
            id: Uuid::new_v4(),
            credential_id: data.credential_id,
            identity_key: data.identity_key.clone(),
            session_token: data.session_token.clone(),
            active: true,
            terminated_reason: TerminationReason::None,
            created_at: now,
            last_activity: now,
            terminated_at: None,
        };
        self.token_index
            .insert(session.session_token.clone(), session.id);
        self.sessions.insert(session.id, session.clone());
        session
    }

    /// Terminates any active row the requesting identity still holds under
    /// the credential. Admission only reaches an insert when no live row
    /// matched the identity, so anything reclaimed here had gone stale.
    fn reclaim_own_slot(&mut self, data: &NewDeviceSession) {
        let stale_ids: Vec<Uuid> = self
            .sessions
            .values()
            .filter(|s| {
                s.credential_id == data.credential_id
                    && s.identity_key == data.identity_key
                    && s.active
            })
            .map(|s| s.id)
            .collect();
        for id in stale_ids {
            self.terminate_session(id, TerminationReason::StaleExpired);
        }
    }

    fn terminate_session(&mut self, session_id: Uuid, reason: TerminationReason) -> bool {
        match self.sessions.get_mut(&session_id) {
            Some(s) if s.active => {
                s.active = false;
                s.terminated_reason = reason;
                s.terminated_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }
}

/// In-memory session registry.
///
/// Suitable for single-node deployments only; tests use it to exercise the
/// full admission semantics without a database.
#[derive(Debug, Default)]
pub struct MemorySessionRegistry {
    /// Protected inner state.
    state: Mutex<InnerState>,
}

impl MemorySessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/bootstrap helper: inserts a credential with a fixed id.
    pub async fn put_credential(&self, credential: Credential) {
        let mut state = self.state.lock().await;
        state.credentials.insert(credential.id, credential);
    }

    /// Test helper: rewinds a session's activity clock.
    pub async fn backdate_activity(&self, session_id: Uuid, last_activity: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(s) = state.sessions.get_mut(&session_id) {
            s.last_activity = last_activity;
        }
    }

    /// Test helper: rewinds a session's creation clock.
    pub async fn backdate_creation(&self, session_id: Uuid, created_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(s) = state.sessions.get_mut(&session_id) {
            s.created_at = created_at;
        }
    }

    /// Test helper: rewinds a session's termination clock.
    pub async fn backdate_termination(&self, session_id: Uuid, terminated_at: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        if let Some(s) = state.sessions.get_mut(&session_id) {
            s.terminated_at = Some(terminated_at);
        }
    }

    /// Test helper: fetches a session by id.
    pub async fn get_session(&self, session_id: Uuid) -> Option<DeviceSession> {
        let state = self.state.lock().await;
        state.sessions.get(&session_id).cloned()
    }
}

#[async_trait]
impl SessionRegistry for MemorySessionRegistry {
    async fn find_credential(&self, id: Uuid) -> AppResult<Option<Credential>> {
        let state = self.state.lock().await;
        Ok(state.credentials.get(&id).cloned())
    }

    async fn create_credential(&self, data: &CreateCredential) -> AppResult<Credential> {
        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            name: data.name.clone(),
            capacity: data.capacity,
            active: true,
            expires_at: data.expires_at,
            last_used_at: None,
            active_device_count: 0,
            created_at: now,
            updated_at: now,
        };
        let mut state = self.state.lock().await;
        state.credentials.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn list_credentials(&self) -> AppResult<Vec<Credential>> {
        let state = self.state.lock().await;
        let mut all: Vec<Credential> = state
            .credentials
            .values()
            .filter(|c| c.active)
            .cloned()
            .collect();
        all.sort_by_key(|c| c.created_at);
        Ok(all)
    }

    async fn update_capacity(
        &self,
        id: Uuid,
        new_capacity: i32,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Credential> {
        let mut state = self.state.lock().await;
        let usage = state.live_for(id, stale_cutoff).len() as i32;
        if new_capacity < usage {
            return Err(AppError::conflict(format!(
                "Cannot shrink capacity of credential {id} below its current usage"
            )));
        }
        let credential = state
            .credentials
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Credential {id} not found")))?;
        credential.capacity = new_capacity;
        credential.updated_at = Utc::now();
        Ok(credential.clone())
    }

    async fn deactivate_credential(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        let credential = state
            .credentials
            .get_mut(&id)
            .filter(|c| c.active)
            .ok_or_else(|| AppError::not_found(format!("Active credential {id} not found")))?;
        credential.active = false;
        credential.updated_at = Utc::now();
        Ok(())
    }

    async fn touch_credential_last_used(&self, id: Uuid) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(c) = state.credentials.get_mut(&id) {
            c.last_used_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn refresh_active_count(
        &self,
        id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<i64> {
        let mut state = self.state.lock().await;
        let count = state.live_for(id, stale_cutoff).len() as i64;
        if let Some(c) = state.credentials.get_mut(&id) {
            c.active_device_count = count as i32;
        }
        Ok(count)
    }

    async fn live_sessions(
        &self,
        credential_id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<DeviceSession>> {
        let state = self.state.lock().await;
        Ok(state.live_for(credential_id, stale_cutoff))
    }

    async fn insert_if_under_capacity(
        &self,
        data: &NewDeviceSession,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Option<DeviceSession>> {
        let mut state = self.state.lock().await;
        let capacity = state
            .credentials
            .get(&data.credential_id)
            .map(|c| c.capacity)
            .unwrap_or(0);
        if state.live_for(data.credential_id, stale_cutoff).len() as i32 >= capacity {
            return Ok(None);
        }
        state.reclaim_own_slot(data);
        Ok(Some(state.insert_session(data)))
    }

    async fn evict_and_insert(
        &self,
        evicted_id: Uuid,
        data: &NewDeviceSession,
    ) -> AppResult<Option<DeviceSession>> {
        let mut state = self.state.lock().await;
        if !state.terminate_session(evicted_id, TerminationReason::LimitExceededEvicted) {
            return Ok(None);
        }
        state.reclaim_own_slot(data);
        Ok(Some(state.insert_session(data)))
    }

    async fn restore_session(&self, session: &DeviceSession) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&session.id) {
            return Ok(false);
        }
        state.reclaim_own_slot(&NewDeviceSession {
            credential_id: session.credential_id,
            identity_key: session.identity_key.clone(),
            session_token: session.session_token.clone(),
        });
        state
            .token_index
            .insert(session.session_token.clone(), session.id);
        state.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn touch(&self, session_id: Uuid, new_token: &str) -> AppResult<Option<DeviceSession>> {
        let mut state = self.state.lock().await;
        let Some(old_token) = state
            .sessions
            .get(&session_id)
            .filter(|s| s.active)
            .map(|s| s.session_token.clone())
        else {
            return Ok(None);
        };
        state.token_index.remove(&old_token);
        state.token_index.insert(new_token.to_string(), session_id);
        let Some(session) = state.sessions.get_mut(&session_id) else {
            return Ok(None);
        };
        session.session_token = new_token.to_string();
        session.last_activity = Utc::now();
        Ok(Some(session.clone()))
    }

    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        let state = self.state.lock().await;
        Ok(state
            .token_index
            .get(session_token)
            .and_then(|id| state.sessions.get(id))
            .cloned())
    }

    async fn touch_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        let mut state = self.state.lock().await;
        let Some(id) = state.token_index.get(session_token).copied() else {
            return Ok(None);
        };
        match state.sessions.get_mut(&id) {
            Some(s) if s.active => {
                s.last_activity = Utc::now();
                Ok(Some(s.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn terminate(&self, session_id: Uuid, reason: TerminationReason) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        Ok(state.terminate_session(session_id, reason))
    }

    async fn terminate_all_by_credential(
        &self,
        credential_id: Uuid,
        reason: TerminationReason,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let ids: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| s.credential_id == credential_id && s.active)
            .map(|s| s.id)
            .collect();
        let mut terminated = 0u64;
        for id in ids {
            if state.terminate_session(id, reason) {
                terminated += 1;
            }
        }
        Ok(terminated)
    }

    async fn find_stale(&self, stale_cutoff: DateTime<Utc>) -> AppResult<Vec<DeviceSession>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .filter(|s| s.active && s.last_activity < stale_cutoff)
            .cloned()
            .collect())
    }

    async fn purge_terminated_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let ids: Vec<Uuid> = state
            .sessions
            .values()
            .filter(|s| !s.active && s.terminated_at.is_some_and(|at| at < cutoff))
            .map(|s| s.id)
            .collect();
        for id in &ids {
            if let Some(s) = state.sessions.remove(id) {
                state.token_index.remove(&s.session_token);
            }
        }
        Ok(ids.len() as u64)
    }
}
