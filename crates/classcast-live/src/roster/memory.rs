//! In-memory roster store for tests and single-node deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use classcast_core::error::AppError;
use classcast_core::result::AppResult;
use classcast_entity::live::{
    ControlAction, ControlRecord, LiveSession, LiveSettings, LiveStatus, Participant,
};
use classcast_entity::role::ParticipantRole;

use super::RosterStore;

#[derive(Debug, Default)]
struct InnerState {
    sessions: HashMap<Uuid, LiveSession>,
    participants: Vec<Participant>,
    controls: Vec<ControlRecord>,
}

/// Roster store backed by process memory.
///
/// Mirrors the Postgres store's conditional-write semantics under a single
/// mutex, including the one-non-terminal-session-per-credential and
/// one-open-record-per-participant constraints the database enforces with
/// partial unique indexes.
#[derive(Debug, Default)]
pub struct MemoryRosterStore {
    state: Mutex<InnerState>,
}

impl MemoryRosterStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RosterStore for MemoryRosterStore {
    async fn find_session(&self, id: Uuid) -> AppResult<Option<LiveSession>> {
        let state = self.state.lock().await;
        Ok(state.sessions.get(&id).cloned())
    }

    async fn find_non_terminal_by_credential(
        &self,
        credential_id: Uuid,
    ) -> AppResult<Option<LiveSession>> {
        let state = self.state.lock().await;
        Ok(state
            .sessions
            .values()
            .find(|s| s.credential_id == credential_id && !s.is_terminal())
            .cloned())
    }

    async fn create_session(
        &self,
        credential_id: Uuid,
        presenter_id: Uuid,
        title: &str,
        scheduled_start: DateTime<Utc>,
        max_participants: i32,
        settings: &LiveSettings,
    ) -> AppResult<LiveSession> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .sessions
            .values()
            .find(|s| s.credential_id == credential_id && !s.is_terminal())
        {
            return Err(AppError::conflict(
                "A live session is already running for this credential",
            )
            .with_conflicting_id(existing.id));
        }
        let session = LiveSession {
            id: Uuid::new_v4(),
            credential_id,
            presenter_id,
            title: title.to_string(),
            status: LiveStatus::Scheduled,
            scheduled_start,
            started_at: None,
            ended_at: None,
            duration_seconds: None,
            max_participants,
            participant_count: 0,
            settings: settings.clone(),
            created_at: Utc::now(),
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: LiveStatus,
        to: LiveStatus,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&id) {
            Some(s) if s.status == from => {
                s.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_started(&self, id: Uuid, started_at: DateTime<Utc>) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if let Some(s) = state.sessions.get_mut(&id) {
            if s.started_at.is_none() {
                s.started_at = Some(started_at);
            }
        }
        Ok(())
    }

    async fn finish(
        &self,
        id: Uuid,
        status: LiveStatus,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        match state.sessions.get_mut(&id) {
            Some(s) if !s.is_terminal() => {
                s.status = status;
                s.ended_at = Some(ended_at);
                s.duration_seconds = Some(duration_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn adjust_participant_count(&self, id: Uuid, delta: i32) -> AppResult<i32> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found("No such live session"))?;
        session.participant_count = (session.participant_count + delta).max(0);
        Ok(session.participant_count)
    }

    async fn insert_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        role: ParticipantRole,
        display_name: &str,
    ) -> AppResult<Participant> {
        let mut state = self.state.lock().await;
        let already_open = state.participants.iter().any(|p| {
            p.live_session_id == live_session_id
                && p.participant_key == participant_key
                && p.is_present()
        });
        if already_open {
            return Err(AppError::conflict(format!(
                "Participant {participant_key} is already in the session"
            )));
        }
        let participant = Participant {
            id: Uuid::new_v4(),
            live_session_id,
            participant_key: participant_key.to_string(),
            role,
            display_name: display_name.to_string(),
            joined_at: Utc::now(),
            left_at: None,
        };
        state.participants.push(participant.clone());
        Ok(participant)
    }

    async fn find_open_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
    ) -> AppResult<Option<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .find(|p| {
                p.live_session_id == live_session_id
                    && p.participant_key == participant_key
                    && p.is_present()
            })
            .cloned())
    }

    async fn close_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        left_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        for p in state.participants.iter_mut() {
            if p.live_session_id == live_session_id
                && p.participant_key == participant_key
                && p.is_present()
            {
                p.left_at = Some(left_at);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn close_all_participants(
        &self,
        live_session_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut state = self.state.lock().await;
        let mut closed = 0u64;
        for p in state.participants.iter_mut() {
            if p.live_session_id == live_session_id && p.is_present() {
                p.left_at = Some(left_at);
                closed += 1;
            }
        }
        Ok(closed)
    }

    async fn list_participants(&self, live_session_id: Uuid) -> AppResult<Vec<Participant>> {
        let state = self.state.lock().await;
        Ok(state
            .participants
            .iter()
            .filter(|p| p.live_session_id == live_session_id)
            .cloned()
            .collect())
    }

    async fn insert_control(
        &self,
        live_session_id: Uuid,
        issued_by: Uuid,
        target: &str,
        action: ControlAction,
    ) -> AppResult<ControlRecord> {
        let mut state = self.state.lock().await;
        let record = ControlRecord {
            id: Uuid::new_v4(),
            live_session_id,
            issued_by,
            target: target.to_string(),
            action,
            issued_at: Utc::now(),
        };
        state.controls.push(record.clone());
        Ok(record)
    }

    async fn list_controls(&self, live_session_id: Uuid) -> AppResult<Vec<ControlRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .controls
            .iter()
            .filter(|c| c.live_session_id == live_session_id)
            .cloned()
            .collect())
    }
}
