//! Postgres-backed roster store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use classcast_core::result::AppResult;
use classcast_database::repositories::{LiveSessionRepository, ParticipantRepository};
use classcast_entity::live::{
    ControlAction, ControlRecord, LiveSession, LiveSettings, LiveStatus, Participant,
};
use classcast_entity::role::ParticipantRole;

use super::RosterStore;

/// Roster store backed by the `live_sessions`, `participants`, and
/// `control_records` tables. Partial unique indexes enforce the
/// one-non-terminal-session and one-open-record constraints at the
/// database, so concurrent writers from multiple nodes stay consistent.
#[derive(Debug, Clone)]
pub struct PostgresRosterStore {
    sessions: Arc<LiveSessionRepository>,
    participants: Arc<ParticipantRepository>,
}

impl PostgresRosterStore {
    /// Creates a store over the given repositories.
    pub fn new(
        sessions: Arc<LiveSessionRepository>,
        participants: Arc<ParticipantRepository>,
    ) -> Self {
        Self {
            sessions,
            participants,
        }
    }
}

#[async_trait]
impl RosterStore for PostgresRosterStore {
    async fn find_session(&self, id: Uuid) -> AppResult<Option<LiveSession>> {
        self.sessions.find_by_id(id).await
    }

    async fn find_non_terminal_by_credential(
        &self,
        credential_id: Uuid,
    ) -> AppResult<Option<LiveSession>> {
        self.sessions
            .find_non_terminal_by_credential(credential_id)
            .await
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
        self.sessions
            .create(
                credential_id,
                presenter_id,
                title,
                scheduled_start,
                max_participants,
                settings,
            )
            .await
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: LiveStatus,
        to: LiveStatus,
    ) -> AppResult<bool> {
        self.sessions.transition_status(id, from, to).await
    }

    async fn set_started(&self, id: Uuid, started_at: DateTime<Utc>) -> AppResult<()> {
        self.sessions.set_started(id, started_at).await
    }

    async fn finish(
        &self,
        id: Uuid,
        status: LiveStatus,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> AppResult<bool> {
        self.sessions
            .finish(id, status, ended_at, duration_seconds)
            .await
    }

    async fn adjust_participant_count(&self, id: Uuid, delta: i32) -> AppResult<i32> {
        self.sessions.adjust_participant_count(id, delta).await
    }

    async fn insert_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        role: ParticipantRole,
        display_name: &str,
    ) -> AppResult<Participant> {
        self.participants
            .insert(live_session_id, participant_key, role, display_name)
            .await
    }

    async fn find_open_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
    ) -> AppResult<Option<Participant>> {
        self.participants
            .find_open(live_session_id, participant_key)
            .await
    }

    async fn close_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        left_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.participants
            .close(live_session_id, participant_key, left_at)
            .await
    }

    async fn close_all_participants(
        &self,
        live_session_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> AppResult<u64> {
        self.participants.close_all(live_session_id, left_at).await
    }

    async fn list_participants(&self, live_session_id: Uuid) -> AppResult<Vec<Participant>> {
        self.participants.list(live_session_id).await
    }

    async fn insert_control(
        &self,
        live_session_id: Uuid,
        issued_by: Uuid,
        target: &str,
        action: ControlAction,
    ) -> AppResult<ControlRecord> {
        self.participants
            .insert_control(live_session_id, issued_by, target, action)
            .await
    }

    async fn list_controls(&self, live_session_id: Uuid) -> AppResult<Vec<ControlRecord>> {
        self.participants.list_controls(live_session_id).await
    }
}
