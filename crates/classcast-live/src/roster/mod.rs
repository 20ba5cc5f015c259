//! Persistence seam for live sessions, participants, and the control log.

mod memory;
mod postgres;

pub use memory::MemoryRosterStore;
pub use postgres::PostgresRosterStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use classcast_core::result::AppResult;
use classcast_entity::live::{ControlAction, ControlRecord, LiveSession, LiveSettings, LiveStatus, Participant};
use classcast_entity::role::ParticipantRole;

/// Storage backend for the live-session state machine.
///
/// The service layer holds no state of its own; every read and
/// guarded write goes through this trait. Status transitions are
/// conditional on the current status so racing transitions cannot clobber
/// each other, and participant records are append-only (the only mutation
/// is stamping `left_at`).
#[async_trait]
pub trait RosterStore: Send + Sync {
    /// Fetches a live session by meeting id.
    async fn find_session(&self, id: Uuid) -> AppResult<Option<LiveSession>>;

    /// Fetches the non-terminal session for a credential, if one exists.
    async fn find_non_terminal_by_credential(
        &self,
        credential_id: Uuid,
    ) -> AppResult<Option<LiveSession>>;

    /// Creates a scheduled session. Fails with a conflict when the
    /// credential already has a non-terminal session.
    #[allow(clippy::too_many_arguments)]
    async fn create_session(
        &self,
        credential_id: Uuid,
        presenter_id: Uuid,
        title: &str,
        scheduled_start: DateTime<Utc>,
        max_participants: i32,
        settings: &LiveSettings,
    ) -> AppResult<LiveSession>;

    /// Moves the session from `from` to `to`. Returns false when the
    /// session was not in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: LiveStatus,
        to: LiveStatus,
    ) -> AppResult<bool>;

    /// Stamps the actual start instant, once.
    async fn set_started(&self, id: Uuid, started_at: DateTime<Utc>) -> AppResult<()>;

    /// Moves the session to a terminal status, stamping the end instant and
    /// duration. Returns false when the session was already terminal.
    async fn finish(
        &self,
        id: Uuid,
        status: LiveStatus,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> AppResult<bool>;

    /// Adjusts the cached participant count, returning the new value.
    async fn adjust_participant_count(&self, id: Uuid, delta: i32) -> AppResult<i32>;

    /// Appends a roster record. Fails with a conflict when the participant
    /// already has an open record in the session.
    async fn insert_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        role: ParticipantRole,
        display_name: &str,
    ) -> AppResult<Participant>;

    /// Finds the open roster record for a participant, if present.
    async fn find_open_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
    ) -> AppResult<Option<Participant>>;

    /// Stamps the leave instant on an open record. Returns false when no
    /// open record existed.
    async fn close_participant(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        left_at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Closes every open roster record in the session, returning how many.
    async fn close_all_participants(
        &self,
        live_session_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> AppResult<u64>;

    /// Lists a session's full roster history in join order.
    async fn list_participants(&self, live_session_id: Uuid) -> AppResult<Vec<Participant>>;

    /// Appends an immutable control-action record.
    async fn insert_control(
        &self,
        live_session_id: Uuid,
        issued_by: Uuid,
        target: &str,
        action: ControlAction,
    ) -> AppResult<ControlRecord>;

    /// Lists a session's control log in issue order.
    async fn list_controls(&self, live_session_id: Uuid) -> AppResult<Vec<ControlRecord>>;
}
