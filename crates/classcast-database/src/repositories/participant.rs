//! Participant and control-record repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use classcast_core::error::{AppError, ErrorKind};
use classcast_core::result::AppResult;
use classcast_entity::live::{ControlAction, ControlRecord, Participant};
use classcast_entity::role::ParticipantRole;

/// Repository for the append-only participant roster and control log.
#[derive(Debug, Clone)]
pub struct ParticipantRepository {
    pool: PgPool,
}

impl ParticipantRepository {
    /// Create a new participant repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append a roster record for a joining participant.
    pub async fn insert(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        role: ParticipantRole,
        display_name: &str,
    ) -> AppResult<Participant> {
        sqlx::query_as::<_, Participant>(
            "INSERT INTO participants (live_session_id, participant_key, role, display_name) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(live_session_id)
        .bind(participant_key)
        .bind(role)
        .bind(display_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(
                format!("Participant {participant_key} is already in the session"),
            ),
            _ => store_unavailable(e),
        })
    }

    /// Find the open roster record for a participant, if present.
    pub async fn find_open(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
    ) -> AppResult<Option<Participant>> {
        sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants \
             WHERE live_session_id = $1 AND participant_key = $2 AND left_at IS NULL",
        )
        .bind(live_session_id)
        .bind(participant_key)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Stamp the leave instant on an open record. Returns false when no
    /// open record existed (idempotent leave).
    pub async fn close(
        &self,
        live_session_id: Uuid,
        participant_key: &str,
        left_at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE participants SET left_at = $3 \
             WHERE live_session_id = $1 AND participant_key = $2 AND left_at IS NULL",
        )
        .bind(live_session_id)
        .bind(participant_key)
        .bind(left_at)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp the leave instant on every open record of a session (implicit
    /// leave when the session ends). Returns how many records were closed.
    pub async fn close_all(&self, live_session_id: Uuid, left_at: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE participants SET left_at = $2 \
             WHERE live_session_id = $1 AND left_at IS NULL",
        )
        .bind(live_session_id)
        .bind(left_at)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected())
    }

    /// Count open roster records for a session.
    pub async fn count_open(&self, live_session_id: Uuid) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM participants WHERE live_session_id = $1 AND left_at IS NULL",
        )
        .bind(live_session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// List the full roster of a session, join order.
    pub async fn list(&self, live_session_id: Uuid) -> AppResult<Vec<Participant>> {
        sqlx::query_as::<_, Participant>(
            "SELECT * FROM participants WHERE live_session_id = $1 ORDER BY joined_at",
        )
        .bind(live_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Append an immutable control-action record.
    pub async fn insert_control(
        &self,
        live_session_id: Uuid,
        issued_by: Uuid,
        target: &str,
        action: ControlAction,
    ) -> AppResult<ControlRecord> {
        sqlx::query_as::<_, ControlRecord>(
            "INSERT INTO control_records (live_session_id, issued_by, target, action) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(live_session_id)
        .bind(issued_by)
        .bind(target)
        .bind(action)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// List a session's control log in issue order.
    pub async fn list_controls(&self, live_session_id: Uuid) -> AppResult<Vec<ControlRecord>> {
        sqlx::query_as::<_, ControlRecord>(
            "SELECT * FROM control_records WHERE live_session_id = $1 ORDER BY issued_at",
        )
        .bind(live_session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)
    }
}

fn store_unavailable(e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, "Participant store error", e)
}
