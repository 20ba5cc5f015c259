//! Live session repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use classcast_core::error::{AppError, ErrorKind};
use classcast_core::result::AppResult;
use classcast_entity::live::{LiveSession, LiveSettings, LiveStatus};

/// Repository for live session persistence.
#[derive(Debug, Clone)]
pub struct LiveSessionRepository {
    pool: PgPool,
}

impl LiveSessionRepository {
    /// Create a new live session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a live session by meeting ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<LiveSession>> {
        sqlx::query_as::<_, LiveSession>("SELECT * FROM live_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_unavailable)
    }

    /// Find the non-terminal live session for a credential, if any.
    pub async fn find_non_terminal_by_credential(
        &self,
        credential_id: Uuid,
    ) -> AppResult<Option<LiveSession>> {
        sqlx::query_as::<_, LiveSession>(
            "SELECT * FROM live_sessions \
             WHERE credential_id = $1 AND status NOT IN ('ended', 'cancelled')",
        )
        .bind(credential_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Create a live session in `scheduled` state.
    ///
    /// The partial unique index on non-terminal sessions turns a concurrent
    /// double-start into a unique violation, surfaced as a conflict.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        &self,
        credential_id: Uuid,
        presenter_id: Uuid,
        title: &str,
        scheduled_start: DateTime<Utc>,
        max_participants: i32,
        settings: &LiveSettings,
    ) -> AppResult<LiveSession> {
        sqlx::query_as::<_, LiveSession>(
            "INSERT INTO live_sessions \
             (credential_id, presenter_id, title, scheduled_start, max_participants, settings) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
        )
        .bind(credential_id)
        .bind(presenter_id)
        .bind(title)
        .bind(scheduled_start)
        .bind(max_participants)
        .bind(sqlx::types::Json(settings))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(
                "A live session is already running for this credential",
            ),
            _ => store_unavailable(e),
        })
    }

    /// Update session status, conditional on the current status so racing
    /// transitions cannot clobber each other.
    pub async fn transition_status(
        &self,
        id: Uuid,
        from: LiveStatus,
        to: LiveStatus,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE live_sessions SET status = $3 WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Stamp the actual start instant.
    pub async fn set_started(&self, id: Uuid, started_at: DateTime<Utc>) -> AppResult<()> {
        sqlx::query(
            "UPDATE live_sessions SET started_at = $2 WHERE id = $1 AND started_at IS NULL",
        )
        .bind(id)
        .bind(started_at)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(())
    }

    /// Move the session to a terminal state, stamping the end instant and
    /// duration.
    pub async fn finish(
        &self,
        id: Uuid,
        status: LiveStatus,
        ended_at: DateTime<Utc>,
        duration_seconds: i64,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE live_sessions \
             SET status = $2, ended_at = $3, duration_seconds = $4 \
             WHERE id = $1 AND status NOT IN ('ended', 'cancelled')",
        )
        .bind(id)
        .bind(status)
        .bind(ended_at)
        .bind(duration_seconds)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Adjust the cached participant count, returning the new value.
    pub async fn adjust_participant_count(&self, id: Uuid, delta: i32) -> AppResult<i32> {
        sqlx::query_scalar(
            "UPDATE live_sessions \
             SET participant_count = GREATEST(participant_count + $2, 0) \
             WHERE id = $1 RETURNING participant_count",
        )
        .bind(id)
        .bind(delta)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)
    }
}

fn store_unavailable(e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, "Live session store error", e)
}
