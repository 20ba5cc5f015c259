//! Device session repository implementation.
//!
//! Admission-critical writes here are transactional: the evict-and-insert
//! pair commits atomically, and the capacity-checked insert is a single
//! conditional statement, so a crash or lost connection can never leave a
//! half-admitted device behind.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use classcast_core::error::{AppError, ErrorKind};
use classcast_core::result::AppResult;
use classcast_entity::device::{DeviceSession, NewDeviceSession, TerminationReason};

/// Repository for device session persistence and admission writes.
#[derive(Debug, Clone)]
pub struct DeviceSessionRepository {
    pool: PgPool,
}

impl DeviceSessionRepository {
    /// Create a new device session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a session by its token, regardless of active state.
    pub async fn find_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions WHERE session_token = $1",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// List the active, non-stale sessions for a credential, most recently
    /// active first. This is the working set every admission decision is
    /// made against.
    pub async fn find_live_by_credential(
        &self,
        credential_id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<DeviceSession>> {
        sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions \
             WHERE credential_id = $1 AND active = TRUE AND last_activity >= $2 \
             ORDER BY last_activity DESC, created_at DESC",
        )
        .bind(credential_id)
        .bind(stale_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Count active, non-stale sessions for a credential.
    pub async fn count_live_by_credential(
        &self,
        credential_id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM device_sessions \
             WHERE credential_id = $1 AND active = TRUE AND last_activity >= $2",
        )
        .bind(credential_id)
        .bind(stale_cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Insert a new session only if the credential's live count is still
    /// under its capacity. Returns `None` when the conditional write found
    /// the credential full, in which case the caller falls through to the
    /// eviction path.
    ///
    /// A stale row the requester left behind no longer counts toward
    /// capacity but still holds the active-identity unique slot, so it is
    /// terminated in the same transaction before the insert.
    pub async fn insert_if_under_capacity(
        &self,
        data: &NewDeviceSession,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Option<DeviceSession>> {
        let mut tx = self.pool.begin().await.map_err(store_unavailable)?;

        reclaim_own_slot(&mut tx, data).await?;

        let created = sqlx::query_as::<_, DeviceSession>(
            "INSERT INTO device_sessions (credential_id, identity_key, session_token) \
             SELECT $1, $2, $3 \
             WHERE ( \
                 SELECT COUNT(*) FROM device_sessions \
                 WHERE credential_id = $1 AND active = TRUE AND last_activity >= $4 \
             ) < (SELECT capacity FROM credentials WHERE id = $1) \
             RETURNING *",
        )
        .bind(data.credential_id)
        .bind(&data.identity_key)
        .bind(&data.session_token)
        .bind(stale_cutoff)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        tx.commit().await.map_err(store_unavailable)?;
        Ok(created)
    }

    /// Durably records a session that was granted while the store was
    /// unreachable. Replaying an already-recorded session is a no-op.
    pub async fn restore(&self, session: &DeviceSession) -> AppResult<bool> {
        let mut tx = self.pool.begin().await.map_err(store_unavailable)?;

        let slot = NewDeviceSession {
            credential_id: session.credential_id,
            identity_key: session.identity_key.clone(),
            session_token: session.session_token.clone(),
        };
        reclaim_own_slot(&mut tx, &slot).await?;

        let result = sqlx::query(
            "INSERT INTO device_sessions \
             (id, credential_id, identity_key, session_token, created_at, last_activity) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT DO NOTHING",
        )
        .bind(session.id)
        .bind(session.credential_id)
        .bind(&session.identity_key)
        .bind(&session.session_token)
        .bind(session.created_at)
        .bind(session.last_activity)
        .execute(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        tx.commit().await.map_err(store_unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Atomically terminate the displaced session and insert the new one.
    ///
    /// The eviction update is conditional on the victim still being active;
    /// when a concurrent operation already terminated it, the whole
    /// transaction rolls back and the caller re-reads the working set.
    pub async fn evict_and_insert(
        &self,
        evicted_id: Uuid,
        data: &NewDeviceSession,
    ) -> AppResult<Option<DeviceSession>> {
        let mut tx = self.pool.begin().await.map_err(store_unavailable)?;

        reclaim_own_slot(&mut tx, data).await?;

        let evicted = sqlx::query(
            "UPDATE device_sessions \
             SET active = FALSE, terminated_reason = 'limit_exceeded_evicted', \
                 terminated_at = NOW() \
             WHERE id = $1 AND active = TRUE",
        )
        .bind(evicted_id)
        .execute(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        if evicted.rows_affected() == 0 {
            tx.rollback().await.map_err(store_unavailable)?;
            return Ok(None);
        }

        let created = sqlx::query_as::<_, DeviceSession>(
            "INSERT INTO device_sessions (credential_id, identity_key, session_token) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(data.credential_id)
        .bind(&data.identity_key)
        .bind(&data.session_token)
        .fetch_one(&mut *tx)
        .await
        .map_err(store_unavailable)?;

        tx.commit().await.map_err(store_unavailable)?;
        Ok(Some(created))
    }

    /// Refresh a session's activity instant and rotate its token (reuse
    /// path). Returns the refreshed session, or `None` if it is no longer
    /// active.
    pub async fn touch(
        &self,
        session_id: Uuid,
        new_token: &str,
    ) -> AppResult<Option<DeviceSession>> {
        sqlx::query_as::<_, DeviceSession>(
            "UPDATE device_sessions \
             SET last_activity = NOW(), session_token = $2 \
             WHERE id = $1 AND active = TRUE RETURNING *",
        )
        .bind(session_id)
        .bind(new_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Refresh a session's activity instant by token (heartbeat path).
    /// Only active sessions accept heartbeats.
    pub async fn touch_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>> {
        sqlx::query_as::<_, DeviceSession>(
            "UPDATE device_sessions SET last_activity = NOW() \
             WHERE session_token = $1 AND active = TRUE RETURNING *",
        )
        .bind(session_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Terminate a single session with the given reason.
    pub async fn terminate(&self, session_id: Uuid, reason: TerminationReason) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE device_sessions \
             SET active = FALSE, terminated_reason = $2, terminated_at = NOW() \
             WHERE id = $1 AND active = TRUE",
        )
        .bind(session_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected() > 0)
    }

    /// Terminate every active session under a credential (credential
    /// deactivation). Returns how many sessions were force-expired.
    pub async fn terminate_all_by_credential(
        &self,
        credential_id: Uuid,
        reason: TerminationReason,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE device_sessions \
             SET active = FALSE, terminated_reason = $2, terminated_at = NOW() \
             WHERE credential_id = $1 AND active = TRUE",
        )
        .bind(credential_id)
        .bind(reason)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected())
    }

    /// Find sessions whose last activity predates the staleness cutoff.
    pub async fn find_stale(&self, stale_cutoff: DateTime<Utc>) -> AppResult<Vec<DeviceSession>> {
        sqlx::query_as::<_, DeviceSession>(
            "SELECT * FROM device_sessions \
             WHERE active = TRUE AND last_activity < $1",
        )
        .bind(stale_cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Physically delete terminated sessions older than the retention
    /// cutoff. The only place device session rows are ever deleted.
    pub async fn purge_terminated_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let result = sqlx::query(
            "DELETE FROM device_sessions \
             WHERE active = FALSE AND terminated_at IS NOT NULL AND terminated_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(result.rows_affected())
    }
}

/// Terminates any active row the requesting identity still holds under the
/// credential, freeing the `(credential_id, identity_key) WHERE active`
/// unique slot for the insert that follows. Admission only reaches an
/// insert when no live (non-stale) row matched the identity, so any row
/// reclaimed here had already gone stale.
async fn reclaim_own_slot(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    data: &NewDeviceSession,
) -> AppResult<()> {
    sqlx::query(
        "UPDATE device_sessions \
         SET active = FALSE, terminated_reason = 'stale_expired', terminated_at = NOW() \
         WHERE credential_id = $1 AND identity_key = $2 AND active = TRUE",
    )
    .bind(data.credential_id)
    .bind(&data.identity_key)
    .execute(&mut **tx)
    .await
    .map_err(store_unavailable)?;
    Ok(())
}

fn store_unavailable(e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, "Device session store error", e)
}
