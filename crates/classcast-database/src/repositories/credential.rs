//! Credential repository implementation.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use classcast_core::error::{AppError, ErrorKind};
use classcast_core::result::AppResult;
use classcast_entity::credential::{CreateCredential, Credential};

/// Repository for credential CRUD and occupancy bookkeeping.
#[derive(Debug, Clone)]
pub struct CredentialRepository {
    pool: PgPool,
}

impl CredentialRepository {
    /// Create a new credential repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a credential by ID.
    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Credential>> {
        sqlx::query_as::<_, Credential>("SELECT * FROM credentials WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_unavailable)
    }

    /// List all active credentials.
    pub async fn find_all_active(&self) -> AppResult<Vec<Credential>> {
        sqlx::query_as::<_, Credential>(
            "SELECT * FROM credentials WHERE active = TRUE ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Create a new credential.
    pub async fn create(&self, data: &CreateCredential) -> AppResult<Credential> {
        sqlx::query_as::<_, Credential>(
            "INSERT INTO credentials (name, capacity, expires_at) \
             VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(&data.name)
        .bind(data.capacity)
        .bind(data.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)
    }

    /// Change a credential's capacity.
    ///
    /// The update is conditional on the new capacity not undercutting the
    /// current live usage, so capacity can never shrink below the number of
    /// devices already admitted.
    pub async fn update_capacity(
        &self,
        id: Uuid,
        new_capacity: i32,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Credential> {
        let updated = sqlx::query_as::<_, Credential>(
            "UPDATE credentials SET capacity = $2, updated_at = NOW() \
             WHERE id = $1 AND $2 >= ( \
                 SELECT COUNT(*) FROM device_sessions \
                 WHERE credential_id = $1 AND active = TRUE AND last_activity >= $3 \
             ) RETURNING *",
        )
        .bind(id)
        .bind(new_capacity)
        .bind(stale_cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_unavailable)?;

        updated.ok_or_else(|| {
            AppError::conflict(format!(
                "Cannot shrink capacity of credential {id} below its current usage"
            ))
        })
    }

    /// Soft-delete a credential.
    pub async fn deactivate(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE credentials SET active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(store_unavailable)?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!(
                "Active credential {id} not found"
            )));
        }
        Ok(())
    }

    /// Stamp the last-used instant.
    pub async fn touch_last_used(&self, id: Uuid) -> AppResult<()> {
        sqlx::query("UPDATE credentials SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_unavailable)?;
        Ok(())
    }

    /// Recompute the cached active-device count from the session table.
    pub async fn refresh_active_count(
        &self,
        id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "UPDATE credentials SET active_device_count = ( \
                 SELECT COUNT(*) FROM device_sessions \
                 WHERE credential_id = $1 AND active = TRUE AND last_activity >= $2 \
             ), updated_at = NOW() \
             WHERE id = $1 RETURNING active_device_count",
        )
        .bind(id)
        .bind(stale_cutoff)
        .fetch_one(&self.pool)
        .await
        .map_err(store_unavailable)?;
        Ok(count)
    }
}

fn store_unavailable(e: sqlx::Error) -> AppError {
    AppError::with_source(ErrorKind::StoreUnavailable, "Credential store error", e)
}
