//! Session registry seam.
//!
//! The registry is the durable store of credentials and device sessions.
//! Two backends exist:
//! - `MemorySessionRegistry` — mutex-guarded in-memory state for single-node
//!   deployments and tests
//! - `PostgresSessionRegistry` — sqlx repositories with transactional
//!   admission writes

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use classcast_core::result::AppResult;
use classcast_entity::credential::{CreateCredential, Credential};
use classcast_entity::device::{DeviceSession, NewDeviceSession, TerminationReason};

pub use memory::MemorySessionRegistry;
pub use postgres::PostgresSessionRegistry;

/// Durable store of credentials and device sessions.
///
/// Implementations must be thread-safe. The admission controller serializes
/// calls per credential; implementations additionally make the
/// capacity-checked insert and the evict-and-insert pair individually
/// atomic so a crash mid-operation cannot overshoot capacity.
#[async_trait]
pub trait SessionRegistry: Send + Sync + std::fmt::Debug {
    /// Looks up a credential.
    async fn find_credential(&self, id: Uuid) -> AppResult<Option<Credential>>;

    /// Creates a credential.
    async fn create_credential(&self, data: &CreateCredential) -> AppResult<Credential>;

    /// Lists all active credentials.
    async fn list_credentials(&self) -> AppResult<Vec<Credential>>;

    /// Changes a credential's capacity, refusing to shrink it below the
    /// current live usage.
    async fn update_capacity(
        &self,
        id: Uuid,
        new_capacity: i32,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Credential>;

    /// Soft-deletes a credential.
    async fn deactivate_credential(&self, id: Uuid) -> AppResult<()>;

    /// Stamps a credential's last-used instant.
    async fn touch_credential_last_used(&self, id: Uuid) -> AppResult<()>;

    /// Recomputes a credential's cached active-device count and returns it.
    async fn refresh_active_count(
        &self,
        id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<i64>;

    /// Lists the active, non-stale sessions for a credential, most recently
    /// active first (ties by most recent creation).
    async fn live_sessions(
        &self,
        credential_id: Uuid,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<DeviceSession>>;

    /// Inserts a session only while the credential remains under capacity.
    /// Returns `None` when the credential was full at commit time.
    async fn insert_if_under_capacity(
        &self,
        data: &NewDeviceSession,
        stale_cutoff: DateTime<Utc>,
    ) -> AppResult<Option<DeviceSession>>;

    /// Atomically terminates the displaced session (reason
    /// `limit_exceeded_evicted`) and inserts the new one. Returns `None`
    /// when the victim was no longer active, leaving the store unchanged.
    async fn evict_and_insert(
        &self,
        evicted_id: Uuid,
        data: &NewDeviceSession,
    ) -> AppResult<Option<DeviceSession>>;

    /// Makes a session that was granted during a registry outage durable.
    /// Replaying an already-recorded session is a no-op; returns whether a
    /// row was written.
    async fn restore_session(&self, session: &DeviceSession) -> AppResult<bool>;

    /// Refreshes a session's activity and rotates its token (reuse path).
    async fn touch(&self, session_id: Uuid, new_token: &str) -> AppResult<Option<DeviceSession>>;

    /// Finds a session by its token regardless of state.
    async fn find_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>>;

    /// Refreshes a session's activity by token; only active sessions
    /// accept the refresh.
    async fn touch_by_token(&self, session_token: &str) -> AppResult<Option<DeviceSession>>;

    /// Terminates a session with the given reason. Returns whether the
    /// session was active.
    async fn terminate(&self, session_id: Uuid, reason: TerminationReason) -> AppResult<bool>;

    /// Terminates every active session under a credential.
    async fn terminate_all_by_credential(
        &self,
        credential_id: Uuid,
        reason: TerminationReason,
    ) -> AppResult<u64>;

    /// Finds active sessions idle past the staleness cutoff.
    async fn find_stale(&self, stale_cutoff: DateTime<Utc>) -> AppResult<Vec<DeviceSession>>;

    /// Deletes terminated sessions older than the retention cutoff.
    async fn purge_terminated_before(&self, cutoff: DateTime<Utc>) -> AppResult<u64>;
}
