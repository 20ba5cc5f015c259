//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background maintenance worker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Cron expression for the stale-session sweep.
    #[serde(default = "default_sweep_cron")]
    pub sweep_cron: String,
    /// Cron expression for credential active-count reconciliation.
    #[serde(default = "default_reconcile_cron")]
    pub reconcile_cron: String,
    /// Cron expression for the terminated-session retention purge.
    #[serde(default = "default_retention_cron")]
    pub retention_cron: String,
    /// How many days terminated device sessions are retained for audit
    /// before the retention purge deletes them.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            sweep_cron: default_sweep_cron(),
            reconcile_cron: default_reconcile_cron(),
            retention_cron: default_retention_cron(),
            retention_days: default_retention_days(),
        }
    }
}

/// Every 15 minutes.
fn default_sweep_cron() -> String {
    "0 */15 * * * *".to_string()
}

/// Every 5 minutes.
fn default_reconcile_cron() -> String {
    "0 */5 * * * *".to_string()
}

/// Daily at 3 AM.
fn default_retention_cron() -> String {
    "0 0 3 * * *".to_string()
}

fn default_retention_days() -> u32 {
    90
}
