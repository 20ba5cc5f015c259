//! Cron scheduler for periodic maintenance tasks.

use std::sync::Arc;

use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{debug, error, info};

use classcast_admission::{AdmissionController, StaleSweeper};
use classcast_core::config::worker::WorkerConfig;
use classcast_core::error::AppError;
use classcast_core::result::AppResult;

/// Cron-based scheduler for periodic background tasks.
pub struct CronScheduler {
    /// The underlying job scheduler.
    scheduler: JobScheduler,
    /// Shared sweeper the jobs run against.
    sweeper: Arc<StaleSweeper>,
    /// Admission controller whose degraded-session backlog the reconcile
    /// job drains.
    admission: Arc<AdmissionController>,
    /// Cron expressions for each job.
    config: WorkerConfig,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler").finish()
    }
}

impl CronScheduler {
    /// Creates a new cron scheduler.
    pub async fn new(
        sweeper: Arc<StaleSweeper>,
        admission: Arc<AdmissionController>,
        config: WorkerConfig,
    ) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;
        Ok(Self {
            scheduler,
            sweeper,
            admission,
            config,
        })
    }

    /// Registers all maintenance tasks.
    pub async fn register_default_tasks(&self) -> AppResult<()> {
        self.register_stale_sweep().await?;
        self.register_count_reconcile().await?;
        self.register_retention_purge().await?;
        info!("All scheduled tasks registered");
        Ok(())
    }

    /// Starts the scheduler.
    pub async fn start(&self) -> AppResult<()> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;
        info!("Cron scheduler started");
        Ok(())
    }

    /// Shuts the scheduler down.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;
        info!("Cron scheduler shut down");
        Ok(())
    }

    /// Staleness sweep: terminates sessions idle past the TTL.
    async fn register_stale_sweep(&self) -> AppResult<()> {
        let sweeper = Arc::clone(&self.sweeper);
        let job = CronJob::new_async(self.config.sweep_cron.as_str(), move |_uuid, _lock| {
            let sweeper = Arc::clone(&sweeper);
            Box::pin(async move {
                debug!("Running staleness sweep");
                match sweeper.run_sweep().await {
                    Ok(swept) if swept > 0 => info!(swept, "Staleness sweep reclaimed sessions"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Staleness sweep failed"),
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create stale_sweep schedule: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add stale_sweep schedule: {e}")))?;
        info!(cron = %self.config.sweep_cron, "Registered: stale_sweep");
        Ok(())
    }

    /// Active-count reconcile: writes back sessions granted during a
    /// registry outage, then repairs cached counts left drifted by
    /// degraded-mode admissions.
    async fn register_count_reconcile(&self) -> AppResult<()> {
        let sweeper = Arc::clone(&self.sweeper);
        let admission = Arc::clone(&self.admission);
        let job = CronJob::new_async(self.config.reconcile_cron.as_str(), move |_uuid, _lock| {
            let sweeper = Arc::clone(&sweeper);
            let admission = Arc::clone(&admission);
            Box::pin(async move {
                debug!("Running count reconcile");
                match admission.flush_degraded().await {
                    Ok(restored) if restored > 0 => {
                        info!(restored, "Degraded-mode sessions made durable")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Degraded-session write-back failed"),
                }
                match sweeper.reconcile_counts().await {
                    Ok(reconciled) if reconciled > 0 => {
                        info!(reconciled, "Reconciled drifted active counts")
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Count reconcile failed"),
                }
            })
        })
        .map_err(|e| {
            AppError::internal(format!("Failed to create count_reconcile schedule: {e}"))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add count_reconcile schedule: {e}"))
        })?;
        info!(cron = %self.config.reconcile_cron, "Registered: count_reconcile");
        Ok(())
    }

    /// Retention purge: physically deletes terminated sessions past the
    /// audit retention window.
    async fn register_retention_purge(&self) -> AppResult<()> {
        let sweeper = Arc::clone(&self.sweeper);
        let job = CronJob::new_async(self.config.retention_cron.as_str(), move |_uuid, _lock| {
            let sweeper = Arc::clone(&sweeper);
            Box::pin(async move {
                debug!("Running retention purge");
                match sweeper.purge_expired().await {
                    Ok(purged) if purged > 0 => info!(purged, "Purged expired session records"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Retention purge failed"),
                }
            })
        })
        .map_err(|e| {
            AppError::internal(format!("Failed to create retention_purge schedule: {e}"))
        })?;

        self.scheduler.add(job).await.map_err(|e| {
            AppError::internal(format!("Failed to add retention_purge schedule: {e}"))
        })?;
        info!(cron = %self.config.retention_cron, "Registered: retention_purge");
        Ok(())
    }
}
