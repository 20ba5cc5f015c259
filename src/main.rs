//! Classcast server.
//!
//! Entry point that wires the crates together: configuration, logging,
//! the database pool and migrations, the admission controller, the
//! live-session service, and the maintenance scheduler.

use std::sync::Arc;

use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, fmt};

use classcast_admission::{
    AdmissionController, LifecycleManager, LogNotifier, SessionRegistry, StaleSweeper,
};
use classcast_admission::registry::PostgresSessionRegistry;
use classcast_core::config::AppConfig;
use classcast_core::error::AppError;
use classcast_database::repositories::{
    CredentialRepository, DeviceSessionRepository, LiveSessionRepository, ParticipantRepository,
};
use classcast_database::DatabasePool;
use classcast_live::roster::PostgresRosterStore;
use classcast_live::LiveSessionService;
use classcast_worker::CronScheduler;

#[tokio::main]
async fn main() {
    let env = std::env::var("CLASSCAST_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging.
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().pretty().with_env_filter(filter).with_target(true).init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    info!("Starting Classcast v{}", env!("CARGO_PKG_VERSION"));

    info!("Connecting to database...");
    let db = DatabasePool::connect(&config.database).await?;

    info!("Running database migrations...");
    db.run_migrations().await?;

    let pool = db.pool().clone();
    let credential_repo = Arc::new(CredentialRepository::new(pool.clone()));
    let device_repo = Arc::new(DeviceSessionRepository::new(pool.clone()));
    let live_repo = Arc::new(LiveSessionRepository::new(pool.clone()));
    let participant_repo = Arc::new(ParticipantRepository::new(pool));

    let registry: Arc<dyn SessionRegistry> =
        Arc::new(PostgresSessionRegistry::new(credential_repo, device_repo));
    let admission = Arc::new(AdmissionController::new(
        Arc::clone(&registry),
        Arc::new(LogNotifier),
        config.admission.clone(),
    ));
    let lifecycle = LifecycleManager::new(Arc::clone(&registry), config.admission.clone());
    let roster = Arc::new(PostgresRosterStore::new(live_repo, participant_repo));
    let live_service = LiveSessionService::new(
        roster,
        Arc::clone(&registry),
        Arc::clone(&admission),
        config.live.clone(),
    );

    let credentials = lifecycle.list_credentials().await?;
    info!(credentials = credentials.len(), "Credential inventory loaded");
    for credential in &credentials {
        if let Ok(count) = live_service.active_device_count(credential.id).await {
            debug!(credential_id = %credential.id, active_devices = count, "Occupancy at boot");
        }
    }

    let sweeper = Arc::new(StaleSweeper::new(
        Arc::clone(&registry),
        &config.admission,
        &config.worker,
    ));
    let mut scheduler =
        CronScheduler::new(sweeper, Arc::clone(&admission), config.worker.clone()).await?;
    scheduler.register_default_tasks().await?;
    scheduler.start().await?;

    info!("Classcast is running; press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| AppError::internal(format!("Failed to listen for shutdown signal: {e}")))?;

    info!("Shutting down...");
    scheduler.shutdown().await?;
    db.close().await;
    info!("Shutdown complete");
    Ok(())
}
