use fal_image_jobs::{
    config::AppConfig,
    db::{self, PgJobStore},
    services::{generation::GenerationService, provider::FalClient},
};
use std::sync::Arc;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting generation reconcile worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let provider = FalClient::new(&config.fal_base_url, config.provider_timeout())
        .expect("Failed to initialize fal.ai client");

    let generation = GenerationService::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(provider),
        config.api_key(),
    );

    let interval = config.reconcile_interval();
    tracing::info!(
        interval_secs = interval.as_secs(),
        "Worker ready, starting reconciliation loop"
    );

    loop {
        tokio::select! {
            _ = run_pass(&generation) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping worker");
                break;
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown signal received, stopping worker");
                break;
            }
        }
    }
}

/// One reconciliation pass. Errors are logged; the next tick tries again.
async fn run_pass(generation: &GenerationService) {
    match generation.reconcile().await {
        Ok(report) if report.any_updated || report.images_inserted > 0 => {
            tracing::info!(
                polled = report.polled,
                transitioned = report.transitioned,
                images_inserted = report.images_inserted,
                skipped = report.skipped,
                "Reconciliation pass updated jobs"
            );
        }
        Ok(report) => {
            tracing::trace!(polled = report.polled, skipped = report.skipped, "Nothing changed");
        }
        Err(e) => {
            tracing::error!(error = %e, "Reconciliation pass failed, will retry");
        }
    }
}
