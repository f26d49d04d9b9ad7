use std::sync::Arc;

use anyhow::Context;
use testbed_core::clock::SystemClock;
use testbed_db::repositories::{PgAccountRepo, PgResourceRepo};
use testbed_leasing::{reaper, LeasingConfig};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "testbed_worker=debug,testbed_leasing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = LeasingConfig::from_env().context("Invalid configuration")?;

    let pool = testbed_db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    testbed_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    testbed_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    let cancel = CancellationToken::new();

    let reaper_task = if config.reaper_enabled {
        Some(tokio::spawn(reaper::run(
            Arc::new(PgAccountRepo::new(pool.clone())),
            Arc::new(PgResourceRepo::new(pool.clone())),
            Arc::new(SystemClock),
            config.reaper_interval,
            config.release_page_size,
            cancel.clone(),
        )))
    } else {
        tracing::info!("Lease reaper disabled (LEASE_REAPER_ENABLED=false)");
        None
    };

    tracing::info!("Worker running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    cancel.cancel();
    if let Some(task) = reaper_task {
        task.await.context("Lease reaper task panicked")?;
    }

    pool.close().await;
    tracing::info!("Worker stopped");
    Ok(())
}
