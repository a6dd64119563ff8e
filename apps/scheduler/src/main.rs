use dotenv::dotenv;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clinic_scheduler::build_services;
use notification_cell::NotificationTicker;
use shared_config::AppConfig;
use shared_database::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,clinic_scheduler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting clinic scheduling core");

    let config = AppConfig::from_env();
    // Reference host: scheduling state is kept in process memory.
    let services = build_services(&config, Arc::new(MemoryStore::new())).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = if config.scheduler_enabled {
        NotificationTicker::new(&config, services.notifications.clone()).start(shutdown_rx)
    } else {
        warn!("SCHEDULER_ENABLED is false, notification ticks are disabled");
        Vec::new()
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    shutdown_tx.send(true)?;
    for handle in handles {
        handle.await?;
    }

    info!("Clinic scheduling core stopped");
    Ok(())
}
