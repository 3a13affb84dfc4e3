//! EventHub server: license seat lifecycle and the background reaper.
//!
//! Main entry point that wires the crates together and runs until a
//! shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use eventhub_cloud::CloudProvider;
use eventhub_core::config::{AppConfig, LogFormat};
use eventhub_core::error::AppError;
use eventhub_core::traits::SystemClock;
use eventhub_database::{DatabasePool, PgSlotStore};
use eventhub_service::LicenseService;
use eventhub_worker::BackgroundScheduler;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("EVENTHUB_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    AppConfig::load(&config_path)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Pretty => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting EventHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Database connection ──────────────────────────────
    let db = DatabasePool::connect(&config.database).await?;
    db.verify_schema().await?;

    // ── Step 2: License service ──────────────────────────────────
    let store = Arc::new(PgSlotStore::new(db.pool().clone()));
    let license_service = Arc::new(LicenseService::new(store, Arc::new(SystemClock)));

    // ── Step 3: Cloud provider ───────────────────────────────────
    let cloud: Option<Arc<dyn CloudProvider>> = match &config.cloud {
        Some(cloud_config) => Some(eventhub_cloud::build_provider(cloud_config)?),
        None => {
            tracing::info!("Cloud provisioning disabled");
            None
        }
    };

    // ── Step 4: Background scheduler ─────────────────────────────
    let mut scheduler = BackgroundScheduler::new().await?;
    if config.license.reaper_enabled {
        scheduler
            .register_license_reaper(Arc::clone(&license_service))
            .await?;
    } else {
        tracing::warn!("License reaper disabled; expired seats will not be reclaimed");
    }
    scheduler.start().await?;

    tracing::info!(
        cloud = ?cloud.as_ref().map(|c| c.kind()),
        "EventHub running"
    );

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping background jobs...");

    scheduler.stop().await?;
    db.close().await;

    tracing::info!("EventHub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
