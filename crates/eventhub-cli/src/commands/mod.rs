//! CLI command definitions and dispatch.

pub mod product;
pub mod reap;
pub mod slot;
pub mod usage;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use crate::output::OutputFormat;
use eventhub_core::config::AppConfig;
use eventhub_core::error::AppError;
use eventhub_core::traits::SystemClock;
use eventhub_database::{DatabasePool, PgSlotStore};
use eventhub_service::LicenseService;

/// EventHub license administration
#[derive(Debug, Parser)]
#[command(name = "eventhub", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// License product management
    Product(product::ProductArgs),
    /// License slot inspection and release
    Slot(slot::SlotArgs),
    /// Seat usage of one product
    Usage(usage::UsageArgs),
    /// Run one reaper sweep now
    Reap,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let config = load_config(&self.config)?;
        let db = DatabasePool::connect(&config.database).await?;

        let result = match &self.command {
            Commands::Product(args) => product::execute(args, &db, &config, self.format).await,
            Commands::Slot(args) => slot::execute(args, &db, self.format).await,
            Commands::Usage(args) => usage::execute(args, &db, self.format).await,
            Commands::Reap => reap::execute(&db).await,
        };

        db.close().await;
        result
    }
}

/// Helper: load configuration from file
pub fn load_config(config_path: &str) -> Result<AppConfig, AppError> {
    AppConfig::load(config_path)
}

/// Helper: build the license service over the PostgreSQL store
pub fn license_service(db: &DatabasePool) -> LicenseService {
    LicenseService::new(
        Arc::new(PgSlotStore::new(db.pool().clone())),
        Arc::new(SystemClock),
    )
}
