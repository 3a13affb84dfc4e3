//! Built-in periodic job implementations.

pub mod license;

use async_trait::async_trait;

use eventhub_core::error::AppError;

pub use license::{LicenseReaperJob, REAP_INTERVAL};

/// A unit of work the scheduler runs on a fixed cadence.
#[async_trait]
pub trait PeriodicJob: Send + Sync + std::fmt::Debug {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    /// Run one pass. Returns how many items were processed.
    async fn run(&self) -> Result<u64, AppError>;
}
