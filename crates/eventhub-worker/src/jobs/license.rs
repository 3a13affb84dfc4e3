//! Expired license seat reaper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, info};

use eventhub_core::error::AppError;
use eventhub_service::license::LicenseService;

use super::PeriodicJob;

/// Fixed reaper cadence, measured from scheduler start.
pub const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Reclaims license seats whose TTL has elapsed.
#[derive(Debug, Clone)]
pub struct LicenseReaperJob {
    /// License service that owns the slot transitions.
    service: Arc<LicenseService>,
}

impl LicenseReaperJob {
    /// Create a new reaper job.
    pub fn new(service: Arc<LicenseService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PeriodicJob for LicenseReaperJob {
    fn name(&self) -> &'static str {
        "license_reaper"
    }

    async fn run(&self) -> Result<u64, AppError> {
        let started = Instant::now();
        let reclaimed = self.service.reap_expired_slots().await?;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if reclaimed > 0 {
            info!(reclaimed, elapsed_ms, "Reclaimed expired license seats");
        } else {
            debug!(elapsed_ms, "No expired license seats");
        }

        Ok(reclaimed)
    }
}
