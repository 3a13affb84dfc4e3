//! One-off reaper sweep.

use eventhub_core::error::AppError;
use eventhub_database::DatabasePool;

use crate::output;

/// Reclaim every expired seat once, outside the server's schedule.
pub async fn execute(db: &DatabasePool) -> Result<(), AppError> {
    let reclaimed = super::license_service(db).reap_expired_slots().await?;
    output::print_success(&format!("Reclaimed {reclaimed} expired seats"));
    Ok(())
}
