//! Seat usage CLI command.

use clap::Args;

use crate::output::{self, OutputFormat};
use eventhub_core::error::AppError;
use eventhub_core::types::ProductId;
use eventhub_database::DatabasePool;

/// Arguments for the usage command
#[derive(Debug, Args)]
pub struct UsageArgs {
    /// Product ID
    pub product: ProductId,
}

/// Execute the usage command
pub async fn execute(
    args: &UsageArgs,
    db: &DatabasePool,
    format: OutputFormat,
) -> Result<(), AppError> {
    let usage = super::license_service(db).usage(args.product).await?;

    output::print_fields(
        "Seat Usage",
        &usage,
        &[
            ("Capacity", usage.capacity.to_string()),
            ("Active", usage.active.to_string()),
            ("Available", usage.available.to_string()),
        ],
        format,
    );
    Ok(())
}
