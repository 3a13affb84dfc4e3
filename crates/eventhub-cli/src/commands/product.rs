//! License product CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use eventhub_core::config::AppConfig;
use eventhub_core::error::AppError;
use eventhub_core::types::ProductId;
use eventhub_database::{DatabasePool, LicenseProductRepository};
use eventhub_entity::license::{LicenseProduct, NewLicenseProduct};

/// Arguments for product commands
#[derive(Debug, Args)]
pub struct ProductArgs {
    /// Product subcommand
    #[command(subcommand)]
    pub command: ProductCommand,
}

/// Product subcommands
#[derive(Debug, Subcommand)]
pub enum ProductCommand {
    /// Register a license product
    Add {
        /// Unique product name
        name: String,
        /// Number of concurrent seats
        #[arg(long)]
        capacity: i32,
        /// Seat lifetime in seconds (defaults to license.default_ttl_seconds)
        #[arg(long)]
        ttl: Option<i64>,
    },
    /// List license products
    List,
    /// Change the number of seats of a product
    SetCapacity {
        /// Product ID
        product_id: ProductId,
        /// New number of concurrent seats
        #[arg(long)]
        capacity: i32,
    },
}

/// Product display row for table output
#[derive(Debug, Serialize, Tabled)]
struct ProductRow {
    /// Product ID
    id: String,
    /// Name
    name: String,
    /// Capacity
    capacity: i32,
    /// TTL seconds
    ttl_seconds: i64,
    /// Created at
    created_at: String,
}

impl From<&LicenseProduct> for ProductRow {
    fn from(p: &LicenseProduct) -> Self {
        Self {
            id: p.id.to_string(),
            name: p.name.clone(),
            capacity: p.capacity,
            ttl_seconds: p.ttl_seconds,
            created_at: output::format_time(Some(p.created_at)),
        }
    }
}

/// Execute product commands
pub async fn execute(
    args: &ProductArgs,
    db: &DatabasePool,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let repo = LicenseProductRepository::new(db.pool().clone());

    match &args.command {
        ProductCommand::Add {
            name,
            capacity,
            ttl,
        } => {
            let input = NewLicenseProduct {
                name: name.clone(),
                capacity: *capacity,
                ttl_seconds: ttl.unwrap_or(config.license.default_ttl_seconds),
            };
            let product = repo.create(&input).await?;

            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "Created product '{}' ({}) with {} seats",
                    product.name, product.id, product.capacity
                )),
                OutputFormat::Json => output::print_list(&[ProductRow::from(&product)], format),
            }
        }
        ProductCommand::List => {
            let products = repo.list().await?;
            let rows: Vec<ProductRow> = products.iter().map(ProductRow::from).collect();
            output::print_list(&rows, format);
        }
        ProductCommand::SetCapacity {
            product_id,
            capacity,
        } => {
            let product = super::license_service(db)
                .set_capacity(*product_id, *capacity)
                .await?;

            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "Product '{}' now has {} seats",
                    product.name, product.capacity
                )),
                OutputFormat::Json => output::print_list(&[ProductRow::from(&product)], format),
            }
        }
    }

    Ok(())
}
