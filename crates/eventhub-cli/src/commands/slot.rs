//! License slot CLI commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use eventhub_core::error::AppError;
use eventhub_core::types::{ProductId, SlotId};
use eventhub_database::DatabasePool;
use eventhub_entity::license::LicenseSlot;

/// Arguments for slot commands
#[derive(Debug, Args)]
pub struct SlotArgs {
    /// Slot subcommand
    #[command(subcommand)]
    pub command: SlotCommand,
}

/// Slot subcommands
#[derive(Debug, Subcommand)]
pub enum SlotCommand {
    /// List slots of a product, newest first
    List {
        /// Product ID
        #[arg(short, long)]
        product: ProductId,
        /// Include released slots
        #[arg(long)]
        all: bool,
    },
    /// Release a seat on behalf of its holder
    Release {
        /// Slot ID
        slot_id: SlotId,
    },
}

/// Slot display row for table output
#[derive(Debug, Serialize, Tabled)]
struct SlotRow {
    /// Slot ID
    id: String,
    /// Holder
    holder_id: String,
    /// State
    state: String,
    /// Acquired at
    acquired_at: String,
    /// Released at
    released_at: String,
    /// Release result
    result: String,
}

impl From<&LicenseSlot> for SlotRow {
    fn from(s: &LicenseSlot) -> Self {
        Self {
            id: s.id.to_string(),
            holder_id: s.holder_id.to_string(),
            state: s.state.to_string(),
            acquired_at: output::format_time(Some(s.acquired_at)),
            released_at: output::format_time(s.released_at),
            result: s.result.map(|r| r.to_string()).unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Execute slot commands
pub async fn execute(
    args: &SlotArgs,
    db: &DatabasePool,
    format: OutputFormat,
) -> Result<(), AppError> {
    let service = super::license_service(db);

    match &args.command {
        SlotCommand::List { product, all } => {
            let slots = service.list_slots(*product, !*all).await?;
            let rows: Vec<SlotRow> = slots.iter().map(SlotRow::from).collect();
            output::print_list(&rows, format);
        }
        SlotCommand::Release { slot_id } => {
            let slot = service.release_slot(*slot_id).await?;
            match format {
                OutputFormat::Table => output::print_success(&format!(
                    "Released slot {} held by {}",
                    slot.id, slot.holder_id
                )),
                OutputFormat::Json => output::print_list(&[SlotRow::from(&slot)], format),
            }
        }
    }

    Ok(())
}
