//! License product entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use eventhub_core::config::MAX_TTL_SECONDS;
use eventhub_core::error::AppError;
use eventhub_core::types::ProductId;

/// A named license offering with a fixed seat capacity and a per-seat TTL.
///
/// Reference data: written by administrators, read-only to the seat lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LicenseProduct {
    /// Unique product identifier.
    pub id: ProductId,
    /// Display name, unique across products.
    pub name: String,
    /// Maximum number of simultaneously active slots.
    pub capacity: i32,
    /// How long a seat may stay allocated, in seconds.
    pub ttl_seconds: i64,
    /// When the product was created.
    pub created_at: DateTime<Utc>,
    /// When the product was last edited.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a license product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLicenseProduct {
    /// Display name.
    pub name: String,
    /// Seat capacity.
    pub capacity: i32,
    /// Seat TTL in seconds.
    pub ttl_seconds: i64,
}

impl NewLicenseProduct {
    /// Validate the product definition.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Product name must not be empty"));
        }
        if self.capacity < 0 {
            return Err(AppError::validation("Product capacity must not be negative"));
        }
        if !(1..=MAX_TTL_SECONDS).contains(&self.ttl_seconds) {
            return Err(AppError::validation(format!(
                "Product TTL must be between 1 and {MAX_TTL_SECONDS} seconds"
            )));
        }
        Ok(())
    }
}

/// Seat usage for one product at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUsage {
    /// Total seats.
    pub capacity: i32,
    /// Seats held by an active slot.
    pub active: i64,
    /// Seats free for acquisition.
    pub available: i64,
}

impl ProductUsage {
    /// Build usage figures from a capacity and an active count.
    pub fn new(capacity: i32, active: i64) -> Self {
        Self {
            capacity,
            active,
            available: (i64::from(capacity) - active).max(0),
        }
    }
}
