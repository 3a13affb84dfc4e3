//! PostgreSQL-backed license slot store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use eventhub_core::error::{AppError, ErrorKind};
use eventhub_core::result::AppResult;
use eventhub_core::types::{HolderId, ProductId, SlotId};
use eventhub_entity::license::{LicenseProduct, LicenseSlot, ReleaseResult};

use crate::store::{Acquisition, SlotStore};

const SLOT_COLUMNS: &str = "id, product_id, holder_id, state, acquired_at, released_at, result";
const PRODUCT_COLUMNS: &str = "id, name, capacity, ttl_seconds, created_at, updated_at";

/// Slot store over the `license_slots` table.
///
/// Each method runs on its own pooled connection; the connection goes
/// back to the pool when the call returns, on success or error.
#[derive(Debug, Clone)]
pub struct PgSlotStore {
    pool: PgPool,
}

impl PgSlotStore {
    /// Create a new slot store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_err(message: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::with_source(ErrorKind::StoreUnavailable, message, e)
}

#[async_trait]
impl SlotStore for PgSlotStore {
    async fn find_product(&self, product_id: ProductId) -> AppResult<Option<LicenseProduct>> {
        sqlx::query_as::<_, LicenseProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM license_products WHERE id = $1"
        ))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find product"))
    }

    async fn find_by_id(&self, slot_id: SlotId) -> AppResult<Option<LicenseSlot>> {
        sqlx::query_as::<_, LicenseSlot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM license_slots WHERE id = $1"
        ))
        .bind(slot_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find slot"))
    }

    async fn find_active_by_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
    ) -> AppResult<Option<LicenseSlot>> {
        sqlx::query_as::<_, LicenseSlot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM license_slots \
             WHERE product_id = $1 AND holder_id = $2 AND state = 'active' \
             ORDER BY acquired_at DESC LIMIT 1"
        ))
        .bind(product_id)
        .bind(holder_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to find holder slot"))
    }

    async fn find_active_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<LicenseSlot>> {
        // Served by the (state, acquired_at) index.
        sqlx::query_as::<_, LicenseSlot>(
            "SELECT s.id, s.product_id, s.holder_id, s.state, s.acquired_at, s.released_at, s.result \
             FROM license_slots s \
             JOIN license_products p ON p.id = s.product_id \
             WHERE s.state = 'active' \
               AND s.acquired_at + p.ttl_seconds * INTERVAL '1 second' <= $1",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to find expired slots"))
    }

    async fn mark_released(
        &self,
        slot_id: SlotId,
        released_at: DateTime<Utc>,
        result: ReleaseResult,
    ) -> AppResult<LicenseSlot> {
        let released = sqlx::query_as::<_, LicenseSlot>(&format!(
            "UPDATE license_slots SET state = 'released', released_at = $2, result = $3 \
             WHERE id = $1 AND state = 'active' RETURNING {SLOT_COLUMNS}"
        ))
        .bind(slot_id)
        .bind(released_at)
        .bind(result)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to release slot"))?;

        released.ok_or_else(|| {
            debug!(slot_id = %slot_id, "Release matched no active slot");
            AppError::not_found(format!("Slot {slot_id} not found or already released"))
        })
    }

    async fn count_active(&self, product_id: ProductId) -> AppResult<i64> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM license_slots WHERE product_id = $1 AND state = 'active'",
        )
        .bind(product_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err("Failed to count active slots"))
    }

    async fn acquire_for_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
        now: DateTime<Utc>,
    ) -> AppResult<Acquisition> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        // Row lock on the product serializes acquisitions for it, so the
        // holder lookup, the capacity count and the insert see one state.
        let limits: Option<(i32, i64)> = sqlx::query_as(
            "SELECT capacity, ttl_seconds FROM license_products WHERE id = $1 FOR UPDATE",
        )
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to lock product"))?;

        let (capacity, ttl_seconds) =
            limits.ok_or_else(|| AppError::not_found(format!("Product {product_id} not found")))?;

        let held = sqlx::query_as::<_, LicenseSlot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM license_slots \
             WHERE product_id = $1 AND holder_id = $2 AND state = 'active'"
        ))
        .bind(product_id)
        .bind(holder_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err("Failed to find holder slot"))?;

        let replaced = match held {
            Some(slot) if !slot.is_expired(ttl_seconds, now) => {
                return Ok(Acquisition::Existing(slot));
            }
            Some(slot) => {
                sqlx::query(
                    "UPDATE license_slots SET state = 'released', released_at = $2, result = $3 \
                     WHERE id = $1 AND state = 'active'",
                )
                .bind(slot.id)
                .bind(now)
                .bind(ReleaseResult::Expired)
                .execute(&mut *tx)
                .await
                .map_err(db_err("Failed to release expired holder slot"))?;
                Some(slot.id)
            }
            None => None,
        };

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM license_slots WHERE product_id = $1 AND state = 'active'",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to count active slots"))?;

        if active >= i64::from(capacity) {
            return Err(AppError::capacity_exceeded(format!(
                "Product {product_id} has no free seats ({active}/{capacity} in use)"
            )));
        }

        let slot = LicenseSlot::acquired(product_id, holder_id, now);
        let inserted = sqlx::query_as::<_, LicenseSlot>(&format!(
            "INSERT INTO license_slots (id, product_id, holder_id, state, acquired_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {SLOT_COLUMNS}"
        ))
        .bind(slot.id)
        .bind(slot.product_id)
        .bind(slot.holder_id)
        .bind(slot.state)
        .bind(slot.acquired_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::conflict(format!(
                "Holder {holder_id} already has an active seat of product {product_id}"
            )),
            _ => AppError::with_source(ErrorKind::StoreUnavailable, "Failed to insert slot", e),
        })?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit slot acquisition"))?;

        Ok(Acquisition::Granted {
            slot: inserted,
            replaced,
        })
    }

    async fn update_capacity(
        &self,
        product_id: ProductId,
        capacity: i32,
    ) -> AppResult<LicenseProduct> {
        if capacity < 0 {
            return Err(AppError::validation("Product capacity must not be negative"));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;

        // Same lock as acquisition: no seat can be granted between the
        // count and the update.
        let locked: Option<ProductId> =
            sqlx::query_scalar("SELECT id FROM license_products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err("Failed to lock product"))?;
        if locked.is_none() {
            return Err(AppError::not_found(format!("Product {product_id} not found")));
        }

        let active: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM license_slots WHERE product_id = $1 AND state = 'active'",
        )
        .bind(product_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to count active slots"))?;

        if i64::from(capacity) < active {
            return Err(AppError::conflict(format!(
                "Product {product_id} has {active} active seats; capacity {capacity} is too low"
            )));
        }

        let product = sqlx::query_as::<_, LicenseProduct>(&format!(
            "UPDATE license_products SET capacity = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(product_id)
        .bind(capacity)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err("Failed to update product"))?;

        tx.commit()
            .await
            .map_err(db_err("Failed to commit capacity change"))?;

        Ok(product)
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
        active_only: bool,
    ) -> AppResult<Vec<LicenseSlot>> {
        sqlx::query_as::<_, LicenseSlot>(&format!(
            "SELECT {SLOT_COLUMNS} FROM license_slots \
             WHERE product_id = $1 AND ($2 = FALSE OR state = 'active') \
             ORDER BY acquired_at DESC"
        ))
        .bind(product_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err("Failed to list slots"))
    }
}
