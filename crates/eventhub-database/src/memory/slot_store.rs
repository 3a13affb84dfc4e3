//! In-memory slot store using a Tokio mutex for single-node deployments.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use eventhub_core::error::AppError;
use eventhub_core::result::AppResult;
use eventhub_core::types::{HolderId, ProductId, SlotId};
use eventhub_entity::license::{LicenseProduct, LicenseSlot, ReleaseResult};

use crate::store::{Acquisition, SlotStore};

#[derive(Debug, Default)]
struct InnerState {
    products: HashMap<ProductId, LicenseProduct>,
    slots: HashMap<SlotId, LicenseSlot>,
}

impl InnerState {
    fn count_active(&self, product_id: ProductId) -> i64 {
        self.slots
            .values()
            .filter(|s| s.product_id == product_id && s.is_active())
            .count() as i64
    }
}

/// Slot store holding products and slots behind one mutex.
///
/// Every operation takes the lock for its whole duration, which gives
/// the same one-winner semantics as the conditional updates of the
/// PostgreSQL store. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemorySlotStore {
    state: Arc<Mutex<InnerState>>,
}

impl MemorySlotStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a product.
    pub async fn put_product(&self, product: LicenseProduct) {
        let mut state = self.state.lock().await;
        state.products.insert(product.id, product);
    }
}

#[async_trait]
impl SlotStore for MemorySlotStore {
    async fn find_product(&self, product_id: ProductId) -> AppResult<Option<LicenseProduct>> {
        let state = self.state.lock().await;
        Ok(state.products.get(&product_id).cloned())
    }

    async fn find_by_id(&self, slot_id: SlotId) -> AppResult<Option<LicenseSlot>> {
        let state = self.state.lock().await;
        Ok(state.slots.get(&slot_id).cloned())
    }

    async fn find_active_by_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
    ) -> AppResult<Option<LicenseSlot>> {
        let state = self.state.lock().await;
        Ok(state
            .slots
            .values()
            .filter(|s| s.product_id == product_id && s.holder_id == holder_id && s.is_active())
            .max_by_key(|s| s.acquired_at)
            .cloned())
    }

    async fn find_active_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<LicenseSlot>> {
        let state = self.state.lock().await;
        Ok(state
            .slots
            .values()
            .filter(|s| {
                state
                    .products
                    .get(&s.product_id)
                    .is_some_and(|p| s.is_expired(p.ttl_seconds, now))
            })
            .cloned()
            .collect())
    }

    async fn mark_released(
        &self,
        slot_id: SlotId,
        released_at: DateTime<Utc>,
        result: ReleaseResult,
    ) -> AppResult<LicenseSlot> {
        let mut state = self.state.lock().await;
        if let Some(slot) = state.slots.get_mut(&slot_id) {
            if slot.release(released_at, result) {
                return Ok(slot.clone());
            }
        }

        debug!(slot_id = %slot_id, "Release matched no active slot");
        Err(AppError::not_found(format!(
            "Slot {slot_id} not found or already released"
        )))
    }

    async fn count_active(&self, product_id: ProductId) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state.count_active(product_id))
    }

    async fn acquire_for_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
        now: DateTime<Utc>,
    ) -> AppResult<Acquisition> {
        let mut state = self.state.lock().await;

        let (capacity, ttl_seconds) = state
            .products
            .get(&product_id)
            .map(|p| (p.capacity, p.ttl_seconds))
            .ok_or_else(|| AppError::not_found(format!("Product {product_id} not found")))?;

        let held = state
            .slots
            .values()
            .find(|s| s.product_id == product_id && s.holder_id == holder_id && s.is_active())
            .cloned();

        let replaced = match held {
            Some(slot) if !slot.is_expired(ttl_seconds, now) => {
                return Ok(Acquisition::Existing(slot));
            }
            Some(slot) => Some(slot.id),
            None => None,
        };

        // The holder's expired seat is given back before counting.
        let active = state.count_active(product_id) - i64::from(replaced.is_some());
        if active >= i64::from(capacity) {
            return Err(AppError::capacity_exceeded(format!(
                "Product {product_id} has no free seats ({active}/{capacity} in use)"
            )));
        }

        if let Some(stale) = replaced {
            if let Some(slot) = state.slots.get_mut(&stale) {
                slot.release(now, ReleaseResult::Expired);
            }
        }

        let slot = LicenseSlot::acquired(product_id, holder_id, now);
        state.slots.insert(slot.id, slot.clone());
        Ok(Acquisition::Granted { slot, replaced })
    }

    async fn update_capacity(
        &self,
        product_id: ProductId,
        capacity: i32,
    ) -> AppResult<LicenseProduct> {
        if capacity < 0 {
            return Err(AppError::validation("Product capacity must not be negative"));
        }

        let mut state = self.state.lock().await;
        let active = state.count_active(product_id);
        let product = state
            .products
            .get_mut(&product_id)
            .ok_or_else(|| AppError::not_found(format!("Product {product_id} not found")))?;

        if i64::from(capacity) < active {
            return Err(AppError::conflict(format!(
                "Product {product_id} has {active} active seats; capacity {capacity} is too low"
            )));
        }

        product.capacity = capacity;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }

    async fn list_by_product(
        &self,
        product_id: ProductId,
        active_only: bool,
    ) -> AppResult<Vec<LicenseSlot>> {
        let state = self.state.lock().await;
        let mut slots: Vec<LicenseSlot> = state
            .slots
            .values()
            .filter(|s| s.product_id == product_id && (!active_only || s.is_active()))
            .cloned()
            .collect();
        slots.sort_by(|a, b| b.acquired_at.cmp(&a.acquired_at));
        Ok(slots)
    }
}
