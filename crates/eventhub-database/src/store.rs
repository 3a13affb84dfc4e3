//! Persistence boundary for license slots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use eventhub_core::result::AppResult;
use eventhub_core::types::{HolderId, ProductId, SlotId};
use eventhub_entity::license::{LicenseProduct, LicenseSlot, ReleaseResult};

/// Outcome of [`SlotStore::acquire_for_holder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    /// The holder already had a live seat; nothing was written.
    Existing(LicenseSlot),
    /// A new seat was allocated. `replaced` names the holder's expired,
    /// not yet reaped slot that was released as `expired` in the same step.
    Granted {
        slot: LicenseSlot,
        replaced: Option<SlotId>,
    },
}

impl Acquisition {
    /// The slot the holder now owns.
    pub fn into_slot(self) -> LicenseSlot {
        match self {
            Self::Existing(slot) | Self::Granted { slot, .. } => slot,
        }
    }
}

/// Durable storage and query access for license slots.
///
/// Only the license service calls the mutating methods. Every state
/// transition must be atomic on its own: `mark_released` releases a slot
/// only if it is still active, so concurrent releases of the same slot
/// resolve to exactly one winner without application-level locking.
#[async_trait]
pub trait SlotStore: Send + Sync + std::fmt::Debug {
    /// Look up the product a slot would belong to.
    async fn find_product(&self, product_id: ProductId) -> AppResult<Option<LicenseProduct>>;

    /// Look up a slot by ID, in any state.
    async fn find_by_id(&self, slot_id: SlotId) -> AppResult<Option<LicenseSlot>>;

    /// The active slot `holder_id` holds on `product_id`, if any.
    async fn find_active_by_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
    ) -> AppResult<Option<LicenseSlot>>;

    /// Every active slot whose `acquired_at + product.ttl <= now`.
    ///
    /// Ordering is unspecified.
    async fn find_active_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<LicenseSlot>>;

    /// Release an active slot.
    ///
    /// Fails with `NotFound` if the slot does not exist or is already
    /// released; in that case nothing is written.
    async fn mark_released(
        &self,
        slot_id: SlotId,
        released_at: DateTime<Utc>,
        result: ReleaseResult,
    ) -> AppResult<LicenseSlot>;

    /// Number of active slots for a product.
    async fn count_active(&self, product_id: ProductId) -> AppResult<i64>;

    /// Give `holder_id` a seat of `product_id` as of `now`.
    ///
    /// Runs as one atomic step: a holder with a live seat gets it back, a
    /// holder whose seat has expired has it released as `expired`, and a
    /// new seat is inserted only while the product is below capacity.
    /// Fails with `CapacityExceeded` when no seat is free and `NotFound`
    /// when the product does not exist.
    async fn acquire_for_holder(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
        now: DateTime<Utc>,
    ) -> AppResult<Acquisition>;

    /// Change a product's capacity.
    ///
    /// Refused with `Conflict` when `capacity` is below the number of
    /// active slots, so the active count never exceeds capacity.
    async fn update_capacity(
        &self,
        product_id: ProductId,
        capacity: i32,
    ) -> AppResult<LicenseProduct>;

    /// Slots of a product, newest first.
    async fn list_by_product(
        &self,
        product_id: ProductId,
        active_only: bool,
    ) -> AppResult<Vec<LicenseSlot>>;
}
