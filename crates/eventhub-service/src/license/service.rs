//! License seat service.
//!
//! The only component allowed to change a slot's state. Request handlers
//! call [`LicenseService::acquire_slot`] and [`LicenseService::release_slot`];
//! the background reaper calls [`LicenseService::reap_expired_slots`].

use std::sync::Arc;

use tracing::{debug, error, info};

use eventhub_core::error::AppError;
use eventhub_core::traits::Clock;
use eventhub_core::types::{HolderId, ProductId, SlotId};
use eventhub_database::store::{Acquisition, SlotStore};
use eventhub_entity::license::{LicenseProduct, LicenseSlot, ProductUsage, ReleaseResult};

/// Seat acquisition, release and expiry reclamation.
#[derive(Debug, Clone)]
pub struct LicenseService {
    /// Slot persistence.
    store: Arc<dyn SlotStore>,
    /// Time source for acquisition stamps and expiry checks.
    clock: Arc<dyn Clock>,
}

impl LicenseService {
    /// Creates a new license service.
    pub fn new(store: Arc<dyn SlotStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn product(&self, product_id: ProductId) -> Result<LicenseProduct, AppError> {
        self.store
            .find_product(product_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Product {product_id} not found")))
    }

    /// Acquire a seat of `product_id` for `holder_id`.
    ///
    /// A holder that already has a live seat gets that seat back instead
    /// of consuming a second one. If that seat has outlived its TTL but
    /// has not been reaped yet, it is released as expired first.
    ///
    /// Fails with `CapacityExceeded` when every seat is taken.
    pub async fn acquire_slot(
        &self,
        product_id: ProductId,
        holder_id: HolderId,
    ) -> Result<LicenseSlot, AppError> {
        let now = self.clock.now();

        match self
            .store
            .acquire_for_holder(product_id, holder_id, now)
            .await?
        {
            Acquisition::Existing(slot) => {
                debug!(
                    slot_id = %slot.id,
                    holder_id = %holder_id,
                    "Holder already has an active seat"
                );
                Ok(slot)
            }
            Acquisition::Granted { slot, replaced } => {
                if let Some(stale) = replaced {
                    info!(
                        slot_id = %stale,
                        holder_id = %holder_id,
                        "Released holder's expired seat before re-acquiring"
                    );
                }
                info!(
                    slot_id = %slot.id,
                    product_id = %product_id,
                    holder_id = %holder_id,
                    "Seat acquired"
                );
                Ok(slot)
            }
        }
    }

    /// Release a seat on behalf of its holder.
    ///
    /// Fails with `NotFound` if the slot does not exist or was already
    /// released (for instance by the reaper).
    pub async fn release_slot(&self, slot_id: SlotId) -> Result<LicenseSlot, AppError> {
        let now = self.clock.now();
        let slot = self
            .store
            .mark_released(slot_id, now, ReleaseResult::Manual)
            .await?;

        info!(
            slot_id = %slot_id,
            product_id = %slot.product_id,
            holder_id = %slot.holder_id,
            "Seat released"
        );
        Ok(slot)
    }

    /// Release every active slot whose TTL has elapsed.
    ///
    /// All slots are judged against a single `now` read once at the start.
    /// A slot that fails to transition is skipped and left for the next
    /// sweep; it is not counted. Only a failure to list expired slots
    /// aborts the sweep.
    ///
    /// Returns the number of slots reclaimed by this call.
    pub async fn reap_expired_slots(&self) -> Result<u64, AppError> {
        let now = self.clock.now();
        let expired = self.store.find_active_expired(now).await?;

        if expired.is_empty() {
            return Ok(0);
        }

        debug!(candidates = expired.len(), "Reaping expired seats");

        let mut reclaimed = 0u64;
        for slot in &expired {
            match self
                .store
                .mark_released(slot.id, now, ReleaseResult::Expired)
                .await
            {
                Ok(_) => reclaimed += 1,
                Err(e) if e.is_not_found() => {
                    debug!(slot_id = %slot.id, "Seat released concurrently, skipping");
                }
                Err(e) => {
                    error!(
                        slot_id = %slot.id,
                        product_id = %slot.product_id,
                        error = %e,
                        "Failed to reclaim expired seat"
                    );
                }
            }
        }

        Ok(reclaimed)
    }

    /// Seat usage for a product.
    pub async fn usage(&self, product_id: ProductId) -> Result<ProductUsage, AppError> {
        let product = self.product(product_id).await?;
        let active = self.store.count_active(product_id).await?;
        Ok(ProductUsage::new(product.capacity, active))
    }

    /// Resize a product.
    ///
    /// Refused with `Conflict` while more seats are held than `capacity`
    /// allows; holders keep their seats until released or reaped.
    pub async fn set_capacity(
        &self,
        product_id: ProductId,
        capacity: i32,
    ) -> Result<LicenseProduct, AppError> {
        let product = self.store.update_capacity(product_id, capacity).await?;
        info!(product_id = %product_id, capacity, "Product capacity changed");
        Ok(product)
    }

    /// Slots of a product, newest first.
    pub async fn list_slots(
        &self,
        product_id: ProductId,
        active_only: bool,
    ) -> Result<Vec<LicenseSlot>, AppError> {
        self.store.list_by_product(product_id, active_only).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    use eventhub_core::error::ErrorKind;
    use eventhub_core::result::AppResult;
    use eventhub_core::traits::ManualClock;
    use eventhub_database::MemorySlotStore;
    use eventhub_entity::license::SlotState;

    /// Memory store whose `mark_released` fails transiently for chosen slots.
    #[derive(Debug)]
    struct FlakyStore {
        inner: MemorySlotStore,
        failing: Mutex<HashSet<SlotId>>,
    }

    impl FlakyStore {
        fn fail_release_of(&self, slot_id: SlotId) {
            self.failing.lock().unwrap().insert(slot_id);
        }

        fn heal(&self) {
            self.failing.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl SlotStore for FlakyStore {
        async fn find_product(&self, id: ProductId) -> AppResult<Option<LicenseProduct>> {
            self.inner.find_product(id).await
        }

        async fn find_by_id(&self, id: SlotId) -> AppResult<Option<LicenseSlot>> {
            self.inner.find_by_id(id).await
        }

        async fn find_active_by_holder(
            &self,
            product_id: ProductId,
            holder_id: HolderId,
        ) -> AppResult<Option<LicenseSlot>> {
            self.inner.find_active_by_holder(product_id, holder_id).await
        }

        async fn find_active_expired(&self, now: DateTime<Utc>) -> AppResult<Vec<LicenseSlot>> {
            self.inner.find_active_expired(now).await
        }

        async fn mark_released(
            &self,
            slot_id: SlotId,
            released_at: DateTime<Utc>,
            result: ReleaseResult,
        ) -> AppResult<LicenseSlot> {
            if self.failing.lock().unwrap().contains(&slot_id) {
                return Err(AppError::store_unavailable("connection reset"));
            }
            self.inner.mark_released(slot_id, released_at, result).await
        }

        async fn count_active(&self, product_id: ProductId) -> AppResult<i64> {
            self.inner.count_active(product_id).await
        }

        async fn acquire_for_holder(
            &self,
            product_id: ProductId,
            holder_id: HolderId,
            now: DateTime<Utc>,
        ) -> AppResult<Acquisition> {
            self.inner
                .acquire_for_holder(product_id, holder_id, now)
                .await
        }

        async fn update_capacity(
            &self,
            product_id: ProductId,
            capacity: i32,
        ) -> AppResult<LicenseProduct> {
            self.inner.update_capacity(product_id, capacity).await
        }

        async fn list_by_product(
            &self,
            product_id: ProductId,
            active_only: bool,
        ) -> AppResult<Vec<LicenseSlot>> {
            self.inner.list_by_product(product_id, active_only).await
        }
    }

    struct Fixture {
        service: LicenseService,
        store: MemorySlotStore,
        clock: ManualClock,
        product: ProductId,
        start: DateTime<Utc>,
    }

    async fn product(store: &MemorySlotStore, capacity: i32, ttl_seconds: i64) -> ProductId {
        let now = Utc::now();
        let product = LicenseProduct {
            id: ProductId::new(),
            name: "range-seat".to_string(),
            capacity,
            ttl_seconds,
            created_at: now,
            updated_at: now,
        };
        let id = product.id;
        store.put_product(product).await;
        id
    }

    async fn fixture(capacity: i32, ttl_seconds: i64) -> Fixture {
        let store = MemorySlotStore::new();
        let product = product(&store, capacity, ttl_seconds).await;
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let service = LicenseService::new(Arc::new(store.clone()), Arc::new(clock.clone()));
        Fixture {
            service,
            store,
            clock,
            product,
            start,
        }
    }

    #[tokio::test]
    async fn test_reap_respects_ttl_boundary() {
        let f = fixture(5, 3600).await;
        let slot = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        f.clock.set(f.start + Duration::seconds(3599));
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 0);
        let still = f.store.find_by_id(slot.id).await.unwrap().unwrap();
        assert_eq!(still.state, SlotState::Active);

        let reap_at = f.start + Duration::seconds(3601);
        f.clock.set(reap_at);
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 1);

        let reaped = f.store.find_by_id(slot.id).await.unwrap().unwrap();
        assert_eq!(reaped.state, SlotState::Released);
        assert_eq!(reaped.result, Some(ReleaseResult::Expired));
        assert_eq!(reaped.released_at, Some(reap_at));
    }

    #[tokio::test]
    async fn test_reap_at_exact_expiry_reclaims() {
        let f = fixture(1, 60).await;
        f.service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        f.clock.set(f.start + Duration::seconds(60));
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_reap_returns_zero() {
        let f = fixture(3, 60).await;
        for _ in 0..3 {
            f.service
                .acquire_slot(f.product, HolderId::new())
                .await
                .unwrap();
        }

        f.clock.advance(Duration::seconds(61));
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 3);
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reap_with_nothing_expired() {
        let f = fixture(2, 600).await;
        let slot = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 0);
        let unchanged = f.store.find_by_id(slot.id).await.unwrap().unwrap();
        assert_eq!(unchanged, slot);
    }

    #[tokio::test]
    async fn test_reap_only_touches_expired_products() {
        let f = fixture(5, 60).await;
        let long_lived = product(&f.store, 5, 86_400).await;

        let short = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();
        let long = f
            .service
            .acquire_slot(long_lived, HolderId::new())
            .await
            .unwrap();

        f.clock.advance(Duration::minutes(10));
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 1);

        assert!(!f.store.find_by_id(short.id).await.unwrap().unwrap().is_active());
        assert!(f.store.find_by_id(long.id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_transient_failure_skips_slot_and_continues() {
        let store = MemorySlotStore::new();
        let product_id = product(&store, 5, 60).await;
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let flaky = Arc::new(FlakyStore {
            inner: store.clone(),
            failing: Mutex::new(HashSet::new()),
        });
        let service = LicenseService::new(flaky.clone(), Arc::new(clock.clone()));

        let first = service
            .acquire_slot(product_id, HolderId::new())
            .await
            .unwrap();
        let second = service
            .acquire_slot(product_id, HolderId::new())
            .await
            .unwrap();
        flaky.fail_release_of(second.id);

        clock.advance(Duration::seconds(120));
        assert_eq!(service.reap_expired_slots().await.unwrap(), 1);
        assert!(!store.find_by_id(first.id).await.unwrap().unwrap().is_active());
        assert!(store.find_by_id(second.id).await.unwrap().unwrap().is_active());

        flaky.heal();
        assert_eq!(service.reap_expired_slots().await.unwrap(), 1);
        assert!(!store.find_by_id(second.id).await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_manual_release_before_reap_is_not_counted() {
        let f = fixture(2, 60).await;
        let slot = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(61));
        // The holder wins the race: the sweep sees the slot as expired but
        // its conditional release no longer matches.
        let expired = f.store.find_active_expired(f.clock.now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        f.service.release_slot(slot.id).await.unwrap();

        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 0);
        let stored = f.store.find_by_id(slot.id).await.unwrap().unwrap();
        assert_eq!(stored.result, Some(ReleaseResult::Manual));
    }

    #[tokio::test]
    async fn test_concurrent_release_and_reap_release_exactly_once() {
        let f = fixture(10, 60).await;
        let mut slots = Vec::new();
        for _ in 0..10 {
            slots.push(
                f.service
                    .acquire_slot(f.product, HolderId::new())
                    .await
                    .unwrap(),
            );
        }
        f.clock.advance(Duration::seconds(61));

        let reaper = {
            let service = f.service.clone();
            tokio::spawn(async move { service.reap_expired_slots().await.unwrap() })
        };
        let releaser = {
            let service = f.service.clone();
            let ids: Vec<SlotId> = slots.iter().map(|s| s.id).collect();
            tokio::spawn(async move {
                let mut won = 0u64;
                for id in ids {
                    if service.release_slot(id).await.is_ok() {
                        won += 1;
                    }
                }
                won
            })
        };

        let reaped = reaper.await.unwrap();
        let released = releaser.await.unwrap();
        assert_eq!(reaped + released, 10);

        let all = f.store.list_by_product(f.product, false).await.unwrap();
        let expired = all
            .iter()
            .filter(|s| s.result == Some(ReleaseResult::Expired))
            .count() as u64;
        assert_eq!(expired, reaped);
        assert!(all.iter().all(|s| s.state == SlotState::Released));
    }

    #[tokio::test]
    async fn test_acquire_enforces_capacity() {
        let f = fixture(2, 60).await;
        f.service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();
        f.service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        let err = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);

        let usage = f.service.usage(f.product).await.unwrap();
        assert_eq!(usage, ProductUsage::new(2, 2));
    }

    #[tokio::test]
    async fn test_reap_frees_capacity() {
        let f = fixture(1, 60).await;
        f.service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        f.clock.advance(Duration::seconds(60));
        f.service.reap_expired_slots().await.unwrap();

        assert!(
            f.service
                .acquire_slot(f.product, HolderId::new())
                .await
                .is_ok()
        );
        assert_eq!(f.store.count_active(f.product).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_acquire_never_exceeds_capacity() {
        let f = fixture(3, 600).await;
        let mut handles = Vec::new();
        for _ in 0..12 {
            let service = f.service.clone();
            let product = f.product;
            handles.push(tokio::spawn(async move {
                service.acquire_slot(product, HolderId::new()).await
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(f.store.count_active(f.product).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_acquire_is_idempotent_per_holder() {
        let f = fixture(2, 600).await;
        let holder = HolderId::new();
        let first = f.service.acquire_slot(f.product, holder).await.unwrap();
        let again = f.service.acquire_slot(f.product, holder).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_eq!(f.store.count_active(f.product).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_acquire_replaces_unreaped_expired_seat() {
        let f = fixture(1, 60).await;
        let holder = HolderId::new();
        let stale = f.service.acquire_slot(f.product, holder).await.unwrap();

        f.clock.advance(Duration::seconds(90));
        let fresh = f.service.acquire_slot(f.product, holder).await.unwrap();

        assert_ne!(stale.id, fresh.id);
        let old = f.store.find_by_id(stale.id).await.unwrap().unwrap();
        assert_eq!(old.result, Some(ReleaseResult::Expired));
        assert_eq!(f.store.count_active(f.product).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_acquire_by_one_holder_shares_a_seat() {
        let f = fixture(5, 600).await;
        let holder = HolderId::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let service = f.service.clone();
            let product = f.product;
            handles.push(tokio::spawn(async move {
                service.acquire_slot(product, holder).await
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().id);
        }
        assert_eq!(ids.len(), 1);
        assert_eq!(f.store.count_active(f.product).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unbounded_ttl_product_does_not_stall_the_sweep() {
        // Written straight to the store, past product validation.
        let f = fixture(2, 60).await;
        let forever = product(&f.store, 2, i64::MAX).await;

        let holder = HolderId::new();
        let pinned = f.service.acquire_slot(forever, holder).await.unwrap();
        f.service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        f.clock.advance(Duration::days(10_000));
        assert_eq!(f.service.reap_expired_slots().await.unwrap(), 1);

        let again = f.service.acquire_slot(forever, holder).await.unwrap();
        assert_eq!(again.id, pinned.id);
        assert_eq!(f.store.count_active(forever).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_set_capacity_refuses_below_active() {
        let f = fixture(3, 600).await;
        for _ in 0..2 {
            f.service
                .acquire_slot(f.product, HolderId::new())
                .await
                .unwrap();
        }

        let err = f.service.set_capacity(f.product, 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(f.service.usage(f.product).await.unwrap(), ProductUsage::new(3, 2));

        let resized = f.service.set_capacity(f.product, 2).await.unwrap();
        assert_eq!(resized.capacity, 2);
        let err = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    }

    #[tokio::test]
    async fn test_release_twice_is_not_found() {
        let f = fixture(1, 60).await;
        let slot = f
            .service
            .acquire_slot(f.product, HolderId::new())
            .await
            .unwrap();

        let released = f.service.release_slot(slot.id).await.unwrap();
        assert_eq!(released.result, Some(ReleaseResult::Manual));
        assert_eq!(released.released_at, Some(f.start));

        let err = f.service.release_slot(slot.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let f = fixture(1, 60).await;
        let err = f
            .service
            .acquire_slot(ProductId::new(), HolderId::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(f.service.usage(ProductId::new()).await.is_err());
    }
}
