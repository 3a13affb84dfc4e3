//! License slot entity model.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use eventhub_core::types::{HolderId, ProductId, SlotId};

/// Lifecycle state of a slot. `Released` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "slot_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    /// Seat is held.
    Active,
    /// Seat was given back; the row is kept as an audit record.
    Released,
}

impl SlotState {
    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Released => "released",
        }
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a slot was released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "release_result", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReleaseResult {
    /// The holder gave the seat back.
    Manual,
    /// The reaper reclaimed the seat after its TTL elapsed.
    Expired,
}

impl ReleaseResult {
    /// Return the result as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ReleaseResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One allocation of a product seat to a holder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct LicenseSlot {
    /// Unique slot identifier.
    pub id: SlotId,
    /// Product the seat belongs to.
    pub product_id: ProductId,
    /// Participant or instance holding the seat.
    pub holder_id: HolderId,
    /// Current state.
    pub state: SlotState,
    /// When the seat was acquired.
    pub acquired_at: DateTime<Utc>,
    /// When the seat was released (None while active).
    pub released_at: Option<DateTime<Utc>>,
    /// Why the seat was released (None while active).
    pub result: Option<ReleaseResult>,
}

impl LicenseSlot {
    /// A freshly acquired slot.
    pub fn acquired(product_id: ProductId, holder_id: HolderId, at: DateTime<Utc>) -> Self {
        Self {
            id: SlotId::new(),
            product_id,
            holder_id,
            state: SlotState::Active,
            acquired_at: at,
            released_at: None,
            result: None,
        }
    }

    /// Whether the slot currently holds a seat.
    pub fn is_active(&self) -> bool {
        self.state == SlotState::Active
    }

    /// Instant from which the slot is reclaimable under `ttl_seconds`.
    ///
    /// `None` when the sum leaves chrono's range; such a slot never expires.
    pub fn expires_at(&self, ttl_seconds: i64) -> Option<DateTime<Utc>> {
        TimeDelta::try_seconds(ttl_seconds)
            .and_then(|ttl| self.acquired_at.checked_add_signed(ttl))
    }

    /// Whether an active slot has outlived `ttl_seconds` as of `now`.
    ///
    /// Released slots are never considered expired.
    pub fn is_expired(&self, ttl_seconds: i64, now: DateTime<Utc>) -> bool {
        self.is_active() && self.expires_at(ttl_seconds).is_some_and(|at| at <= now)
    }

    /// Transition to `released`. Returns `false` if already released.
    pub fn release(&mut self, at: DateTime<Utc>, result: ReleaseResult) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = SlotState::Released;
        self.released_at = Some(at);
        self.result = Some(result);
        true
    }
}
