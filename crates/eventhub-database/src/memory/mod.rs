//! In-memory backends for single-node runs and tests.

pub mod slot_store;

pub use slot_store::MemorySlotStore;
