//! # eventhub-database
//!
//! PostgreSQL connection management, the [`SlotStore`] abstraction over
//! license slot persistence, and its PostgreSQL and in-memory backends.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod store;

pub use connection::DatabasePool;
pub use memory::MemorySlotStore;
pub use repositories::{LicenseProductRepository, PgSlotStore};
pub use store::{Acquisition, SlotStore};
