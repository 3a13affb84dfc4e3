//! PostgreSQL repository implementations for license entities.

pub mod product;
pub mod slot;

pub use product::LicenseProductRepository;
pub use slot::PgSlotStore;
