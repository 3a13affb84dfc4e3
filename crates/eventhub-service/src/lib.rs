//! # eventhub-service
//!
//! Business logic layer. Services own state transitions and delegate
//! persistence to the stores in `eventhub-database`.

pub mod license;

pub use license::LicenseService;
