//! # eventhub-core
//!
//! Core crate for EventHub. Contains configuration schemas, typed
//! identifiers, the time source abstraction, and the unified error system.
//!
//! This crate has **no** internal dependencies on other EventHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
