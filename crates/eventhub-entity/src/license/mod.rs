//! License domain entities.

pub mod product;
pub mod slot;

pub use product::{LicenseProduct, NewLicenseProduct, ProductUsage};
pub use slot::{LicenseSlot, ReleaseResult, SlotState};
