//! License seat lifecycle: acquisition, release and reaping.

pub mod service;

pub use service::LicenseService;
