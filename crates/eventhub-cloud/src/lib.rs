//! # eventhub-cloud
//!
//! The [`CloudProvider`] capability used to provision lab instances, its
//! DigitalOcean and Linode adapters, and the factory that picks one from
//! configuration at startup.

pub mod factory;
pub mod provider;
pub mod providers;

pub use factory::build_provider;
pub use provider::{CloudProvider, Instance, InstanceSpec, InstanceStatus};
