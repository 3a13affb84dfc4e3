//! Scheduled background tasks for EventHub.
//!
//! This crate provides:
//! - A scheduler that runs periodic jobs on a fixed interval, never
//!   overlapping two runs of the same job
//! - The license reaper job that reclaims expired seats

pub mod jobs;
pub mod scheduler;

pub use jobs::{LicenseReaperJob, PeriodicJob, REAP_INTERVAL};
pub use scheduler::{JobRunner, BackgroundScheduler, TickOutcome};
