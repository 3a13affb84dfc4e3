//! # eventhub-entity
//!
//! Domain entity models for EventHub. Database entities derive
//! `sqlx::FromRow`; state enums map onto PostgreSQL enum types.

pub mod license;
