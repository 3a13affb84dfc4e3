//! `[database]` section.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// PostgreSQL pool settings shared by the server and the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL, e.g. `postgres://eventhub:secret@db/eventhub`.
    pub url: String,
    #[serde(default = "pool_max")]
    pub max_connections: u32,
    #[serde(default = "pool_min")]
    pub min_connections: u32,
    /// How long a caller waits for a free connection.
    #[serde(default = "acquire_secs")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "idle_secs")]
    pub idle_timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_seconds)
    }
}

fn pool_max() -> u32 {
    20
}

fn pool_min() -> u32 {
    1
}

fn acquire_secs() -> u64 {
    10
}

fn idle_secs() -> u64 {
    300
}
