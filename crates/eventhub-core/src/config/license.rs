//! License seat configuration.

use serde::{Deserialize, Serialize};

/// Longest seat TTL a product may declare: 366 days.
///
/// Keeps `acquired_at + ttl` inside both chrono's and PostgreSQL's
/// timestamp range.
pub const MAX_TTL_SECONDS: i64 = 366 * 24 * 60 * 60;

/// License seat settings.
///
/// The reaper cadence is not configurable; see `REAP_INTERVAL` in
/// `eventhub-worker`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    /// Whether the background reaper runs in this process.
    #[serde(default = "default_true")]
    pub reaper_enabled: bool,
    /// TTL applied to products created without an explicit one.
    #[serde(default = "default_ttl")]
    pub default_ttl_seconds: i64,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            reaper_enabled: true,
            default_ttl_seconds: default_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ttl() -> i64 {
    3600
}
