//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod cloud;
pub mod database;
pub mod license;
pub mod logging;

use serde::{Deserialize, Serialize};

pub use self::cloud::{CloudConfig, CloudProviderKind};
pub use self::database::DatabaseConfig;
pub use self::license::{LicenseConfig, MAX_TTL_SECONDS};
pub use self::logging::{LogFormat, LoggingConfig};

use crate::error::AppError;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "EVENTHUB";

/// Root application configuration.
///
/// Top-level deserialization target for the merged configuration
/// (base file + environment overlay + `EVENTHUB__*` variables).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// License seat settings.
    #[serde(default)]
    pub license: LicenseConfig,
    /// Cloud provider settings. Absent when instance provisioning is not used.
    #[serde(default)]
    pub cloud: Option<CloudConfig>,
}

impl AppConfig {
    /// Load configuration from `path`, an optional `config/{env}` overlay
    /// and environment variables prefixed with `EVENTHUB__`.
    pub fn load(path: &str) -> Result<Self, AppError> {
        let env = std::env::var(format!("{ENV_PREFIX}_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let parsed: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.url.trim().is_empty() {
            return Err(AppError::configuration("database.url must not be empty"));
        }
        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::configuration(
                "database.min_connections exceeds database.max_connections",
            ));
        }
        if !(1..=MAX_TTL_SECONDS).contains(&self.license.default_ttl_seconds) {
            return Err(AppError::configuration(format!(
                "license.default_ttl_seconds must be between 1 and {MAX_TTL_SECONDS}"
            )));
        }
        if let Some(cloud) = &self.cloud {
            cloud.validate()?;
        }
        Ok(())
    }
}
