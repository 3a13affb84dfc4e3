//! PostgreSQL pool setup and startup checks.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, warn};

use eventhub_core::config::DatabaseConfig;
use eventhub_core::error::{AppError, ErrorKind};

/// Tables the license stores read and write.
const REQUIRED_TABLES: [&str; 2] = ["license_products", "license_slots"];

/// Shared PostgreSQL pool used by the slot store and product repository.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open a pool sized and timed per `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            "Opening PostgreSQL pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::StoreUnavailable,
                    format!("Cannot reach database at {}", redact_url(&config.url)),
                    e,
                )
            })?;

        Ok(Self { pool })
    }

    /// The underlying sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Fail unless the license tables exist.
    ///
    /// Schema changes are applied out of band from `migrations/`, so a
    /// server pointed at an unprepared database stops here instead of on
    /// the first reaper tick.
    pub async fn verify_schema(&self) -> Result<(), AppError> {
        let mut missing = Vec::new();
        for table in REQUIRED_TABLES {
            let present: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
                .bind(table)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::StoreUnavailable, "Schema check failed", e)
                })?;
            if !present {
                missing.push(table);
            }
        }

        if missing.is_empty() {
            info!("License schema present");
            Ok(())
        } else {
            warn!(missing = ?missing, "License schema incomplete");
            Err(AppError::configuration(format!(
                "Database is missing tables: {}; apply migrations/ first",
                missing.join(", ")
            )))
        }
    }

    /// Close every connection, waiting for checked-out ones to return.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

/// Replace the password in a connection URL with `****`.
fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((credentials, host)) = rest.rsplit_once('@') else {
        return url.to_string();
    };
    match credentials.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:****@{host}"),
        None => url.to_string(),
    }
}
