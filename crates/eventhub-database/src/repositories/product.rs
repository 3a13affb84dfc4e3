//! License product repository implementation.

use chrono::Utc;
use sqlx::PgPool;

use eventhub_core::error::{AppError, ErrorKind};
use eventhub_core::result::AppResult;
use eventhub_core::types::ProductId;
use eventhub_entity::license::{LicenseProduct, NewLicenseProduct};

const PRODUCT_COLUMNS: &str = "id, name, capacity, ttl_seconds, created_at, updated_at";

/// Repository for license product reference data.
#[derive(Debug, Clone)]
pub struct LicenseProductRepository {
    pool: PgPool,
}

impl LicenseProductRepository {
    /// Create a new license product repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a product by ID.
    pub async fn find_by_id(&self, id: ProductId) -> AppResult<Option<LicenseProduct>> {
        sqlx::query_as::<_, LicenseProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM license_products WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::StoreUnavailable, "Failed to find product", e))
    }

    /// List all products ordered by name.
    pub async fn list(&self) -> AppResult<Vec<LicenseProduct>> {
        sqlx::query_as::<_, LicenseProduct>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM license_products ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::StoreUnavailable, "Failed to list products", e))
    }

    /// Create a product after validating it.
    pub async fn create(&self, input: &NewLicenseProduct) -> AppResult<LicenseProduct> {
        input.validate()?;
        let now = Utc::now();

        sqlx::query_as::<_, LicenseProduct>(&format!(
            "INSERT INTO license_products (id, name, capacity, ttl_seconds, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(ProductId::new())
        .bind(input.name.trim())
        .bind(input.capacity)
        .bind(input.ttl_seconds)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::conflict(format!("Product '{}' already exists", input.name.trim()))
            }
            _ => AppError::with_source(ErrorKind::StoreUnavailable, "Failed to create product", e),
        })
    }
}
