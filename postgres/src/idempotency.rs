//! `PostgreSQL` idempotency store.

use sqlx::PgPool;
use tenant_registry_core::TenantId;
use tenant_registry_core::idempotency::IdempotencyStore;
use tenant_registry_core::repository::{Result, StoreError};

/// Idempotency records in the `idempotency_keys` table.
///
/// Inserts use `ON CONFLICT DO NOTHING` on the `(key, tenant_id)` primary key,
/// so the first writer wins and racing writers succeed silently.
#[derive(Clone, Debug)]
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    /// Create a store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl IdempotencyStore for PostgresIdempotencyStore {
    async fn is_processed(&self, key: &str, tenant_id: &TenantId) -> Result<Option<String>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT result FROM idempotency_keys WHERE key = $1 AND tenant_id = $2")
                .bind(key)
                .bind(tenant_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(|(result,)| result))
    }

    async fn store(&self, key: &str, tenant_id: &TenantId, result: &str) -> Result<()> {
        let inserted = sqlx::query(
            r"
            INSERT INTO idempotency_keys (key, tenant_id, result, created_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (key, tenant_id) DO NOTHING
            ",
        )
        .bind(key)
        .bind(tenant_id.as_str())
        .bind(result)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?
        .rows_affected();

        if inserted == 0 {
            tracing::debug!(tenant_id = %tenant_id, "Idempotency key already recorded, keeping first result");
        }
        Ok(())
    }
}
