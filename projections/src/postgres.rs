//! `PostgreSQL` read-side store.
//!
//! # Schema
//!
//! Created by `migrations/` (see [`PostgresUserViewStore::migrate`]):
//!
//! ```sql
//! CREATE TABLE users_read (
//!     id           TEXT NOT NULL,
//!     tenant_id    TEXT NOT NULL,
//!     name         TEXT NOT NULL,
//!     email        TEXT NOT NULL,
//!     display_name TEXT,
//!     created_at   TEXT NOT NULL,
//!     PRIMARY KEY (id, tenant_id)
//! );
//! ```
//!
//! The read side may live in its own database; use
//! [`PostgresUserViewStore::new_with_separate_db`] for that.

use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tenant_registry_core::TenantId;
use tenant_registry_core::projection::{ProjectionError, Result, UserView, UserViewStore};

#[derive(FromRow)]
struct UserViewRow {
    id: String,
    tenant_id: String,
    name: String,
    email: String,
    display_name: Option<String>,
    created_at: String,
}

impl From<UserViewRow> for UserView {
    fn from(row: UserViewRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            display_name: row.display_name,
            tenant_id: row.tenant_id,
            created_at: row.created_at,
        }
    }
}

/// `PostgreSQL` implementation of [`UserViewStore`].
#[derive(Clone, Debug)]
pub struct PostgresUserViewStore {
    pool: PgPool,
}

impl PostgresUserViewStore {
    /// Create a store using an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a dedicated read-side database.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if connection fails.
    pub async fn new_with_separate_db(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Failed to connect: {e}")))?;

        Ok(Self::new(pool))
    }

    /// Run read-side migrations.
    ///
    /// Read-side versions start at `20250201000000`, after the write side's.
    /// Versions applied by the write-side migrations are ignored so both
    /// sides can share one database.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] if migration fails.
    pub async fn migrate(&self) -> Result<()> {
        let mut migrator = sqlx::migrate!("./migrations");
        migrator.set_ignore_missing(true);
        migrator
            .run(&self.pool)
            .await
            .map_err(|e| ProjectionError::Storage(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl UserViewStore for PostgresUserViewStore {
    async fn upsert(&self, view: &UserView) -> Result<()> {
        sqlx::query(
            "INSERT INTO users_read (id, tenant_id, name, email, display_name, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (id, tenant_id) DO UPDATE
             SET name = EXCLUDED.name,
                 email = EXCLUDED.email,
                 display_name = EXCLUDED.display_name",
        )
        .bind(&view.id)
        .bind(&view.tenant_id)
        .bind(&view.name)
        .bind(&view.email)
        .bind(&view.display_name)
        .bind(&view.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to upsert user view: {e}")))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &str, tenant_id: &TenantId) -> Result<Option<UserView>> {
        let row: Option<UserViewRow> = sqlx::query_as(
            "SELECT id, tenant_id, name, email, display_name, created_at
             FROM users_read
             WHERE id = $1 AND tenant_id = $2",
        )
        .bind(id)
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to load user view: {e}")))?;

        Ok(row.map(UserView::from))
    }

    async fn find_all(&self, tenant_id: &TenantId) -> Result<Vec<UserView>> {
        let rows: Vec<UserViewRow> = sqlx::query_as(
            "SELECT id, tenant_id, name, email, display_name, created_at
             FROM users_read
             WHERE tenant_id = $1
             ORDER BY created_at DESC, id",
        )
        .bind(tenant_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ProjectionError::Storage(format!("Failed to list user views: {e}")))?;

        Ok(rows.into_iter().map(UserView::from).collect())
    }
}
