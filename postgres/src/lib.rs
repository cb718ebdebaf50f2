//! `PostgreSQL` write-side stores for the tenant registry.
//!
//! This crate provides the transactional source of truth and the idempotency
//! cache used by the command handlers:
//!
//! - [`PostgresUserRepository`]: `users_write`, unique on `(email, tenant_id)`
//! - [`PostgresIdempotencyStore`]: `idempotency_keys`, first-writer-wins inserts
//! - [`connect`] and [`migrate`] helpers for the shared pool
//!
//! # Example
//!
//! ```ignore
//! use tenant_registry_postgres::{PostgresIdempotencyStore, PostgresUserRepository};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = tenant_registry_postgres::connect("postgres://localhost/registry", 10).await?;
//!     tenant_registry_postgres::migrate(&pool).await?;
//!
//!     let users = PostgresUserRepository::new(pool.clone());
//!     let idempotency = PostgresIdempotencyStore::new(pool);
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod idempotency;
pub mod user_repository;

pub use idempotency::PostgresIdempotencyStore;
pub use user_repository::PostgresUserRepository;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tenant_registry_core::repository::StoreError;

/// Open a connection pool to the write database.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the connection fails.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))
}

/// Create or update the write-side tables.
///
/// The read side may share this database and its `_sqlx_migrations` table,
/// so versions applied by the projection migrations are ignored.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    let mut migrator = sqlx::migrate!("./migrations");
    migrator.set_ignore_missing(true);
    migrator
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))
}
