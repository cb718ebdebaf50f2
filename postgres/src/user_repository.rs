//! `PostgreSQL` user repository (write side).

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tenant_registry_core::repository::{Result, StoreError, UserRepository};
use tenant_registry_core::user::User;
use tenant_registry_core::value_objects::{Email, PasswordHash};
use tenant_registry_core::{TenantId, UserId};

const SELECT_USER: &str = r"
    SELECT id, tenant_id, name, email, password_hash, display_name, created_at, updated_at
    FROM users_write
";

/// Source of truth for users, backed by the `users_write` table.
///
/// The `(email, tenant_id)` unique constraint is the final arbiter of email
/// uniqueness: two concurrent registrations that both pass the existence check
/// still cannot both insert.
#[derive(Clone, Debug)]
pub struct PostgresUserRepository {
    pool: PgPool,
}

impl PostgresUserRepository {
    /// Create a repository with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_row(row: &PgRow) -> Result<User> {
        let get = |e: sqlx::Error| StoreError::InvalidRecord(e.to_string());

        let email: String = row.try_get("email").map_err(get)?;
        let email = Email::parse(&email)
            .map_err(|e| StoreError::InvalidRecord(format!("stored email rejected: {e}")))?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(get)?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(get)?;

        Ok(User::reconstitute(
            UserId::new(row.try_get::<String, _>("id").map_err(get)?),
            TenantId::new(row.try_get::<String, _>("tenant_id").map_err(get)?),
            row.try_get("name").map_err(get)?,
            email,
            PasswordHash::from_hash(row.try_get::<String, _>("password_hash").map_err(get)?),
            row.try_get("display_name").map_err(get)?,
            created_at,
            updated_at,
        ))
    }
}

fn map_write_error(error: sqlx::Error) -> StoreError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::UniqueViolation(db.message().to_string())
        }
        _ => StoreError::Database(error.to_string()),
    }
}

impl UserRepository for PostgresUserRepository {
    async fn save(&self, user: &User) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO users_write (
                id, tenant_id, name, email, password_hash, display_name, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(user.id().as_str())
        .bind(user.tenant_id().as_str())
        .bind(user.name())
        .bind(user.email().as_str())
        .bind(user.password_hash().as_str())
        .bind(user.display_name())
        .bind(user.created_at())
        .bind(user.updated_at())
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;

        tracing::debug!(user_id = %user.id(), tenant_id = %user.tenant_id(), "User row inserted");
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId, tenant_id: &TenantId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE id = $1 AND tenant_id = $2"))
            .bind(id.as_str())
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn find_by_email(&self, email: &Email, tenant_id: &TenantId) -> Result<Option<User>> {
        let row = sqlx::query(&format!("{SELECT_USER} WHERE email = $1 AND tenant_id = $2"))
            .bind(email.as_str())
            .bind(tenant_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        row.as_ref().map(Self::map_row).transpose()
    }

    async fn exists_by_email(&self, email: &Email, tenant_id: &TenantId) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM users_write WHERE email = $1 AND tenant_id = $2)",
        )
        .bind(email.as_str())
        .bind(tenant_id.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(exists)
    }
}
