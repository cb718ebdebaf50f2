//! Write-side user storage.

use crate::ids::{TenantId, UserId};
use crate::user::User;
use crate::value_objects::Email;
use std::future::Future;
use thiserror::Error;

/// Errors raised by the write-side stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store unreachable or the statement failed
    #[error("Database error: {0}")]
    Database(String),

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A stored row could not be turned back into a domain value
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Transactional source of truth for users.
///
/// Every lookup is tenant-scoped. The `(email, tenant_id)` pair is unique; an
/// insert that violates it returns [`StoreError::UniqueViolation`].
pub trait UserRepository: Send + Sync {
    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// [`StoreError::UniqueViolation`] if the email is taken in the tenant,
    /// [`StoreError::Database`] on any other failure.
    fn save(&self, user: &User) -> impl Future<Output = Result<()>> + Send;

    /// Load a user by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] or [`StoreError::InvalidRecord`].
    fn find_by_id(
        &self,
        id: &UserId,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Load a user by normalized email.
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`] or [`StoreError::InvalidRecord`].
    fn find_by_email(
        &self,
        email: &Email,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<User>>> + Send;

    /// Whether the email is already registered in the tenant.
    ///
    /// Default implementation uses [`UserRepository::find_by_email`].
    ///
    /// # Errors
    ///
    /// [`StoreError::Database`].
    fn exists_by_email(
        &self,
        email: &Email,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<bool>> + Send {
        async move { Ok(self.find_by_email(email, tenant_id).await?.is_some()) }
    }
}
