//! Idempotency store for the command boundary.
//!
//! A record maps `(key, tenant_id)` to the result of the first command that
//! used the key. The mapping is write-once: concurrent writers race and the
//! first insert wins, later inserts are dropped without error.

use crate::ids::TenantId;
use crate::repository::Result;
use std::future::Future;

/// Key→result cache scoped by tenant.
pub trait IdempotencyStore: Send + Sync {
    /// Look up a previously stored result.
    ///
    /// `Ok(None)` means the key has not been processed yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::repository::StoreError::Database)
    /// if the store cannot be queried.
    fn is_processed(
        &self,
        key: &str,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Record `result` for `(key, tenant_id)` unless a result already exists.
    ///
    /// An existing record is left untouched and this still returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`](crate::repository::StoreError::Database)
    /// if the insert fails for a reason other than the conflict.
    fn store(
        &self,
        key: &str,
        tenant_id: &TenantId,
        result: &str,
    ) -> impl Future<Output = Result<()>> + Send;
}
