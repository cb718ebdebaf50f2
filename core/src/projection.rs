//! Read model for user queries.
//!
//! # Overview
//!
//! Projections are the **query side of CQRS**. The write side persists a
//! [`User`](crate::user::User) and publishes `user.created`; a projector
//! turns that event into a [`UserView`] row optimized for display.
//!
//! ```text
//! Write Side:                  Read Side:
//! ┌─────────────────┐         ┌─────────────────┐
//! │  users_write    │         │  users_read     │
//! │  idempotency    │         │  (UserView)     │
//! └─────────────────┘         └─────────────────┘
//!         │                            ▲
//!         │ user.created               │ upsert by
//!         │ published                  │ (id, tenant_id)
//!         ▼                            │
//! ┌──────────────────────────────────────┐
//! │         Event Bus (Redpanda)         │
//! └──────────────────────────────────────┘
//! ```
//!
//! The view is owned exclusively by the projector. It is never created on its
//! own, only upserted, which makes replaying the same event harmless.

use crate::ids::TenantId;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Error type for projection operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProjectionError {
    /// Storage backend error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Event could not be mapped onto the view
    #[error("Event processing error: {0}")]
    EventProcessing(String),
}

/// Result type for projection operations.
pub type Result<T> = std::result::Result<T, ProjectionError>;

/// Denormalized user row for the read side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// User identity
    pub id: String,
    /// Full name
    pub name: String,
    /// Normalized email
    pub email: String,
    /// Optional display name
    pub display_name: Option<String>,
    /// Owning tenant
    pub tenant_id: String,
    /// Creation time, `YYYY-MM-DDTHH:MM:SSZ`
    pub created_at: String,
}

/// Storage for [`UserView`] rows keyed by `(id, tenant_id)`.
pub trait UserViewStore: Send + Sync {
    /// Insert the view, or overwrite `name`, `email` and `display_name` if a
    /// row with the same `(id, tenant_id)` exists. `created_at` keeps its
    /// first value.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn upsert(&self, view: &UserView) -> impl Future<Output = Result<()>> + Send;

    /// Load one view.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn find_by_id(
        &self,
        id: &str,
        tenant_id: &TenantId,
    ) -> impl Future<Output = Result<Option<UserView>>> + Send;

    /// All views of a tenant, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Storage`] on backend failure.
    fn find_all(&self, tenant_id: &TenantId) -> impl Future<Output = Result<Vec<UserView>>> + Send;
}
