//! Read-model projection for the tenant registry.
//!
//! # Overview
//!
//! This crate provides the read side of the registry:
//! - [`UserProjector`]: bus subscriber turning `user.created` into a `UserView` upsert
//! - [`PostgresUserViewStore`]: `PostgreSQL` storage for `UserView` rows
//!
//! # CQRS Separation
//!
//! The read model may use a **separate database** from the write store:
//!
//! ```text
//! Write DB (users_write)  →  Event Bus  →  Read DB (users_read)
//! ```
//!
//! # Wiring
//!
//! ```ignore
//! use tenant_registry_projections::{PostgresUserViewStore, UserProjector};
//!
//! let store = PostgresUserViewStore::new_with_separate_db(&url, 10).await?;
//! store.migrate().await?;
//!
//! let subscriptions = Subscriptions::new()
//!     .subscribe(USER_CREATED, Arc::new(UserProjector::new(store)));
//! bus.start(subscriptions).await?;
//! ```

pub mod postgres;
pub mod user_projector;

// Re-export main types for convenience
pub use postgres::PostgresUserViewStore;
pub use user_projector::{CREATED_AT_FORMAT, UserProjector};
