//! `user.created` → `UserView` projector.

use std::future::Future;
use std::pin::Pin;
use tenant_registry_core::event::{DomainEvent, EventEnvelope, EventPayload, UserCreated};
use tenant_registry_core::event_bus::{EventHandler, HandlerError};
use tenant_registry_core::projection::{Result, UserView, UserViewStore};

/// Timestamp layout of `UserView::created_at`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Keeps the user read model in sync with `user.created` events.
///
/// Every event is applied as an upsert keyed by `(aggregate_id, tenant_id)`,
/// so a redelivered event rewrites the same row with the same values.
///
/// # Example
///
/// ```ignore
/// let projector = Arc::new(UserProjector::new(view_store));
/// let subscriptions = Subscriptions::new().subscribe(USER_CREATED, projector);
/// bus.start(subscriptions).await?;
/// ```
#[derive(Debug, Clone)]
pub struct UserProjector<S> {
    store: S,
}

impl<S: UserViewStore> UserProjector<S> {
    /// Project into `store`.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying view store.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Apply one event to the read model.
    ///
    /// # Errors
    ///
    /// Propagates store failures so the bus can redeliver.
    pub async fn project(&self, event: &EventEnvelope) -> Result<()> {
        match event.payload() {
            EventPayload::UserCreated(created) => self.project_user_created(event, created).await,
        }
    }

    async fn project_user_created(&self, event: &EventEnvelope, created: &UserCreated) -> Result<()> {
        let view = UserView {
            id: event.aggregate_id().to_string(),
            name: created.name.clone(),
            email: created.email.clone(),
            display_name: created.display_name.clone(),
            tenant_id: event.tenant_id().to_string(),
            created_at: event.occurred_on().format(CREATED_AT_FORMAT).to_string(),
        };

        self.store.upsert(&view).await?;

        tracing::info!(
            user_id = %view.id,
            tenant_id = %view.tenant_id,
            event_id = %event.event_id(),
            correlation_id = %event.correlation_id(),
            "User view projected"
        );
        metrics::counter!("projection.user_views.upserted").increment(1);
        Ok(())
    }
}

impl<S: UserViewStore + 'static> EventHandler for UserProjector<S> {
    fn name(&self) -> &str {
        "user_projector"
    }

    fn handle<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move { self.project(event).await.map_err(HandlerError::from) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tenant_registry_core::environment::Clock;
    use tenant_registry_core::{CorrelationId, TenantId, UserId};
    use tenant_registry_testing::{InMemoryUserViewStore, test_clock};

    fn user_created(user: &str, tenant: &str, name: &str) -> EventEnvelope {
        EventEnvelope::new(
            user,
            TenantId::new(tenant),
            CorrelationId::new("req-1"),
            test_clock().now(),
            EventPayload::UserCreated(UserCreated {
                user_id: UserId::new(user),
                name: name.to_string(),
                email: format!("{user}@example.com"),
                display_name: Some("nick".to_string()),
            }),
        )
    }

    #[tokio::test]
    async fn maps_event_onto_view() {
        let store = InMemoryUserViewStore::new();
        let projector = UserProjector::new(store.clone());

        projector.project(&user_created("u1", "acme", "Alice")).await.unwrap();

        let view = store.find_by_id("u1", &TenantId::new("acme")).await.unwrap().unwrap();
        assert_eq!(
            view,
            UserView {
                id: "u1".to_string(),
                name: "Alice".to_string(),
                email: "u1@example.com".to_string(),
                display_name: Some("nick".to_string()),
                tenant_id: "acme".to_string(),
                created_at: "2025-01-01T00:00:00Z".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn replaying_the_same_event_is_idempotent() {
        let store = InMemoryUserViewStore::new();
        let projector = UserProjector::new(store.clone());
        let event = user_created("u1", "acme", "Alice");

        projector.project(&event).await.unwrap();
        let first = store.find_by_id("u1", &TenantId::new("acme")).await.unwrap();
        projector.project(&event).await.unwrap();
        let second = store.find_by_id("u1", &TenantId::new("acme")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn same_id_in_other_tenant_is_a_separate_row() {
        let store = InMemoryUserViewStore::new();
        let projector = UserProjector::new(store.clone());

        projector.project(&user_created("u1", "a", "Alice")).await.unwrap();
        projector.project(&user_created("u1", "b", "Bob")).await.unwrap();

        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn store_failure_surfaces_as_handler_error() {
        let store = InMemoryUserViewStore::new();
        store.fail_next(1);
        let projector: Arc<dyn EventHandler> = Arc::new(UserProjector::new(store.clone()));
        let event = user_created("u1", "acme", "Alice");

        assert!(matches!(
            projector.handle(&event).await,
            Err(HandlerError::Projection(_))
        ));
        assert!(store.is_empty());

        projector.handle(&event).await.unwrap();
        assert_eq!(store.len(), 1);
    }
}
