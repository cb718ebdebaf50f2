//! Read-path query handlers over the projected [`UserView`]s.

use crate::error::QueryError;
use std::sync::Arc;
use tenant_registry_core::TenantId;
use tenant_registry_core::projection::{UserView, UserViewStore};

/// Fetch one user view.
#[derive(Debug, Clone)]
pub struct GetUser {
    /// User identity
    pub user_id: String,
    /// Owning tenant
    pub tenant_id: TenantId,
}

/// List every user view of a tenant, newest first.
#[derive(Debug, Clone)]
pub struct ListUsers {
    /// Owning tenant
    pub tenant_id: TenantId,
}

/// Serves [`GetUser`] and [`ListUsers`] from the read model.
///
/// Results are eventually consistent with the write side: a user created a
/// moment ago may not be visible until its event has been projected.
pub struct UserQueries<S> {
    views: Arc<S>,
}

impl<S: UserViewStore> UserQueries<S> {
    /// Create query handlers over a view store.
    #[must_use]
    pub const fn new(views: Arc<S>) -> Self {
        Self { views }
    }

    /// Load one view.
    ///
    /// # Errors
    ///
    /// [`QueryError::Validation`] for an empty id, [`QueryError::NotFound`]
    /// if the tenant has no such user, [`QueryError::Storage`] on store failure.
    pub async fn get_user(&self, query: GetUser) -> Result<UserView, QueryError> {
        if query.user_id.trim().is_empty() {
            return Err(QueryError::Validation("user id is required".to_string()));
        }

        self.views
            .find_by_id(&query.user_id, &query.tenant_id)
            .await?
            .ok_or(QueryError::NotFound(query.user_id))
    }

    /// List a tenant's users ordered by creation time, newest first.
    ///
    /// # Errors
    ///
    /// [`QueryError::Storage`] on store failure.
    pub async fn list_users(&self, query: ListUsers) -> Result<Vec<UserView>, QueryError> {
        let views = self.views.find_all(&query.tenant_id).await?;
        tracing::debug!(tenant_id = %query.tenant_id, count = views.len(), "Listed users");
        Ok(views)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tenant_registry_testing::InMemoryUserViewStore;

    fn view(id: &str, tenant: &str, created_at: &str) -> UserView {
        UserView {
            id: id.to_string(),
            name: format!("User {id}"),
            email: format!("{id}@example.com"),
            display_name: None,
            tenant_id: tenant.to_string(),
            created_at: created_at.to_string(),
        }
    }

    async fn seeded() -> (Arc<InMemoryUserViewStore>, UserQueries<InMemoryUserViewStore>) {
        let store = Arc::new(InMemoryUserViewStore::new());
        store.upsert(&view("u1", "acme", "2025-01-01T00:00:00Z")).await.unwrap();
        store.upsert(&view("u2", "acme", "2025-01-02T00:00:00Z")).await.unwrap();
        store.upsert(&view("u3", "globex", "2025-01-03T00:00:00Z")).await.unwrap();
        (Arc::clone(&store), UserQueries::new(store))
    }

    #[tokio::test]
    async fn get_user_is_tenant_scoped() {
        let (_, queries) = seeded().await;

        let found = queries
            .get_user(GetUser {
                user_id: "u1".to_string(),
                tenant_id: TenantId::new("acme"),
            })
            .await
            .unwrap();
        assert_eq!(found.email, "u1@example.com");

        let missing = queries
            .get_user(GetUser {
                user_id: "u1".to_string(),
                tenant_id: TenantId::new("globex"),
            })
            .await;
        assert_eq!(missing, Err(QueryError::NotFound("u1".to_string())));
    }

    #[tokio::test]
    async fn empty_id_is_rejected() {
        let (_, queries) = seeded().await;

        let result = queries
            .get_user(GetUser {
                user_id: String::new(),
                tenant_id: TenantId::new("acme"),
            })
            .await;

        assert!(matches!(result, Err(QueryError::Validation(_))));
    }

    #[tokio::test]
    async fn list_users_newest_first() {
        let (_, queries) = seeded().await;

        let views = queries
            .list_users(ListUsers {
                tenant_id: TenantId::new("acme"),
            })
            .await
            .unwrap();

        let ids: Vec<_> = views.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, ["u2", "u1"]);
    }

    #[tokio::test]
    async fn store_failure_is_reported() {
        let (store, queries) = seeded().await;
        store.fail_next(1);

        let result = queries
            .list_users(ListUsers {
                tenant_id: TenantId::new("acme"),
            })
            .await;

        assert!(matches!(result, Err(QueryError::Storage(_))));
    }
}
