//! In-memory store implementations.
//!
//! Each store keeps its rows in an `Arc<RwLock<HashMap>>` and supports
//! failure injection: `fail_next(n)` makes the next `n` operations return a
//! backend error without touching the data.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use tenant_registry_core::idempotency::IdempotencyStore;
use tenant_registry_core::projection::{self, ProjectionError, UserView, UserViewStore};
use tenant_registry_core::repository::{self, StoreError, UserRepository};
use tenant_registry_core::user::User;
use tenant_registry_core::value_objects::Email;
use tenant_registry_core::{TenantId, UserId};

/// Consume one injected failure if any are armed.
fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// In-memory write store enforcing `(email, tenant_id)` uniqueness.
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<(TenantId, UserId), User>>>,
    failures: Arc<AtomicU32>,
}

impl InMemoryUserRepository {
    /// Create a new empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` operations with [`StoreError::Database`].
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of stored users across all tenants
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    /// Check if the repository is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().unwrap().is_empty()
    }

    fn check_failure(&self) -> repository::Result<()> {
        if take_failure(&self.failures) {
            return Err(StoreError::Database("injected failure".to_string()));
        }
        Ok(())
    }
}

impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: &User) -> repository::Result<()> {
        self.check_failure()?;
        let mut users = self.users.write().unwrap();

        let taken = users
            .values()
            .any(|u| u.tenant_id() == user.tenant_id() && u.email() == user.email());
        if taken {
            return Err(StoreError::UniqueViolation(format!(
                "email '{}' already registered",
                user.email()
            )));
        }

        users.insert((user.tenant_id().clone(), user.id().clone()), user.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &UserId, tenant_id: &TenantId) -> repository::Result<Option<User>> {
        self.check_failure()?;
        let users = self.users.read().unwrap();
        Ok(users.get(&(tenant_id.clone(), id.clone())).cloned())
    }

    async fn find_by_email(
        &self,
        email: &Email,
        tenant_id: &TenantId,
    ) -> repository::Result<Option<User>> {
        self.check_failure()?;
        let users = self.users.read().unwrap();
        Ok(users
            .values()
            .find(|u| u.tenant_id() == tenant_id && u.email() == email)
            .cloned())
    }
}

/// In-memory idempotency store with first-writer-wins inserts.
#[derive(Clone, Debug, Default)]
pub struct InMemoryIdempotencyStore {
    records: Arc<RwLock<HashMap<(String, TenantId), String>>>,
    lookup_failures: Arc<AtomicU32>,
    store_failures: Arc<AtomicU32>,
}

impl InMemoryIdempotencyStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` lookups.
    pub fn fail_next_lookup(&self, n: u32) {
        self.lookup_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` inserts.
    pub fn fail_next_store(&self, n: u32) {
        self.store_failures.store(n, Ordering::SeqCst);
    }

    /// Stored result for a key, bypassing failure injection.
    #[must_use]
    pub fn get(&self, key: &str, tenant_id: &TenantId) -> Option<String> {
        self.records
            .read()
            .unwrap()
            .get(&(key.to_string(), tenant_id.clone()))
            .cloned()
    }

    /// Number of records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().unwrap().is_empty()
    }
}

impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn is_processed(&self, key: &str, tenant_id: &TenantId) -> repository::Result<Option<String>> {
        if take_failure(&self.lookup_failures) {
            return Err(StoreError::Database("injected lookup failure".to_string()));
        }
        Ok(self.get(key, tenant_id))
    }

    async fn store(&self, key: &str, tenant_id: &TenantId, result: &str) -> repository::Result<()> {
        if take_failure(&self.store_failures) {
            return Err(StoreError::Database("injected store failure".to_string()));
        }
        self.records
            .write()
            .unwrap()
            .entry((key.to_string(), tenant_id.clone()))
            .or_insert_with(|| result.to_string());
        Ok(())
    }
}

/// In-memory read model keyed by `(id, tenant_id)`.
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserViewStore {
    views: Arc<RwLock<HashMap<(String, String), UserView>>>,
    failures: Arc<AtomicU32>,
    upserts: Arc<AtomicU32>,
}

impl InMemoryUserViewStore {
    /// Create a new empty view store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` operations with [`ProjectionError::Storage`].
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Number of rows across all tenants
    #[must_use]
    pub fn len(&self) -> usize {
        self.views.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.views.read().unwrap().is_empty()
    }

    /// Successful upserts so far, including ones that overwrote a row.
    #[must_use]
    pub fn upsert_count(&self) -> u32 {
        self.upserts.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> projection::Result<()> {
        if take_failure(&self.failures) {
            return Err(ProjectionError::Storage("injected failure".to_string()));
        }
        Ok(())
    }
}

impl UserViewStore for InMemoryUserViewStore {
    async fn upsert(&self, view: &UserView) -> projection::Result<()> {
        self.check_failure()?;
        let mut views = self.views.write().unwrap();
        views
            .entry((view.id.clone(), view.tenant_id.clone()))
            .and_modify(|existing| {
                existing.name.clone_from(&view.name);
                existing.email.clone_from(&view.email);
                existing.display_name.clone_from(&view.display_name);
            })
            .or_insert_with(|| view.clone());
        self.upserts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: &str, tenant_id: &TenantId) -> projection::Result<Option<UserView>> {
        self.check_failure()?;
        let views = self.views.read().unwrap();
        Ok(views.get(&(id.to_string(), tenant_id.to_string())).cloned())
    }

    async fn find_all(&self, tenant_id: &TenantId) -> projection::Result<Vec<UserView>> {
        self.check_failure()?;
        let views = self.views.read().unwrap();
        let mut found: Vec<UserView> = views
            .values()
            .filter(|v| v.tenant_id == tenant_id.as_str())
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_clock;
    use tenant_registry_core::environment::Clock;
    use tenant_registry_core::value_objects::PasswordHash;

    fn user(id: &str, tenant: &str, email: &str) -> User {
        User::new(
            UserId::new(id),
            TenantId::new(tenant),
            "Test",
            Email::parse(email).unwrap(),
            PasswordHash::from_hash("$argon2id$stub"),
            None,
            test_clock().now(),
        )
        .unwrap()
    }

    fn view(id: &str, tenant: &str, name: &str, created_at: &str) -> UserView {
        UserView {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{id}@example.com"),
            display_name: None,
            tenant_id: tenant.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[tokio::test]
    async fn email_is_unique_per_tenant_only() {
        let repo = InMemoryUserRepository::new();
        repo.save(&user("u1", "a", "x@example.com")).await.unwrap();

        let dup = repo.save(&user("u2", "a", "x@example.com")).await;
        assert!(matches!(dup, Err(StoreError::UniqueViolation(_))));

        repo.save(&user("u3", "b", "x@example.com")).await.unwrap();
        assert_eq!(repo.len(), 2);

        let email = Email::parse("x@example.com").unwrap();
        assert!(repo.exists_by_email(&email, &TenantId::new("b")).await.unwrap());
        assert!(!repo.exists_by_email(&email, &TenantId::new("c")).await.unwrap());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let repo = InMemoryUserRepository::new();
        repo.fail_next(1);

        let first = repo.find_by_id(&UserId::new("u"), &TenantId::new("t")).await;
        assert!(matches!(first, Err(StoreError::Database(_))));
        let second = repo.find_by_id(&UserId::new("u"), &TenantId::new("t")).await;
        assert_eq!(second, Ok(None));
    }

    #[tokio::test]
    async fn idempotency_first_writer_wins() {
        let store = InMemoryIdempotencyStore::new();
        let tenant = TenantId::new("t");

        assert_eq!(store.is_processed("k", &tenant).await, Ok(None));
        store.store("k", &tenant, "first").await.unwrap();
        store.store("k", &tenant, "second").await.unwrap();

        assert_eq!(store.is_processed("k", &tenant).await, Ok(Some("first".to_string())));
        assert_eq!(store.is_processed("k", &TenantId::new("other")).await, Ok(None));
    }

    #[tokio::test]
    async fn upsert_keeps_created_at_and_overwrites_fields() {
        let store = InMemoryUserViewStore::new();
        store.upsert(&view("u1", "t", "Old", "2025-01-01T00:00:00Z")).await.unwrap();
        store.upsert(&view("u1", "t", "New", "2030-01-01T00:00:00Z")).await.unwrap();

        let found = store.find_by_id("u1", &TenantId::new("t")).await.unwrap().unwrap();
        assert_eq!(found.name, "New");
        assert_eq!(found.created_at, "2025-01-01T00:00:00Z");
        assert_eq!(store.len(), 1);
        assert_eq!(store.upsert_count(), 2);
    }

    #[tokio::test]
    async fn find_all_is_tenant_scoped_and_newest_first() {
        let store = InMemoryUserViewStore::new();
        store.upsert(&view("old", "t", "A", "2025-01-01T00:00:00Z")).await.unwrap();
        store.upsert(&view("new", "t", "B", "2025-06-01T00:00:00Z")).await.unwrap();
        store.upsert(&view("x", "other", "C", "2025-03-01T00:00:00Z")).await.unwrap();

        let all = store.find_all(&TenantId::new("t")).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }
}
