//! The write-side `User` aggregate.
//!
//! A `User` is created once by the command handler and afterwards only
//! rebuilt from storage. There are no public mutators.

use crate::error::ValidationError;
use crate::ids::{TenantId, UserId};
use crate::value_objects::{Email, PasswordHash};
use crate::{DateTime, Utc};

/// A registered user, scoped to a tenant.
///
/// Invariants held by construction:
/// - `name` is non-empty after trimming
/// - `email` is normalized (see [`Email`])
/// - `created_at == updated_at` for a freshly created user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    id: UserId,
    tenant_id: TenantId,
    name: String,
    email: Email,
    password_hash: PasswordHash,
    display_name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl User {
    /// Create a brand new user.
    ///
    /// A blank `display_name` is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidUserName`] if `name` is blank.
    pub fn new(
        id: UserId,
        tenant_id: TenantId,
        name: &str,
        email: Email,
        password_hash: PasswordHash,
        display_name: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::InvalidUserName);
        }

        Ok(Self {
            id,
            tenant_id,
            name: name.to_string(),
            email,
            password_hash,
            display_name: display_name.filter(|d| !d.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a user from persisted columns without re-running validation.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn reconstitute(
        id: UserId,
        tenant_id: TenantId,
        name: String,
        email: Email,
        password_hash: PasswordHash,
        display_name: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            tenant_id,
            name,
            email,
            password_hash,
            display_name,
            created_at,
            updated_at,
        }
    }

    /// Aggregate identity.
    #[must_use]
    pub const fn id(&self) -> &UserId {
        &self.id
    }

    /// Owning tenant.
    #[must_use]
    pub const fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    /// Full name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Normalized email.
    #[must_use]
    pub const fn email(&self) -> &Email {
        &self.email
    }

    /// Stored password hash.
    #[must_use]
    pub const fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    /// Optional display name.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Check a plaintext password against the stored hash.
    #[must_use]
    pub fn verify_password(&self, plain: &str) -> bool {
        self.password_hash.verify(plain)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn build(name: &str, display_name: Option<&str>) -> Result<User, ValidationError> {
        User::new(
            UserId::new("user-1"),
            TenantId::new("tenant-1"),
            name,
            Email::parse("alice@example.com").unwrap(),
            PasswordHash::from_hash("$argon2id$stub"),
            display_name.map(str::to_string),
            now(),
        )
    }

    #[test]
    fn new_user_has_matching_timestamps() {
        let user = build("Alice", Some("ali")).unwrap();
        assert_eq!(user.name(), "Alice");
        assert_eq!(user.display_name(), Some("ali"));
        assert_eq!(user.created_at(), user.updated_at());
        assert_eq!(user.tenant_id().as_str(), "tenant-1");
    }

    #[test]
    fn blank_name_is_rejected() {
        assert_eq!(build("   ", None), Err(ValidationError::InvalidUserName));
        assert_eq!(build("", None), Err(ValidationError::InvalidUserName));
    }

    #[test]
    fn blank_display_name_becomes_none() {
        let user = build("Alice", Some("  ")).unwrap();
        assert_eq!(user.display_name(), None);
    }

    #[test]
    fn reconstitute_keeps_stored_values() {
        let later = now() + chrono::Duration::hours(1);
        let user = User::reconstitute(
            UserId::new("user-9"),
            TenantId::new("tenant-2"),
            "Bob".to_string(),
            Email::parse("bob@example.com").unwrap(),
            PasswordHash::from_hash("$argon2id$stub"),
            None,
            now(),
            later,
        );
        assert_eq!(user.id().as_str(), "user-9");
        assert_eq!(user.updated_at(), later);
    }
}
