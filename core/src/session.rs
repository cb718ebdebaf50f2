//! Authentication sessions.

use crate::ids::{TenantId, UserId};
use crate::{DateTime, Utc};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Bytes of entropy in a session token.
const TOKEN_BYTES: usize = 32;

/// A session issued after successful credential verification.
///
/// Sessions are stateless beyond their expiry; there is no revocation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier.
    pub id: String,
    /// Authenticated user.
    pub user_id: UserId,
    /// Tenant the user authenticated against.
    pub tenant_id: TenantId,
    /// Opaque bearer token (base64url, no padding).
    pub token: String,
    /// Expiry instant.
    pub expires_at: DateTime<Utc>,
    /// Issue instant.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Issue a session valid for `ttl` starting at `now`.
    ///
    /// An expiry beyond the representable range saturates at
    /// [`DateTime::<Utc>::MAX_UTC`].
    #[must_use]
    pub fn issue(
        id: String,
        user_id: UserId,
        tenant_id: TenantId,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            id,
            user_id,
            tenant_id,
            token: generate_token(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            created_at: now,
        }
    }

    /// Whether the session has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Generate a cryptographically random 256-bit token.
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn issue_at(now: DateTime<Utc>) -> Session {
        Session::issue(
            "session-1".to_string(),
            UserId::new("user-1"),
            TenantId::new("tenant-1"),
            now,
            chrono::Duration::hours(24),
        )
    }

    #[test]
    fn expires_after_ttl() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let session = issue_at(now);

        assert!(!session.is_expired(now));
        assert!(!session.is_expired(now + chrono::Duration::hours(23)));
        assert!(session.is_expired(now + chrono::Duration::hours(24)));
    }

    #[test]
    fn tokens_are_url_safe_and_unique() {
        let now = Utc::now();
        let a = issue_at(now);
        let b = issue_at(now);

        assert_ne!(a.token, b.token);
        // 32 bytes -> 43 base64 chars without padding
        assert_eq!(a.token.len(), 43);
        assert!(!a.token.contains(['+', '/', '=']));
    }

    #[test]
    fn oversized_ttl_saturates_instead_of_overflowing() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let session = Session::issue(
            "session-1".to_string(),
            UserId::new("user-1"),
            TenantId::new("tenant-1"),
            now,
            chrono::Duration::seconds(1_000_000_000_000_000),
        );

        assert_eq!(session.expires_at, DateTime::<Utc>::MAX_UTC);
        assert!(!session.is_expired(now));
    }
}
