//! `Authenticate`: credential verification and session issue.

use crate::error::AuthenticateError;
use std::fmt;
use std::sync::Arc;
use tenant_registry_core::TenantId;
use tenant_registry_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use tenant_registry_core::repository::UserRepository;
use tenant_registry_core::session::Session;
use tenant_registry_core::value_objects::Email;

/// Default lifetime of an issued session, in seconds (24 hours).
pub const DEFAULT_SESSION_TTL_SECS: i64 = 86_400;

/// Login request.
#[derive(Clone)]
pub struct AuthenticateCommand {
    /// Raw email; normalized before lookup
    pub email: String,
    /// Plaintext password
    pub password: String,
    /// Tenant to authenticate against
    pub tenant_id: TenantId,
}

impl fmt::Debug for AuthenticateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateCommand")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

/// Verifies credentials against the write store and issues a [`Session`].
pub struct AuthenticateHandler<R> {
    users: Arc<R>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    ttl: chrono::Duration,
}

impl<R: UserRepository> AuthenticateHandler<R> {
    /// Create a handler with a 24 hour session lifetime.
    #[must_use]
    pub fn new(users: Arc<R>) -> Self {
        Self {
            users,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            ttl: chrono::Duration::seconds(DEFAULT_SESSION_TTL_SECS),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the session id generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Override the session lifetime.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Verify the credentials and issue a session.
    ///
    /// # Errors
    ///
    /// [`AuthenticateError::InvalidCredentials`] for a malformed or unknown
    /// email and for a wrong password; [`AuthenticateError::Persistence`] if
    /// the store fails.
    pub async fn handle(&self, command: AuthenticateCommand) -> Result<Session, AuthenticateError> {
        let Ok(email) = Email::parse(&command.email) else {
            return Err(AuthenticateError::InvalidCredentials);
        };

        let Some(user) = self.users.find_by_email(&email, &command.tenant_id).await? else {
            tracing::debug!(tenant_id = %command.tenant_id, "Authentication failed: unknown email");
            return Err(AuthenticateError::InvalidCredentials);
        };

        if !user.verify_password(&command.password) {
            tracing::debug!(
                tenant_id = %command.tenant_id,
                user_id = %user.id(),
                "Authentication failed: wrong password"
            );
            return Err(AuthenticateError::InvalidCredentials);
        }

        let session = Session::issue(
            self.ids.next_id(),
            user.id().clone(),
            command.tenant_id.clone(),
            self.clock.now(),
            self.ttl,
        );

        tracing::info!(
            tenant_id = %command.tenant_id,
            user_id = %user.id(),
            expires_at = %session.expires_at,
            "Session issued"
        );
        metrics::counter!("auth.sessions.issued").increment(1);

        Ok(session)
    }
}
