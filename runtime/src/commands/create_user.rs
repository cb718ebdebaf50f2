//! `CreateUser`: the idempotent write-path command.

use crate::error::CreateUserError;
use std::fmt;
use std::sync::Arc;
use tenant_registry_core::environment::{Clock, IdGenerator, SystemClock, UuidGenerator};
use tenant_registry_core::event::{DomainEvent, EventEnvelope};
use tenant_registry_core::event_bus::EventPublisher;
use tenant_registry_core::idempotency::IdempotencyStore;
use tenant_registry_core::repository::{StoreError, UserRepository};
use tenant_registry_core::user::User;
use tenant_registry_core::value_objects::{Email, PasswordHash};
use tenant_registry_core::{CorrelationId, TenantId, UserId, ValidationError};

/// Request to register a user in a tenant.
#[derive(Clone)]
pub struct CreateUserCommand {
    /// Full name (must not be blank)
    pub name: String,
    /// Raw email as typed by the client
    pub email: String,
    /// Plaintext password, hashed before storage
    pub password: String,
    /// Optional display name
    pub display_name: Option<String>,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Tracing token propagated onto the event
    pub correlation_id: CorrelationId,
    /// Client-chosen token making retries safe. Empty counts as absent.
    pub idempotency_key: Option<String>,
}

impl CreateUserCommand {
    fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref().filter(|k| !k.is_empty())
    }
}

impl fmt::Debug for CreateUserCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreateUserCommand")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .field("tenant_id", &self.tenant_id)
            .field("correlation_id", &self.correlation_id)
            .field("idempotency_key", &self.idempotency_key)
            .finish()
    }
}

/// Orchestrates idempotency check → validation → persistence → publish.
///
/// The three side effects (user insert, idempotency insert, publish) are not
/// linked by a transaction. A crash between save and publish leaves a user
/// without a `user.created` event.
pub struct CreateUserHandler<R, I> {
    users: Arc<R>,
    idempotency: Arc<I>,
    publisher: Arc<dyn EventPublisher>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl<R, I> CreateUserHandler<R, I>
where
    R: UserRepository,
    I: IdempotencyStore,
{
    /// Create a handler using the system clock and random UUIDs.
    #[must_use]
    pub fn new(users: Arc<R>, idempotency: Arc<I>, publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            users,
            idempotency,
            publisher,
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the identity generator.
    #[must_use]
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Execute the command and return the identity of the user.
    ///
    /// A replayed idempotency key returns the identity stored by the first
    /// call without touching anything else.
    ///
    /// # Errors
    ///
    /// - [`CreateUserError::Validation`]: bad email, weak password or blank name
    /// - [`CreateUserError::UserAlreadyExists`]: email taken in the tenant
    /// - [`CreateUserError::Persistence`]: a store failed, nothing was written
    /// - [`CreateUserError::PublishFailed`]: the user exists but the event was
    ///   not published; carries the new identity
    pub async fn handle(&self, command: CreateUserCommand) -> Result<UserId, CreateUserError> {
        let tenant_id = &command.tenant_id;

        if let Some(key) = command.idempotency_key() {
            if let Some(existing) = self.idempotency.is_processed(key, tenant_id).await? {
                tracing::info!(
                    tenant_id = %tenant_id,
                    correlation_id = %command.correlation_id,
                    user_id = %existing,
                    "Idempotent replay, returning stored result"
                );
                metrics::counter!("users.create.idempotent_replay").increment(1);
                return Ok(UserId::new(existing));
            }
        }

        let email = Email::parse(&command.email)?;

        if self.users.exists_by_email(&email, tenant_id).await? {
            return Err(CreateUserError::UserAlreadyExists {
                email: email.as_str().to_string(),
            });
        }

        PasswordHash::validate(&command.password).map_err(ValidationError::from)?;
        let password_hash = PasswordHash::hash(&command.password)?;

        let now = self.clock.now();
        let user = User::new(
            UserId::new(self.ids.next_id()),
            tenant_id.clone(),
            &command.name,
            email,
            password_hash,
            command.display_name.clone(),
            now,
        )?;

        self.users.save(&user).await.map_err(|error| match error {
            // Lost a race against a concurrent insert of the same email.
            StoreError::UniqueViolation(_) => CreateUserError::UserAlreadyExists {
                email: user.email().as_str().to_string(),
            },
            other => other.into(),
        })?;

        tracing::info!(
            tenant_id = %tenant_id,
            correlation_id = %command.correlation_id,
            user_id = %user.id(),
            "User created"
        );
        metrics::counter!("users.created").increment(1);

        if let Some(key) = command.idempotency_key() {
            if let Err(error) = self.idempotency.store(key, tenant_id, user.id().as_str()).await {
                // Not fatal: a retry of this request re-executes and then
                // surfaces as UserAlreadyExists instead of a clean replay.
                tracing::warn!(
                    tenant_id = %tenant_id,
                    correlation_id = %command.correlation_id,
                    user_id = %user.id(),
                    error = %error,
                    "Failed to store idempotency key, command still succeeds"
                );
            }
        }

        let event = EventEnvelope::user_created(&user, command.correlation_id.clone(), now);
        if let Err(source) = self.publisher.publish(&event).await {
            tracing::error!(
                tenant_id = %tenant_id,
                correlation_id = %command.correlation_id,
                user_id = %user.id(),
                event_id = %event.event_id(),
                error = %source,
                "User created but event publish failed, read model will lag"
            );
            metrics::counter!("users.create.publish_failed").increment(1);
            return Err(CreateUserError::PublishFailed {
                user_id: user.id().clone(),
                source,
            });
        }

        Ok(user.id().clone())
    }
}
