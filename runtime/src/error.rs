//! Error taxonomy of the application layer.
//!
//! Validation and conflict errors are client-correctable and happen before any
//! side effect. Persistence errors leave no partial state, so the whole command
//! can be retried. A publish error happens after the user row is durable.

use tenant_registry_core::UserId;
use tenant_registry_core::ValidationError;
use tenant_registry_core::event_bus::EventBusError;
use tenant_registry_core::projection::ProjectionError;
use tenant_registry_core::repository::StoreError;
use tenant_registry_core::value_objects::PasswordHashError;
use thiserror::Error;

/// Coarse classification used to map errors onto transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input (4xx)
    Validation,
    /// The resource already exists (4xx)
    Conflict,
    /// A store failed; nothing was written (5xx)
    Persistence,
    /// The user exists but the event did not reach the bus (5xx)
    Publish,
}

/// Errors returned by [`CreateUserHandler`](crate::commands::CreateUserHandler).
#[derive(Error, Debug)]
pub enum CreateUserError {
    /// Email, password or name rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A user with this email already exists in the tenant.
    #[error("User already exists: {email}")]
    UserAlreadyExists {
        /// The normalized email that collided
        email: String,
    },

    /// The write store or the password hasher failed.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The user was saved but the `user.created` event was not published.
    ///
    /// The read model will lag until the event is re-emitted; do not retry the
    /// creation.
    #[error("User {user_id} created but event publish failed: {source}")]
    PublishFailed {
        /// Identity of the durable user
        user_id: UserId,
        /// Bus failure
        #[source]
        source: EventBusError,
    },
}

impl CreateUserError {
    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::UserAlreadyExists { .. } => ErrorKind::Conflict,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::PublishFailed { .. } => ErrorKind::Publish,
        }
    }

    /// Whether the caller can fix the request (4xx-equivalent).
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Conflict)
    }

    /// The identity of a user that was created despite the error.
    #[must_use]
    pub const fn created_user_id(&self) -> Option<&UserId> {
        match self {
            Self::PublishFailed { user_id, .. } => Some(user_id),
            _ => None,
        }
    }
}

impl From<StoreError> for CreateUserError {
    fn from(error: StoreError) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<PasswordHashError> for CreateUserError {
    fn from(error: PasswordHashError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Errors returned by [`AuthenticateHandler`](crate::commands::AuthenticateHandler).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthenticateError {
    /// Unknown email or wrong password. The two are indistinguishable.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The user store failed.
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl From<StoreError> for AuthenticateError {
    fn from(error: StoreError) -> Self {
        Self::Persistence(error.to_string())
    }
}

/// Errors returned by the query handlers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Query parameters rejected.
    #[error("Invalid query: {0}")]
    Validation(String),

    /// No view for the requested id in the tenant.
    #[error("User not found: {0}")]
    NotFound(String),

    /// The read store failed.
    #[error("Read model error: {0}")]
    Storage(String),
}

impl From<ProjectionError> for QueryError {
    fn from(error: ProjectionError) -> Self {
        Self::Storage(error.to_string())
    }
}
