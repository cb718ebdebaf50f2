//! Domain events and the typed envelope that carries them across the bus.
//!
//! Every event travels as an [`EventEnvelope`]: a fixed header (`id`,
//! `aggregate_id`, `tenant_id`, `correlation_id`, `timestamp`) plus a payload
//! tagged by its event type. On the wire this is a single flat JSON object:
//!
//! ```json
//! {
//!   "id": "3f0c…",
//!   "type": "user.created",
//!   "aggregate_id": "u-1",
//!   "tenant_id": "acme",
//!   "correlation_id": "req-42",
//!   "timestamp": "2025-01-01T00:00:00Z",
//!   "user_id": "u-1",
//!   "name": "Alice",
//!   "email": "alice@example.com",
//!   "display_name": "ali"
//! }
//! ```
//!
//! The `type` field doubles as the routing key. Consumers decode straight into
//! [`EventPayload`] and match on the variant instead of re-marshaling untyped
//! maps.
//!
//! # Example
//!
//! ```
//! use tenant_registry_core::event::{DomainEvent, EventEnvelope, EventPayload, UserCreated};
//! use tenant_registry_core::{CorrelationId, TenantId, UserId, Utc};
//!
//! let envelope = EventEnvelope::new(
//!     "u-1",
//!     TenantId::new("acme"),
//!     CorrelationId::new("req-42"),
//!     Utc::now(),
//!     EventPayload::UserCreated(UserCreated {
//!         user_id: UserId::new("u-1"),
//!         name: "Alice".into(),
//!         email: "alice@example.com".into(),
//!         display_name: None,
//!     }),
//! );
//!
//! assert_eq!(envelope.event_type(), "user.created");
//! let bytes = envelope.to_json().unwrap();
//! assert_eq!(EventEnvelope::from_json(&bytes).unwrap(), envelope);
//! ```

use crate::ids::{CorrelationId, EventId, TenantId, UserId};
use crate::user::User;
use crate::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Routing key of [`UserCreated`].
pub const USER_CREATED: &str = "user.created";

/// Error types for event operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// Failed to serialize an envelope.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),

    /// Bytes were not a valid envelope (malformed JSON or unknown `type`).
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),
}

/// Capability every domain event exposes, regardless of payload.
pub trait DomainEvent {
    /// Unique id of this event instance.
    fn event_id(&self) -> &EventId;

    /// Routing key, e.g. `"user.created"`.
    fn event_type(&self) -> &'static str;

    /// When the event happened.
    fn occurred_on(&self) -> DateTime<Utc>;

    /// Identity of the aggregate the event is about.
    fn aggregate_id(&self) -> &str;

    /// Owning tenant.
    fn tenant_id(&self) -> &TenantId;

    /// Tracing token of the request that caused the event.
    fn correlation_id(&self) -> &CorrelationId;
}

/// A user was registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserCreated {
    /// The new user's identity.
    pub user_id: UserId,
    /// Full name.
    pub name: String,
    /// Normalized email.
    pub email: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Typed event payload, tagged on the wire by `type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// See [`UserCreated`].
    #[serde(rename = "user.created")]
    UserCreated(UserCreated),
}

impl EventPayload {
    /// Routing key of this payload.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::UserCreated(_) => USER_CREATED,
        }
    }
}

/// Immutable event envelope.
///
/// Fields are private: an envelope is either built with [`EventEnvelope::new`]
/// (which assigns a fresh [`EventId`]) or decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    id: EventId,
    aggregate_id: String,
    tenant_id: TenantId,
    correlation_id: CorrelationId,
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    payload: EventPayload,
}

impl EventEnvelope {
    /// Wrap a payload, generating a new event id.
    #[must_use]
    pub fn new(
        aggregate_id: impl Into<String>,
        tenant_id: TenantId,
        correlation_id: CorrelationId,
        timestamp: DateTime<Utc>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: EventId::generate(),
            aggregate_id: aggregate_id.into(),
            tenant_id,
            correlation_id,
            timestamp,
            payload,
        }
    }

    /// Build the `user.created` event for a freshly persisted user.
    #[must_use]
    pub fn user_created(user: &User, correlation_id: CorrelationId, now: DateTime<Utc>) -> Self {
        Self::new(
            user.id().as_str(),
            user.tenant_id().clone(),
            correlation_id,
            now,
            EventPayload::UserCreated(UserCreated {
                user_id: user.id().clone(),
                name: user.name().to_string(),
                email: user.email().as_str().to_string(),
                display_name: user.display_name().map(str::to_string),
            }),
        )
    }

    /// The typed payload.
    #[must_use]
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Encode to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn to_json(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Decode from the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::DeserializationError`] for malformed JSON, a
    /// missing header field, or an unknown `type`.
    pub fn from_json(bytes: &[u8]) -> Result<Self, EventError> {
        serde_json::from_slice(bytes).map_err(|e| EventError::DeserializationError(e.to_string()))
    }
}

impl DomainEvent for EventEnvelope {
    fn event_id(&self) -> &EventId {
        &self.id
    }

    fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn aggregate_id(&self) -> &str {
        &self.aggregate_id
    }

    fn tenant_id(&self) -> &TenantId {
        &self.tenant_id
    }

    fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }
}
