//! # Tenant Registry Core
//!
//! Domain types and seams for the multi-tenant user registry.
//!
//! The registry separates a write path (commands against a transactional
//! store) from a read path (a denormalized view kept in sync by domain events).
//! This crate holds everything both sides agree on and performs no I/O itself.
//!
//! ## Pipeline
//!
//! ```text
//! ┌─────────────────┐
//! │  CreateUser     │
//! │  command        │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │ 1. Idempotency  │────►│ IdempotencyStore │
//! │ 2. Validate     │     └──────────────────┘
//! │ 3. Persist      │────►  UserRepository  (source of truth)
//! └────────┬────────┘
//!          │ EventEnvelope (user.created)
//!          ▼
//! ┌─────────────────┐
//! │   EventBus      │◄─── At-least-once delivery
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │  UserProjector  │────►  UserViewStore (upsert)
//! └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`ids`]: opaque identifiers (`UserId`, `TenantId`, `CorrelationId`, `EventId`)
//! - [`value_objects`]: validated `Email` and hashed `PasswordHash`
//! - [`user`]: the write-side `User` aggregate
//! - [`session`]: authentication sessions
//! - [`event`]: the `DomainEvent` capability and the typed `EventEnvelope`
//! - [`event_bus`]: publisher/bus/handler traits, `Subscriptions`, `RedeliveryPolicy`
//! - [`repository`], [`idempotency`], [`projection`]: storage seams
//! - [`environment`]: injected `Clock` and `IdGenerator`

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};

pub mod error;
pub mod event;
pub mod event_bus;
pub mod idempotency;
pub mod ids;
pub mod projection;
pub mod repository;
pub mod session;
pub mod user;
pub mod value_objects;

pub use error::ValidationError;
pub use ids::{CorrelationId, EventId, TenantId, UserId};

/// Environment module - injected dependencies for deterministic tests.
///
/// Production code uses [`SystemClock`](environment::SystemClock) and
/// [`UuidGenerator`](environment::UuidGenerator); tests swap in fixed
/// implementations from the testing crate.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use tenant_registry_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// Generates identities for new aggregates.
    pub trait IdGenerator: Send + Sync {
        /// Produce a fresh, globally unique identifier.
        fn next_id(&self) -> String;
    }

    /// Random v4 UUIDs.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct UuidGenerator;

    impl IdGenerator for UuidGenerator {
        fn next_id(&self) -> String {
            uuid::Uuid::new_v4().to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{IdGenerator, UuidGenerator};

    #[test]
    fn uuid_generator_never_repeats() {
        let ids = UuidGenerator;
        assert_ne!(ids.next_id(), ids.next_id());
    }
}
