//! # Tenant Registry Testing
//!
//! Testing utilities for the tenant registry.
//!
//! This crate provides:
//! - Deterministic environment (`FixedClock`, `SequentialIdGenerator`)
//! - In-memory stores with failure injection
//! - An in-memory event bus with real at-least-once semantics
//!
//! ## Example
//!
//! ```ignore
//! use tenant_registry_testing::*;
//!
//! #[tokio::test]
//! async fn creates_user() {
//!     let repo = Arc::new(InMemoryUserRepository::new());
//!     let idempotency = Arc::new(InMemoryIdempotencyStore::new());
//!     let bus = Arc::new(InMemoryEventBus::new());
//!     let handler = CreateUserHandler::new(repo, idempotency, bus.clone())
//!         .with_clock(Arc::new(test_clock()));
//!
//!     let user_id = handler.handle(command()).await.unwrap();
//!     assert_eq!(bus.published().len(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use tenant_registry_core::environment::{Clock, IdGenerator};

pub mod event_bus;
pub mod stores;

/// Mock implementations of Environment traits.
pub mod mocks {
    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use tenant_registry_testing::mocks::FixedClock;
    /// use tenant_registry_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }

    /// Predictable ids: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Start counting at 1 with the given prefix.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl Default for SequentialIdGenerator {
        fn default() -> Self {
            Self::new("user")
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }
}

/// Test helpers.
pub mod helpers {
    /// Route `tracing` output through the test harness.
    ///
    /// Safe to call from every test; only the first call installs a subscriber.
    pub fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

// Re-export commonly used items
pub use event_bus::{DeadLetter, InMemoryEventBus};
pub use helpers::init_test_tracing;
pub use mocks::{FixedClock, SequentialIdGenerator, test_clock};
pub use stores::{InMemoryIdempotencyStore, InMemoryUserRepository, InMemoryUserViewStore};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn sequential_ids_count_up() {
        let ids = SequentialIdGenerator::new("u");
        assert_eq!(ids.next_id(), "u-1");
        assert_eq!(ids.next_id(), "u-2");
    }
}
