//! Event bus abstraction connecting the write path to its subscribers.
//!
//! The command handler only ever sees an [`EventPublisher`]. The consumer
//! process owns a full [`EventBus`], builds a [`Subscriptions`] registry once
//! at startup and hands it to [`EventBus::start`] by value. Nothing mutates
//! the registry after that.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ CreateUser      │
//! │ 1. Save user    │◄─── Source of truth
//! └────────┬────────┘
//!          │ publish(envelope)
//!          ▼
//! ┌─────────────────┐
//! │   Event Bus     │◄─── At-least-once delivery
//! │ topic per type  │
//! └────────┬────────┘
//!          │ one consumption loop per event type
//!          ▼
//! ┌─────────────────┐
//! │ Subscriptions   │ handlers run in order,
//! │  ::deliver      │ ack only if all succeed
//! └─────────────────┘
//! ```
//!
//! # Key Principles
//!
//! - **At-least-once**: a message is acknowledged only after every handler
//!   registered for its type succeeded. Any failure redelivers the message to
//!   the *whole* handler list, so handlers must be idempotent.
//! - **Independent loops**: each event type is consumed by its own loop; a
//!   stuck handler for one type never blocks another.
//! - **Explicit redelivery**: [`RedeliveryPolicy`] decides how long to wait
//!   between attempts and whether to give up.
//!
//! # Implementations
//!
//! - `InMemoryEventBus` in the testing crate
//! - `RedpandaEventBus` in the redpanda crate (Kafka-compatible)

use crate::event::{DomainEvent, EventEnvelope};
use crate::projection::ProjectionError;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors that can occur during event bus operations.
#[derive(Error, Debug, Clone)]
pub enum EventBusError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to publish an event to a topic
    #[error("Publish failed for topic '{topic}': {reason}")]
    PublishFailed {
        /// The topic that failed
        topic: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// Failed to serialize an event for the wire
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// `start` was called twice
    #[error("Event bus already started")]
    AlreadyStarted,

    /// The bus has been closed
    #[error("Event bus is closed")]
    Closed,

    /// Consumption loops did not stop in time
    #[error("Shutdown timed out after {0:?}")]
    ShutdownTimeout(Duration),

    /// Generic error for other failures
    #[error("Event bus error: {0}")]
    Other(String),
}

/// Error returned by an [`EventHandler`].
///
/// Any handler error causes the message to be redelivered.
#[derive(Error, Debug, Clone)]
pub enum HandlerError {
    /// The read model could not be updated
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// Any other failure
    #[error("Handler failed: {0}")]
    Other(String),
}

/// Publishing side of the bus.
///
/// # Dyn Compatibility
///
/// This trait uses explicit `Pin<Box<dyn Future>>` returns instead of `async fn`
/// to enable trait object usage (`Arc<dyn EventPublisher>`), which is how the
/// command handler holds it.
pub trait EventPublisher: Send + Sync {
    /// Publish an event under its event type.
    ///
    /// Publishing is durable (the broker has persisted the record when this
    /// returns `Ok`) and carries the event's correlation id as message
    /// metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::PublishFailed`] if the broker rejects or times
    /// out the record, [`EventBusError::SerializationFailed`] if encoding fails.
    fn publish<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>>;
}

/// A subscriber invoked for every delivered event of the types it is
/// registered for.
pub trait EventHandler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Handle one delivery. May be called more than once for the same event.
    ///
    /// # Errors
    ///
    /// Returning an error negatively acknowledges the message.
    fn handle<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

/// Full bus: publish plus consumption lifecycle.
pub trait EventBus: EventPublisher {
    /// Begin consuming every event type in `subscriptions`.
    ///
    /// One independent loop is spawned per event type. Returns once the loops
    /// are running.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::AlreadyStarted`] on a second call, or a
    /// transport error if a consumer cannot be created.
    fn start(
        &self,
        subscriptions: Subscriptions,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;

    /// Stop all loops and release the transport. Call once, at shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ShutdownTimeout`] if a loop had to be aborted.
    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>>;
}

type HandlerList = SmallVec<[Arc<dyn EventHandler>; 2]>;

/// Result of delivering one message to its handlers.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    /// Every handler succeeded; the message may be acknowledged.
    Acknowledged {
        /// Attempts it took, starting at 1
        attempts: u32,
    },
    /// The policy gave up; the message should be dead-lettered.
    Exhausted {
        /// Attempts made
        attempts: u32,
        /// Error from the last attempt
        last_error: HandlerError,
    },
    /// Shutdown was requested while waiting to redeliver. The message must not
    /// be acknowledged.
    Interrupted,
}

/// Handler registry, built once before the bus starts.
///
/// # Examples
///
/// ```ignore
/// let subscriptions = Subscriptions::new()
///     .subscribe(USER_CREATED, Arc::new(projector));
/// bus.start(subscriptions).await?;
/// ```
#[derive(Default, Clone)]
pub struct Subscriptions {
    handlers: HashMap<String, HandlerList>,
}

impl Subscriptions {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`. Handlers for the same type run in
    /// registration order.
    #[must_use]
    pub fn subscribe(mut self, event_type: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        self.handlers
            .entry(event_type.into())
            .or_default()
            .push(handler);
        self
    }

    /// Event types with at least one handler, sorted.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Number of handlers registered for `event_type`.
    #[must_use]
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, SmallVec::len)
    }

    /// Run every handler for the event's type once, in order.
    ///
    /// Stops at the first failure. An event type with no handlers succeeds
    /// trivially.
    ///
    /// # Errors
    ///
    /// Returns the first handler error.
    pub async fn dispatch(&self, event: &EventEnvelope) -> Result<(), HandlerError> {
        let Some(handlers) = self.handlers.get(event.event_type()) else {
            return Ok(());
        };

        for handler in handlers {
            if let Err(error) = handler.handle(event).await {
                tracing::warn!(
                    handler = handler.name(),
                    event_type = event.event_type(),
                    event_id = %event.event_id(),
                    correlation_id = %event.correlation_id(),
                    error = %error,
                    "Event handler failed"
                );
                return Err(error);
            }
        }

        Ok(())
    }

    /// Dispatch with redelivery until every handler succeeds, the policy gives
    /// up, or shutdown is signalled while waiting.
    pub async fn deliver(
        &self,
        event: &EventEnvelope,
        policy: &RedeliveryPolicy,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> DeliveryOutcome {
        let mut attempt: u32 = 1;

        loop {
            let error = match self.dispatch(event).await {
                Ok(()) => return DeliveryOutcome::Acknowledged { attempts: attempt },
                Err(error) => error,
            };

            if policy.is_exhausted(attempt) {
                return DeliveryOutcome::Exhausted {
                    attempts: attempt,
                    last_error: error,
                };
            }

            let delay = policy.delay_for_attempt(attempt);
            tracing::info!(
                event_type = event.event_type(),
                event_id = %event.event_id(),
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Redelivering event"
            );
            metrics::counter!("bus.redelivered", "event_type" => event.event_type()).increment(1);

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => return DeliveryOutcome::Interrupted,
            }

            attempt = attempt.saturating_add(1);
        }
    }
}

impl std::fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (event_type, handlers) in &self.handlers {
            let names: Vec<&str> = handlers.iter().map(|h| h.name()).collect();
            map.entry(event_type, &names);
        }
        map.finish()
    }
}

/// How a failed delivery is retried.
///
/// # Example
///
/// ```
/// use tenant_registry_core::event_bus::RedeliveryPolicy;
/// use std::time::Duration;
///
/// let policy = RedeliveryPolicy::unbounded();
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
/// assert!(!policy.is_exhausted(1_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    /// Give up after this many attempts; `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Wait before the second attempt.
    pub initial_backoff: Duration,
    /// Upper bound for any wait.
    pub max_backoff: Duration,
    /// Growth factor between consecutive waits.
    pub multiplier: u32,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RedeliveryPolicy {
    /// Retry forever with exponential backoff (100ms doubling, capped at 30s).
    #[must_use]
    pub const fn unbounded() -> Self {
        Self {
            max_attempts: None,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            multiplier: 2,
        }
    }

    /// Give up after `max_attempts` attempts (at least one).
    #[must_use]
    pub const fn bounded(max_attempts: u32) -> Self {
        let max_attempts = if max_attempts == 0 { 1 } else { max_attempts };
        Self {
            max_attempts: Some(max_attempts),
            ..Self::unbounded()
        }
    }

    /// Set the initial backoff.
    #[must_use]
    pub const fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the backoff cap.
    #[must_use]
    pub const fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Whether no further attempt should follow attempt number `attempt`.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt >= max)
    }

    /// Wait after failed attempt number `attempt` (1-based).
    ///
    /// `initial_backoff * multiplier^(attempt - 1)`, capped at `max_backoff`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let delay = self
            .multiplier
            .checked_pow(exponent)
            .map_or(self.max_backoff, |factor| self.initial_backoff.saturating_mul(factor));

        delay.min(self.max_backoff)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::event::{EventPayload, UserCreated};
    use crate::{CorrelationId, TenantId, UserId, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
        failures_left: AtomicU32,
    }

    impl Recording {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<&'static str>>>, failures: u32) -> Arc<Self> {
            Arc::new(Self {
                name,
                log: Arc::clone(log),
                failures_left: AtomicU32::new(failures),
            })
        }
    }

    impl EventHandler for Recording {
        fn name(&self) -> &str {
            self.name
        }

        fn handle<'a>(
            &'a self,
            _event: &'a EventEnvelope,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            Box::pin(async move {
                self.log.lock().unwrap().push(self.name);
                let remaining = self.failures_left.load(Ordering::SeqCst);
                if remaining > 0 {
                    self.failures_left.store(remaining - 1, Ordering::SeqCst);
                    return Err(HandlerError::Other("injected".to_string()));
                }
                Ok(())
            })
        }
    }

    fn event() -> EventEnvelope {
        EventEnvelope::new(
            "u-1",
            TenantId::new("t"),
            CorrelationId::new("c"),
            Utc::now(),
            EventPayload::UserCreated(UserCreated {
                user_id: UserId::new("u-1"),
                name: "A".to_string(),
                email: "a@example.com".to_string(),
                display_name: None,
            }),
        )
    }

    fn fast(policy: RedeliveryPolicy) -> RedeliveryPolicy {
        policy
            .with_initial_backoff(Duration::from_millis(1))
            .with_max_backoff(Duration::from_millis(2))
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RedeliveryPolicy::unbounded();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn bounded_policy_exhausts() {
        let policy = RedeliveryPolicy::bounded(3);
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
        assert_eq!(RedeliveryPolicy::bounded(0).max_attempts, Some(1));
    }

    #[test]
    fn registry_lists_types() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscriptions::new()
            .subscribe("user.created", Recording::new("a", &log, 0))
            .subscribe("user.created", Recording::new("b", &log, 0))
            .subscribe("other", Recording::new("c", &log, 0));

        assert_eq!(subs.event_types(), vec!["other".to_string(), "user.created".to_string()]);
        assert_eq!(subs.handler_count("user.created"), 2);
        assert_eq!(subs.handler_count("missing"), 0);
    }

    #[tokio::test]
    async fn dispatch_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscriptions::new()
            .subscribe("user.created", Recording::new("first", &log, 1))
            .subscribe("user.created", Recording::new("second", &log, 0));

        assert!(subs.dispatch(&event()).await.is_err());
        assert_eq!(*log.lock().unwrap(), vec!["first"]);
    }

    #[tokio::test]
    async fn redelivery_reruns_every_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscriptions::new()
            .subscribe("user.created", Recording::new("first", &log, 0))
            .subscribe("user.created", Recording::new("second", &log, 1));
        let (_tx, mut rx) = broadcast::channel(1);

        let outcome = subs
            .deliver(&event(), &fast(RedeliveryPolicy::unbounded()), &mut rx)
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Acknowledged { attempts: 2 }));
        assert_eq!(*log.lock().unwrap(), vec!["first", "second", "first", "second"]);
    }

    #[tokio::test]
    async fn bounded_delivery_reports_exhaustion() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscriptions::new().subscribe("user.created", Recording::new("a", &log, 10));
        let (_tx, mut rx) = broadcast::channel(1);

        let outcome = subs
            .deliver(&event(), &fast(RedeliveryPolicy::bounded(3)), &mut rx)
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Exhausted { attempts: 3, .. }));
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let subs = Subscriptions::new().subscribe("user.created", Recording::new("a", &log, u32::MAX));
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let outcome = subs
            .deliver(&event(), &RedeliveryPolicy::unbounded(), &mut rx)
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Interrupted));
    }

    #[tokio::test]
    async fn unregistered_type_is_acknowledged() {
        let subs = Subscriptions::new();
        let (_tx, mut rx) = broadcast::channel(1);
        let outcome = subs
            .deliver(&event(), &RedeliveryPolicy::bounded(1), &mut rx)
            .await;
        assert!(matches!(outcome, DeliveryOutcome::Acknowledged { attempts: 1 }));
    }
}
