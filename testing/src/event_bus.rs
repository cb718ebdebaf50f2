//! In-memory event bus.
//!
//! Behaves like the broker-backed bus where it matters for tests:
//! - events cross the bus as JSON bytes and are decoded on delivery
//! - one queue per event type; messages published before `start` are buffered
//! - one consumption loop per subscribed event type
//! - a message leaves its queue only once every handler succeeded (or the
//!   redelivery policy gave up and it was dead-lettered)
//!
//! Use [`InMemoryEventBus::wait_until_settled`] to wait for delivery instead of
//! sleeping in tests.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only follows a panicking test

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tenant_registry_core::event::{DomainEvent, EventEnvelope};
use tenant_registry_core::event_bus::{
    DeliveryOutcome, EventBus, EventBusError, EventPublisher, RedeliveryPolicy, Subscriptions,
};
use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;

/// A message the bus gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    /// Queue it came from
    pub event_type: String,
    /// Raw bytes as published
    pub payload: Vec<u8>,
    /// Why it was dropped
    pub reason: String,
    /// Delivery attempts made (0 if it never decoded)
    pub attempts: u32,
}

#[derive(Default)]
struct Queue {
    messages: VecDeque<Vec<u8>>,
    in_flight: usize,
    notify: Arc<Notify>,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    subscribed: HashSet<String>,
}

struct Inner {
    state: Mutex<State>,
    published: RwLock<Vec<EventEnvelope>>,
    dead_letters: RwLock<Vec<DeadLetter>>,
    publish_failures: AtomicU32,
    started: AtomicBool,
    closed: AtomicBool,
    policy: RedeliveryPolicy,
    shutdown_timeout: Duration,
    shutdown: broadcast::Sender<()>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

/// In-memory [`EventBus`] for tests.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tenant_registry_testing::InMemoryEventBus;
/// use tenant_registry_core::event_bus::{EventBus, Subscriptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bus = Arc::new(InMemoryEventBus::new());
/// bus.start(Subscriptions::new()).await?;
/// assert!(bus.published().is_empty());
/// bus.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryEventBus")
            .field("published", &self.inner.published.read().unwrap().len())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl InMemoryEventBus {
    /// Bus with a fast unbounded redelivery policy (1ms, capped at 10ms).
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(
            RedeliveryPolicy::unbounded()
                .with_initial_backoff(Duration::from_millis(1))
                .with_max_backoff(Duration::from_millis(10)),
        )
    }

    /// Bus with an explicit redelivery policy.
    #[must_use]
    pub fn with_policy(policy: RedeliveryPolicy) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
                published: RwLock::new(Vec::new()),
                dead_letters: RwLock::new(Vec::new()),
                publish_failures: AtomicU32::new(0),
                started: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                policy,
                shutdown_timeout: Duration::from_secs(1),
                shutdown,
                handles: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Fail the next `n` publishes with [`EventBusError::PublishFailed`].
    pub fn fail_next_publish(&self, n: u32) {
        self.inner.publish_failures.store(n, Ordering::SeqCst);
    }

    /// Every successfully published event, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<EventEnvelope> {
        self.inner.published.read().unwrap().clone()
    }

    /// Messages given up on.
    #[must_use]
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.dead_letters.read().unwrap().clone()
    }

    /// Enqueue raw bytes on an event type's queue, bypassing encoding.
    ///
    /// Lets tests deliver malformed messages.
    pub fn publish_raw(&self, event_type: &str, payload: Vec<u8>) {
        self.inner.enqueue(event_type, payload);
    }

    /// Wait until every subscribed queue is empty and idle.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.inner.is_settled() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

impl Inner {
    fn enqueue(&self, event_type: &str, payload: Vec<u8>) {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(event_type.to_string()).or_default();
        queue.messages.push_back(payload);
        queue.notify.notify_one();
    }

    fn is_settled(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.subscribed.iter().all(|event_type| {
            state
                .queues
                .get(event_type)
                .is_none_or(|q| q.messages.is_empty() && q.in_flight == 0)
        })
    }

    /// Pop the next message, or hand back the queue's notifier to wait on.
    fn next_message(&self, event_type: &str) -> Result<Vec<u8>, Arc<Notify>> {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(event_type.to_string()).or_default();
        match queue.messages.pop_front() {
            Some(message) => {
                queue.in_flight += 1;
                Ok(message)
            }
            None => Err(Arc::clone(&queue.notify)),
        }
    }

    /// Finish a message; `requeue` puts it back at the head of its queue.
    fn settle(&self, event_type: &str, message: Vec<u8>, requeue: bool) {
        let mut state = self.state.lock().unwrap();
        let queue = state.queues.entry(event_type.to_string()).or_default();
        queue.in_flight = queue.in_flight.saturating_sub(1);
        if requeue {
            queue.messages.push_front(message);
        }
    }

    fn dead_letter(&self, event_type: &str, payload: Vec<u8>, reason: String, attempts: u32) {
        tracing::warn!(event_type, attempts, reason = %reason, "Dead-lettering message");
        self.dead_letters.write().unwrap().push(DeadLetter {
            event_type: event_type.to_string(),
            payload,
            reason,
            attempts,
        });
    }

    async fn consume(
        self: Arc<Self>,
        event_type: String,
        subscriptions: Arc<Subscriptions>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let message = match self.next_message(&event_type) {
                Ok(message) => message,
                Err(notify) => {
                    tokio::select! {
                        () = notify.notified() => continue,
                        _ = shutdown.recv() => break,
                    }
                }
            };

            let event = match EventEnvelope::from_json(&message) {
                Ok(event) => event,
                Err(error) => {
                    self.dead_letter(&event_type, message.clone(), error.to_string(), 0);
                    self.settle(&event_type, message, false);
                    continue;
                }
            };

            match subscriptions
                .deliver(&event, &self.policy, &mut shutdown)
                .await
            {
                DeliveryOutcome::Acknowledged { .. } => {
                    self.settle(&event_type, message, false);
                }
                DeliveryOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    self.dead_letter(&event_type, message.clone(), last_error.to_string(), attempts);
                    self.settle(&event_type, message, false);
                }
                DeliveryOutcome::Interrupted => {
                    self.settle(&event_type, message, true);
                    break;
                }
            }
        }
    }
}

impl EventPublisher for InMemoryEventBus {
    fn publish<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let topic = event.event_type().to_string();

            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(EventBusError::Closed);
            }

            let injected = self
                .inner
                .publish_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if injected {
                return Err(EventBusError::PublishFailed {
                    topic,
                    reason: "injected failure".to_string(),
                });
            }

            let payload = event
                .to_json()
                .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;

            self.inner.published.write().unwrap().push(event.clone());
            self.inner.enqueue(&topic, payload);
            Ok(())
        })
    }
}

impl EventBus for InMemoryEventBus {
    fn start(
        &self,
        subscriptions: Subscriptions,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.inner.started.swap(true, Ordering::SeqCst) {
                return Err(EventBusError::AlreadyStarted);
            }

            let event_types = subscriptions.event_types();
            let subscriptions = Arc::new(subscriptions);

            self.inner
                .state
                .lock()
                .unwrap()
                .subscribed
                .extend(event_types.iter().cloned());

            let mut handles = self.inner.handles.lock().unwrap();
            for event_type in event_types {
                let shutdown = self.inner.shutdown.subscribe();
                handles.push(tokio::spawn(Arc::clone(&self.inner).consume(
                    event_type,
                    Arc::clone(&subscriptions),
                    shutdown,
                )));
            }
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            self.inner.closed.store(true, Ordering::SeqCst);
            let _ = self.inner.shutdown.send(());

            let handles: Vec<JoinHandle<()>> = self.inner.handles.lock().unwrap().drain(..).collect();
            let mut timed_out = false;
            for handle in handles {
                let abort = handle.abort_handle();
                if tokio::time::timeout(self.inner.shutdown_timeout, handle).await.is_err() {
                    abort.abort();
                    timed_out = true;
                }
            }

            if timed_out {
                return Err(EventBusError::ShutdownTimeout(self.inner.shutdown_timeout));
            }
            Ok(())
        })
    }
}
