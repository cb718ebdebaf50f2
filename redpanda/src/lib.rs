//! Redpanda event bus implementation for the tenant registry.
//!
//! This crate provides a Redpanda-based event bus that implements the
//! [`EventBus`] trait from `tenant-registry-core`. It uses rdkafka for
//! Kafka-compatible event streaming.
//!
//! # Topology
//!
//! ```text
//! publish(user.created)
//!        │  key = aggregate_id
//!        │  headers: correlation_id, event_type
//!        ▼
//! ┌──────────────────────────────┐
//! │ backend_events.user.created  │  one topic per event type
//! └──────────────┬───────────────┘
//!                │  group: tenant-registry.user.created
//!                ▼
//! ┌──────────────────────────────┐
//! │ consumption loop             │  one per event type
//! │  deliver → handlers          │
//! │  commit offset on success    │
//! └──────────────┬───────────────┘
//!                │ policy exhausted (optional)
//!                ▼
//!  backend_events.user.created.dead-letter
//! ```
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - The offset is committed only AFTER every handler for the event succeeded
//! - A failing handler is retried in place per the [`RedeliveryPolicy`]
//! - If the process stops before commit, the event is redelivered to the group
//! - Handlers MUST be idempotent
//! - Ordering is guaranteed per aggregate (the record key)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tenant_registry_redpanda::RedpandaEventBus;
//! use tenant_registry_core::event_bus::{EventBus, RedeliveryPolicy, Subscriptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus = RedpandaEventBus::builder()
//!     .brokers("localhost:9092")
//!     .producer_acks("all")
//!     .redelivery_policy(RedeliveryPolicy::bounded(5))
//!     .dead_letter(true)
//!     .build()?;
//!
//! bus.start(Subscriptions::new()).await?;
//! // ...
//! bus.close().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod consumer;

use consumer::LoopSettings;
pub use consumer::{ATTEMPTS_HEADER, FAILURE_REASON_HEADER, dead_letter_topic};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tenant_registry_core::event::{DomainEvent, EventEnvelope};
use tenant_registry_core::event_bus::{
    EventBus, EventBusError, EventPublisher, RedeliveryPolicy, Subscriptions,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Default topic prefix.
pub const DEFAULT_TOPIC_PREFIX: &str = "backend_events";

/// Default consumer group prefix.
pub const DEFAULT_CONSUMER_GROUP_PREFIX: &str = "tenant-registry";

/// Topic an event type is published to.
#[must_use]
pub fn topic_for(prefix: &str, event_type: &str) -> String {
    format!("{prefix}.{event_type}")
}

/// Consumer group serving an event type.
#[must_use]
pub fn consumer_group_for(prefix: &str, event_type: &str) -> String {
    format!("{prefix}.{event_type}")
}

/// Redpanda event bus implementation.
///
/// - **Durable publish**: `acks=all` by default with the idempotent producer
/// - **Topic per event type**: `{topic_prefix}.{event_type}`
/// - **Consumer group per event type**: committed offsets survive restarts
/// - **Manual commit**: only after all handlers succeeded
///
/// Build with [`RedpandaEventBus::builder`].
pub struct RedpandaEventBus {
    /// Kafka producer for publishing events
    producer: FutureProducer,
    /// Broker addresses (for creating consumers)
    brokers: String,
    /// Producer timeout
    timeout: Duration,
    topic_prefix: String,
    consumer_group_prefix: String,
    /// Auto offset reset policy
    auto_offset_reset: String,
    policy: RedeliveryPolicy,
    dead_letter: bool,
    shutdown_timeout: Duration,
    shutdown: broadcast::Sender<()>,
    started: AtomicBool,
    closed: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for RedpandaEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedpandaEventBus")
            .field("brokers", &self.brokers)
            .field("topic_prefix", &self.topic_prefix)
            .field("consumer_group_prefix", &self.consumer_group_prefix)
            .field("policy", &self.policy)
            .field("dead_letter", &self.dead_letter)
            .finish_non_exhaustive()
    }
}

impl RedpandaEventBus {
    /// Create a new Redpanda event bus with default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be
    /// created.
    pub fn new(brokers: &str) -> Result<Self, EventBusError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a new builder for configuring the event bus.
    #[must_use]
    pub fn builder() -> RedpandaEventBusBuilder {
        RedpandaEventBusBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Topic used for `event_type`.
    #[must_use]
    pub fn topic(&self, event_type: &str) -> String {
        topic_for(&self.topic_prefix, event_type)
    }

    fn create_consumer(&self, event_type: &str) -> Result<StreamConsumer, EventBusError> {
        let topic = self.topic(event_type);
        let group_id = consumer_group_for(&self.consumer_group_prefix, event_type);
        let failed = |reason: String| EventBusError::SubscriptionFailed {
            topics: vec![topic.clone()],
            reason,
        };

        // Manual commit for at-least-once
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set("session.timeout.ms", "6000")
            .set("enable.partition.eof", "false")
            .create()
            .map_err(|e| failed(format!("Failed to create consumer: {e}")))?;

        consumer
            .subscribe(&[topic.as_str()])
            .map_err(|e| failed(format!("Failed to subscribe to topic: {e}")))?;

        tracing::info!(
            topic = %topic,
            consumer_group = %group_id,
            auto_offset_reset = %self.auto_offset_reset,
            manual_commit = true,
            "Subscribed to topic"
        );
        Ok(consumer)
    }
}

/// Builder for configuring a [`RedpandaEventBus`].
///
/// # Example
///
/// ```no_run
/// use tenant_registry_redpanda::RedpandaEventBus;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let event_bus = RedpandaEventBus::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .topic_prefix("backend_events")
///     .consumer_group_prefix("tenant-registry")
///     .timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct RedpandaEventBusBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    topic_prefix: Option<String>,
    consumer_group_prefix: Option<String>,
    auto_offset_reset: Option<String>,
    policy: Option<RedeliveryPolicy>,
    dead_letter: bool,
    shutdown_timeout: Option<Duration>,
}

impl RedpandaEventBusBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the producer acknowledgment mode: "0", "1" or "all".
    ///
    /// Default: "all". The idempotent producer is enabled only with "all".
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Set the compression codec: "none", "gzip", "snappy", "lz4", "zstd".
    ///
    /// Default: "none"
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Set the producer send timeout.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Prefix of every topic name.
    ///
    /// Default: `backend_events`
    #[must_use]
    pub fn topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = Some(prefix.into());
        self
    }

    /// Prefix of every consumer group id.
    ///
    /// Default: `tenant-registry`
    #[must_use]
    pub fn consumer_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.consumer_group_prefix = Some(prefix.into());
        self
    }

    /// Where new consumer groups start reading: "earliest" or "latest".
    ///
    /// Default: "earliest", so events published before the consumer's first
    /// start are still projected.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// How failed deliveries are retried.
    ///
    /// Default: [`RedeliveryPolicy::unbounded`]
    #[must_use]
    pub fn redelivery_policy(mut self, policy: RedeliveryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Forward undecodable or exhausted messages to `{topic}.dead-letter`.
    ///
    /// Default: disabled (such messages are logged and skipped).
    #[must_use]
    pub const fn dead_letter(mut self, enabled: bool) -> Self {
        self.dead_letter = enabled;
        self
    }

    /// How long [`EventBus::close`] waits for loops before aborting them.
    ///
    /// Default: 10 seconds
    #[must_use]
    pub const fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Build the [`RedpandaEventBus`].
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    /// - Invalid configuration
    pub fn build(self) -> Result<RedpandaEventBus, EventBusError> {
        let brokers = self.brokers.ok_or_else(|| {
            EventBusError::ConnectionFailed("Brokers not configured".to_string())
        })?;
        let acks = self.producer_acks.unwrap_or_else(|| "all".to_string());
        let compression = self.compression.unwrap_or_else(|| "none".to_string());
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));
        let idempotent = acks == "all" || acks == "-1";

        // Create producer configuration
        let mut producer_config = ClientConfig::new();
        producer_config
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", &acks)
            .set("enable.idempotence", idempotent.to_string())
            .set("compression.type", &compression);

        let producer: FutureProducer = producer_config.create().map_err(|e| {
            EventBusError::ConnectionFailed(format!("Failed to create producer: {e}"))
        })?;

        let policy = self.policy.unwrap_or_default();
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| "earliest".to_string());

        tracing::info!(
            brokers = %brokers,
            acks = %acks,
            compression = %compression,
            auto_offset_reset = %auto_offset_reset,
            max_attempts = ?policy.max_attempts,
            dead_letter = self.dead_letter,
            "RedpandaEventBus created successfully"
        );

        let (shutdown, _) = broadcast::channel(1);
        Ok(RedpandaEventBus {
            producer,
            brokers,
            timeout,
            topic_prefix: self
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            consumer_group_prefix: self
                .consumer_group_prefix
                .unwrap_or_else(|| DEFAULT_CONSUMER_GROUP_PREFIX.to_string()),
            auto_offset_reset,
            policy,
            dead_letter: self.dead_letter,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(Duration::from_secs(10)),
            shutdown,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        })
    }
}

impl EventPublisher for RedpandaEventBus {
    fn publish<'a>(
        &'a self,
        event: &'a EventEnvelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + 'a>> {
        Box::pin(async move {
            let event_type = event.event_type();
            let topic = self.topic(event_type);

            if self.closed.load(Ordering::SeqCst) {
                return Err(EventBusError::Closed);
            }

            let payload = event
                .to_json()
                .map_err(|e| EventBusError::SerializationFailed(e.to_string()))?;

            let headers = OwnedHeaders::new()
                .insert(Header {
                    key: "correlation_id",
                    value: Some(event.correlation_id().as_str()),
                })
                .insert(Header {
                    key: "event_type",
                    value: Some(event_type),
                });

            // Key by aggregate so one user's events stay ordered
            let record = FutureRecord::to(&topic)
                .payload(&payload)
                .key(event.aggregate_id())
                .headers(headers);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        event_id = %event.event_id(),
                        correlation_id = %event.correlation_id(),
                        "Event published successfully"
                    );
                    metrics::counter!("bus.published", "event_type" => event_type).increment(1);
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic = %topic,
                        correlation_id = %event.correlation_id(),
                        error = %kafka_error,
                        "Failed to publish event"
                    );
                    metrics::counter!("bus.publish_failed", "event_type" => event_type).increment(1);
                    Err(EventBusError::PublishFailed {
                        topic,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }
}

impl EventBus for RedpandaEventBus {
    fn start(
        &self,
        subscriptions: Subscriptions,
    ) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::SeqCst) {
                return Err(EventBusError::Closed);
            }
            if self.started.swap(true, Ordering::SeqCst) {
                return Err(EventBusError::AlreadyStarted);
            }

            let event_types = subscriptions.event_types();

            // Create every consumer up front so a bad topic fails start
            let mut consumers = Vec::with_capacity(event_types.len());
            for event_type in &event_types {
                consumers.push((event_type.clone(), self.create_consumer(event_type)?));
            }

            let subscriptions = Arc::new(subscriptions);
            let settings = Arc::new(LoopSettings {
                producer: self.producer.clone(),
                timeout: self.timeout,
                policy: self.policy.clone(),
                dead_letter: self.dead_letter,
            });

            let spawned: Vec<JoinHandle<()>> = consumers
                .into_iter()
                .map(|(event_type, stream_consumer)| {
                    tokio::spawn(consumer::run(
                        stream_consumer,
                        event_type,
                        Arc::clone(&subscriptions),
                        Arc::clone(&settings),
                        self.shutdown.subscribe(),
                    ))
                })
                .collect();

            tracing::info!(event_types = ?event_types, "Event bus started");
            self.handles
                .lock()
                .map_err(|_| EventBusError::Other("handle registry poisoned".to_string()))?
                .extend(spawned);
            Ok(())
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), EventBusError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            let _ = self.shutdown.send(());

            let handles: Vec<JoinHandle<()>> = self
                .handles
                .lock()
                .map(|mut handles| handles.drain(..).collect())
                .unwrap_or_default();

            let mut timed_out = false;
            for handle in handles {
                let abort = handle.abort_handle();
                if tokio::time::timeout(self.shutdown_timeout, handle).await.is_err() {
                    tracing::warn!(
                        timeout = ?self.shutdown_timeout,
                        "Consumption loop did not stop in time, aborting"
                    );
                    abort.abort();
                    timed_out = true;
                }
            }

            let producer = self.producer.clone();
            let flush_timeout = self.timeout;
            match tokio::task::spawn_blocking(move || producer.flush(Timeout::After(flush_timeout))).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "Producer flush failed"),
                Err(e) => tracing::warn!(error = %e, "Producer flush task failed"),
            }

            tracing::info!("Event bus closed");
            if timed_out {
                return Err(EventBusError::ShutdownTimeout(self.shutdown_timeout));
            }
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn redpanda_event_bus_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaEventBus>();
        assert_sync::<RedpandaEventBus>();
    }

    #[test]
    fn naming_follows_prefixes() {
        assert_eq!(
            topic_for(DEFAULT_TOPIC_PREFIX, "user.created"),
            "backend_events.user.created"
        );
        assert_eq!(
            consumer_group_for(DEFAULT_CONSUMER_GROUP_PREFIX, "user.created"),
            "tenant-registry.user.created"
        );
    }

    #[test]
    fn build_requires_brokers() {
        assert!(matches!(
            RedpandaEventBus::builder().build(),
            Err(EventBusError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn build_applies_defaults() {
        // Creating a producer does not contact the broker
        let bus = RedpandaEventBus::builder()
            .brokers("localhost:1")
            .build()
            .expect("producer creation does not need a live broker");

        assert_eq!(bus.brokers(), "localhost:1");
        assert_eq!(bus.topic("user.created"), "backend_events.user.created");
        assert_eq!(bus.policy, RedeliveryPolicy::unbounded());
        assert!(!bus.dead_letter);
    }
}
