//! Per-event-type consumption loop.
//!
//! One loop owns one `StreamConsumer` subscribed to one topic. For every
//! record it decodes the envelope, delivers it to the registered handlers
//! (redelivering in place per the [`RedeliveryPolicy`]) and only then commits
//! the offset. A record whose offset is not committed is read again by the
//! next consumer of the group, which is what makes delivery at-least-once.

use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Header, Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::sync::Arc;
use std::time::Duration;
use tenant_registry_core::event::{DomainEvent, EventEnvelope};
use tenant_registry_core::event_bus::{DeliveryOutcome, RedeliveryPolicy, Subscriptions};
use tokio::sync::broadcast;

/// Suffix appended to a topic to name its dead-letter topic.
pub const DEAD_LETTER_SUFFIX: &str = ".dead-letter";

/// Header carrying why a record was dead-lettered.
pub const FAILURE_REASON_HEADER: &str = "x-failure-reason";

/// Header carrying how many delivery attempts were made.
pub const ATTEMPTS_HEADER: &str = "x-attempts";

/// Dead-letter topic for `topic`.
#[must_use]
pub fn dead_letter_topic(topic: &str) -> String {
    format!("{topic}{DEAD_LETTER_SUFFIX}")
}

/// Shared settings of every loop.
pub(crate) struct LoopSettings {
    pub producer: FutureProducer,
    pub timeout: Duration,
    pub policy: RedeliveryPolicy,
    pub dead_letter: bool,
}

/// A record detached from the consumer so it can be held across awaits.
struct Received {
    topic: String,
    partition: i32,
    offset: i64,
    key: Option<Vec<u8>>,
    payload: Vec<u8>,
    correlation_id: Option<String>,
}

impl Received {
    fn from_message<M: Message>(message: &M) -> Self {
        let correlation_id = message.headers().and_then(|headers| {
            headers
                .iter()
                .find(|h| h.key == "correlation_id")
                .and_then(|h| h.value)
                .map(|v| String::from_utf8_lossy(v).into_owned())
        });

        Self {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            correlation_id,
        }
    }
}

pub(crate) async fn run(
    consumer: StreamConsumer,
    event_type: String,
    subscriptions: Arc<Subscriptions>,
    settings: Arc<LoopSettings>,
    mut shutdown: broadcast::Receiver<()>,
) {
    tracing::info!(event_type = %event_type, "Consumption loop started");

    let mut receive_failures: u32 = 0;

    loop {
        let message = tokio::select! {
            _ = shutdown.recv() => break,
            message = consumer.recv() => message.map(|message| Received::from_message(&message)),
        };
        let received = match message {
            Ok(received) => {
                receive_failures = 0;
                received
            }
            Err(error) => {
                receive_failures = receive_failures.saturating_add(1);
                let delay = settings.policy.delay_for_attempt(receive_failures);
                tracing::warn!(
                    event_type = %event_type,
                    error = %error,
                    failures = receive_failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Failed to receive message"
                );
                if !pause(delay, &mut shutdown).await {
                    break;
                }
                continue;
            }
        };

        let keep_going = match EventEnvelope::from_json(&received.payload) {
            Ok(event) => handle_event(&consumer, &received, &event, &subscriptions, &settings, &mut shutdown).await,
            Err(error) => {
                tracing::error!(
                    topic = %received.topic,
                    partition = received.partition,
                    offset = received.offset,
                    correlation_id = received.correlation_id.as_deref().unwrap_or(""),
                    error = %error,
                    "Undecodable message, not requeueing"
                );
                let forwarded = !settings.dead_letter
                    || dead_letter(&received, &error.to_string(), 0, &settings, &mut shutdown).await;
                if forwarded {
                    commit(&consumer, &received);
                }
                forwarded
            }
        };

        if !keep_going {
            break;
        }
    }

    tracing::info!(event_type = %event_type, "Consumption loop stopped");
}

/// Deliver one decoded event. Returns `false` if the loop must stop.
async fn handle_event(
    consumer: &StreamConsumer,
    received: &Received,
    event: &EventEnvelope,
    subscriptions: &Subscriptions,
    settings: &LoopSettings,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    match subscriptions.deliver(event, &settings.policy, shutdown).await {
        DeliveryOutcome::Acknowledged { attempts } => {
            commit(consumer, received);
            tracing::debug!(
                topic = %received.topic,
                offset = received.offset,
                event_id = %event.event_id(),
                correlation_id = %event.correlation_id(),
                attempts,
                "Event acknowledged"
            );
            metrics::counter!("bus.acked", "event_type" => event.event_type()).increment(1);
            true
        }
        DeliveryOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            tracing::error!(
                topic = %received.topic,
                offset = received.offset,
                event_id = %event.event_id(),
                correlation_id = %event.correlation_id(),
                attempts,
                error = %last_error,
                dead_letter = settings.dead_letter,
                "Giving up on event"
            );
            let forwarded = !settings.dead_letter
                || dead_letter(received, &last_error.to_string(), attempts, settings, shutdown).await;
            if forwarded {
                commit(consumer, received);
            }
            forwarded
        }
        // Not committed: the group re-reads it after restart.
        DeliveryOutcome::Interrupted => false,
    }
}

fn commit(consumer: &StreamConsumer, received: &Received) {
    let mut offsets = TopicPartitionList::new();
    let next = Offset::Offset(received.offset.saturating_add(1));
    let result = offsets
        .add_partition_offset(&received.topic, received.partition, next)
        .and_then(|()| consumer.commit(&offsets, CommitMode::Async));

    if let Err(error) = result {
        tracing::warn!(
            topic = %received.topic,
            partition = received.partition,
            offset = received.offset,
            error = %error,
            "Failed to commit offset (message may be redelivered)"
        );
    }
}

/// Publish the record to the dead-letter topic, retrying until it succeeds.
///
/// Returns `false` only if shutdown interrupted the retries.
async fn dead_letter(
    received: &Received,
    reason: &str,
    attempts: u32,
    settings: &LoopSettings,
    shutdown: &mut broadcast::Receiver<()>,
) -> bool {
    let topic = dead_letter_topic(&received.topic);
    let attempts_header = attempts.to_string();
    let mut try_number: u32 = 1;

    loop {
        let mut headers = OwnedHeaders::new()
            .insert(Header {
                key: FAILURE_REASON_HEADER,
                value: Some(reason),
            })
            .insert(Header {
                key: ATTEMPTS_HEADER,
                value: Some(attempts_header.as_str()),
            });
        if let Some(correlation_id) = &received.correlation_id {
            headers = headers.insert(Header {
                key: "correlation_id",
                value: Some(correlation_id.as_str()),
            });
        }

        let mut record = FutureRecord::to(&topic)
            .payload(&received.payload)
            .headers(headers);
        if let Some(key) = &received.key {
            record = record.key(key);
        }

        match settings
            .producer
            .send(record, Timeout::After(settings.timeout))
            .await
        {
            Ok(_) => {
                tracing::warn!(topic = %topic, attempts, reason, "Message dead-lettered");
                metrics::counter!("bus.dead_lettered", "topic" => received.topic.clone()).increment(1);
                return true;
            }
            Err((error, _)) => {
                tracing::error!(topic = %topic, error = %error, "Failed to dead-letter message");
            }
        }

        if !pause(settings.policy.delay_for_attempt(try_number), shutdown).await {
            return false;
        }
        try_number = try_number.saturating_add(1);
    }
}

/// Sleep for `delay`. Returns `false` if shutdown was signalled first.
async fn pause(delay: Duration, shutdown: &mut broadcast::Receiver<()>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => true,
        _ = shutdown.recv() => false,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pause_waits_for_the_delay() {
        let (_tx, mut shutdown) = broadcast::channel(1);
        let started = std::time::Instant::now();

        assert!(pause(Duration::from_millis(20), &mut shutdown).await);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn pause_returns_early_on_shutdown() {
        let (tx, mut shutdown) = broadcast::channel(1);
        tx.send(()).unwrap();
        let started = std::time::Instant::now();

        assert!(!pause(Duration::from_secs(30), &mut shutdown).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn dead_letter_topic_appends_suffix() {
        assert_eq!(
            dead_letter_topic("backend_events.user.created"),
            "backend_events.user.created.dead-letter"
        );
    }
}
