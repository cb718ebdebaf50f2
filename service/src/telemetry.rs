//! Tracing subscriber and Prometheus exporter setup.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `users.created` - Users persisted by the command handler
//! - `users.create.idempotent_replay` - Commands answered from the idempotency store
//! - `users.create.publish_failed` - Users created whose event was not published
//! - `auth.sessions.issued` - Successful authentications
//! - `bus.published` / `bus.publish_failed` - Producer outcomes, by `event_type`
//! - `bus.acked` - Messages committed after all handlers succeeded
//! - `bus.redelivered` - Redelivery attempts after a handler failure
//! - `bus.dead_lettered` - Messages routed to a dead-letter topic
//! - `projection.user_views.upserted` - Read model upserts

use crate::config::{LogConfig, LogFormat};
use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Errors from telemetry initialisation.
#[derive(Error, Debug)]
pub enum TelemetryError {
    /// The log filter was invalid or a subscriber is already installed
    #[error("Failed to initialise tracing: {0}")]
    Tracing(String),
    /// The Prometheus exporter could not be installed
    #[error("Failed to install metrics exporter: {0}")]
    Metrics(String),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`.
///
/// # Errors
///
/// Returns [`TelemetryError::Tracing`] if the filter is invalid or a global
/// subscriber is already set.
pub fn init_tracing(config: &LogConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| TelemetryError::Tracing(e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).try_init(),
    }
    .map_err(|e| TelemetryError::Tracing(e.to_string()))
}

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns [`TelemetryError::Metrics`] if the listener cannot be started or a
/// recorder is already installed.
pub fn install_metrics(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| TelemetryError::Metrics(e.to_string()))?;

    describe_metrics();
    tracing::info!(addr = %addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("users.created", "Users persisted by the command handler");
    describe_counter!(
        "users.create.idempotent_replay",
        "Create commands answered from the idempotency store"
    );
    describe_counter!(
        "users.create.publish_failed",
        "Users created whose user.created event could not be published"
    );
    describe_counter!("auth.sessions.issued", "Sessions issued after credential verification");
    describe_counter!("bus.published", "Events accepted by the broker");
    describe_counter!("bus.publish_failed", "Events the broker rejected or timed out");
    describe_counter!("bus.acked", "Messages committed after every handler succeeded");
    describe_counter!("bus.redelivered", "Redelivery attempts after a handler failure");
    describe_counter!("bus.dead_lettered", "Messages routed to a dead-letter topic");
    describe_counter!(
        "projection.user_views.upserted",
        "User views inserted or updated by the projector"
    );
}
