//! Projection consumer: keeps the `users_read` view in sync with
//! `user.created` events.
//!
//! ```bash
//! DATABASE_URL=postgres://... REDPANDA_BROKERS=localhost:9092 \
//!     cargo run -p tenant-registry-service --bin tenant-registry-consumer
//! ```

use tenant_registry_service::{Config, bootstrap, shutdown_signal, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if present)
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    telemetry::init_tracing(&config.log)?;

    if let Some(addr) = config.metrics_addr {
        telemetry::install_metrics(addr)?;
    }

    tracing::info!(
        projections_url = %redact(&config.projections.url),
        brokers = %config.bus.brokers,
        "Starting tenant registry consumer"
    );

    bootstrap::run_consumer(&config, shutdown_signal()).await?;

    tracing::info!("Consumer stopped");
    Ok(())
}

/// Strip credentials from a connection URL for logging.
fn redact(url: &str) -> &str {
    url.split('@').next_back().unwrap_or(url)
}
