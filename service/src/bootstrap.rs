//! Construction of the write path, read path and projection consumer from
//! [`Config`].

use crate::config::{BusConfig, Config};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tenant_registry_core::event::USER_CREATED;
use tenant_registry_core::event_bus::{EventBus, EventBusError, EventPublisher, Subscriptions};
use tenant_registry_postgres::{PostgresIdempotencyStore, PostgresUserRepository};
use tenant_registry_projections::{PostgresUserViewStore, UserProjector};
use tenant_registry_redpanda::RedpandaEventBus;
use tenant_registry_runtime::{AuthenticateHandler, CreateUserHandler, UserQueries};

/// Build the Redpanda bus described by `config`.
///
/// # Errors
///
/// Returns [`EventBusError::ConnectionFailed`] if the producer cannot be created.
pub fn event_bus(config: &BusConfig, shutdown_timeout: Duration) -> Result<RedpandaEventBus, EventBusError> {
    RedpandaEventBus::builder()
        .brokers(&config.brokers)
        .producer_acks(&config.producer_acks)
        .topic_prefix(&config.topic_prefix)
        .consumer_group_prefix(&config.consumer_group_prefix)
        .auto_offset_reset(&config.auto_offset_reset)
        .redelivery_policy(config.redelivery_policy())
        .dead_letter(config.dead_letter)
        .shutdown_timeout(shutdown_timeout)
        .build()
}

/// Command handlers backed by `PostgreSQL` and Redpanda.
pub struct WritePath {
    /// `CreateUser`
    pub create_user: CreateUserHandler<PostgresUserRepository, PostgresIdempotencyStore>,
    /// `Authenticate`
    pub authenticate: AuthenticateHandler<PostgresUserRepository>,
    /// The publisher shared by the handlers; close it at shutdown
    pub bus: Arc<RedpandaEventBus>,
}

impl WritePath {
    /// Connect to the write database, run its migrations and build the handlers.
    ///
    /// # Errors
    ///
    /// Fails if the database is unreachable, a migration fails, or the bus
    /// producer cannot be created.
    pub async fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool =
            tenant_registry_postgres::connect(&config.database.url, config.database.max_connections)
                .await?;
        tenant_registry_postgres::migrate(&pool).await?;
        tracing::info!("Write database ready");

        let bus = Arc::new(event_bus(&config.bus, config.shutdown_timeout())?);
        let publisher: Arc<dyn EventPublisher> = bus.clone();
        let users = Arc::new(PostgresUserRepository::new(pool.clone()));

        Ok(Self {
            create_user: CreateUserHandler::new(
                Arc::clone(&users),
                Arc::new(PostgresIdempotencyStore::new(pool)),
                publisher,
            ),
            authenticate: AuthenticateHandler::new(users).with_session_ttl(config.session_ttl()),
            bus,
        })
    }
}

/// Connect to the read database and run its migrations.
///
/// # Errors
///
/// Fails if the database is unreachable or a migration fails.
pub async fn view_store(config: &Config) -> anyhow::Result<PostgresUserViewStore> {
    let store = PostgresUserViewStore::new_with_separate_db(
        &config.projections.url,
        config.projections.max_connections,
    )
    .await?;
    store.migrate().await?;
    tracing::info!("Projection database ready");
    Ok(store)
}

/// Query handlers over the read database.
///
/// # Errors
///
/// See [`view_store`].
pub async fn read_path(config: &Config) -> anyhow::Result<UserQueries<PostgresUserViewStore>> {
    Ok(UserQueries::new(Arc::new(view_store(config).await?)))
}

/// Run the projection consumer until `shutdown` resolves.
///
/// Registers [`UserProjector`] for `user.created`, starts the bus, waits, then
/// closes the bus. Offsets of messages still being redelivered at shutdown are
/// not committed and will be read again on the next start.
///
/// # Errors
///
/// Fails if the read database or the bus cannot be set up, or if a
/// consumption loop had to be aborted on close.
pub async fn run_consumer(config: &Config, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
    let store = view_store(config).await?;
    let bus = event_bus(&config.bus, config.shutdown_timeout())?;

    let subscriptions =
        Subscriptions::new().subscribe(USER_CREATED, Arc::new(UserProjector::new(store)));
    bus.start(subscriptions).await?;
    tracing::info!(
        brokers = %config.bus.brokers,
        topic = %bus.topic(USER_CREATED),
        policy = ?config.bus.redelivery_policy(),
        dead_letter = config.bus.dead_letter,
        "Projection consumer running"
    );

    shutdown.await;

    tracing::info!("Shutting down projection consumer");
    bus.close().await?;
    Ok(())
}
