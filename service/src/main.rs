//! Ledger service.
//!
//! Applies ledger events from Redpanda to the Postgres read model until interrupted.

use anyhow::Context;
use ledger_core::environment::{SystemClock, UuidGenerator};
use ledger_core::event_bus::EventBus;
use ledger_postgres::PostgresAccountRepository;
use ledger_redpanda::RedpandaEventBus;
use ledger_runtime::metrics::MetricsServer;
use ledger_runtime::{AccountEventHandler, EventDispatcher};
use ledger_service::{Config, DEFAULT_LOG_FILTER, init_tracing, signal_shutdown};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(DEFAULT_LOG_FILTER);

    info!("Starting ledger service");

    let config = Config::from_env().context("Invalid configuration")?;
    info!(
        postgres_url = %config.postgres.url,
        redpanda_brokers = %config.redpanda.brokers,
        consumer_group = %config.redpanda.consumer_group,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr);
    metrics.start().context("Failed to start metrics server")?;

    info!("Connecting to read model database...");
    let repository = PostgresAccountRepository::connect(
        &config.postgres.url,
        config.postgres.max_connections,
        config.postgres.connect_timeout,
    )
    .await
    .context("Failed to connect to PostgreSQL")?;
    repository
        .migrate()
        .await
        .context("Failed to migrate ledger tables")?;

    info!("Connecting to Redpanda event bus...");
    let event_bus: Arc<dyn EventBus> = Arc::new(
        RedpandaEventBus::builder()
            .brokers(&config.redpanda.brokers)
            .consumer_group(&config.redpanda.consumer_group)
            .auto_offset_reset(&config.redpanda.auto_offset_reset)
            .producer_acks(&config.redpanda.producer_acks)
            .timeout(config.redpanda.timeout)
            .build()
            .context("Failed to create event bus")?,
    );

    let handler = AccountEventHandler::new(
        Arc::new(repository),
        Arc::new(SystemClock),
        Arc::new(UuidGenerator),
    );

    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let dispatcher = EventDispatcher::builder()
        .name("ledger")
        .event_bus(event_bus)
        .handler(Arc::new(handler))
        .shutdown(shutdown_rx)
        .retry_delay(config.dispatcher.retry_delay)
        .build()
        .context("Incomplete dispatcher configuration")?
        .start()
        .await
        .context("Failed to subscribe to ledger topics")?;

    info!("Ledger service running, press Ctrl+C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutdown signal received");
    signal_shutdown(&shutdown);
    dispatcher
        .join()
        .await
        .context("Dispatcher stopped with an error")?;

    info!("Ledger service stopped");
    Ok(())
}
