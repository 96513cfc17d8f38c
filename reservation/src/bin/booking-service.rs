//! Booking service.
//!
//! Wires the reservation coordinator to `PostgreSQL` and Redis, runs the
//! reconciliation sweep and exports Prometheus metrics. Request transport is
//! provided by the surrounding gateway.

use std::sync::Arc;
use ticketlock_core::TracingChangeFeed;
use ticketlock_core::environment::SystemClock;
use ticketlock_postgres::PostgresTicketStore;
use ticketlock_postgres::seed::seed_demo_catalogue;
use ticketlock_redis::RedisLockStore;
use ticketlock_reservation::metrics::install_exporter;
use ticketlock_reservation::{Config, MockPaymentGateway, ReservationCoordinator, SweepWorker};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting booking service");

    let config = Config::from_env();
    info!(
        redis_url = %config.redis.url,
        hold_secs = config.reservation.hold_secs,
        sweep_interval_secs = config.sweep.interval_secs,
        "Configuration loaded"
    );

    install_exporter(config.metrics.socket_addr())?;

    info!("Connecting to ticket database...");
    let store = PostgresTicketStore::connect(&config.postgres.url, &config.postgres.pool_settings())
        .await?;
    store.migrate().await?;
    if config.seed_demo_data {
        seed_demo_catalogue(store.pool()).await?;
    }
    let store = Arc::new(store);

    info!("Connecting to lock store...");
    let locks = Arc::new(RedisLockStore::new(&config.redis.url).await?);

    let gateway = Arc::new(MockPaymentGateway::new(
        config.reservation.mock_payment_success_rate,
    ));
    let coordinator = Arc::new(ReservationCoordinator::new(
        Arc::clone(&store),
        locks,
        gateway,
        Arc::new(TracingChangeFeed),
        Arc::new(SystemClock),
        config.reservation_settings(),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweep = SweepWorker::new(
        Arc::clone(&coordinator),
        config.sweep_interval(),
        shutdown_tx.subscribe(),
    )
    .spawn();

    info!("Booking service ready");

    signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    if let Err(e) = sweep.await {
        warn!(error = %e, "Reconciliation sweep task ended abnormally");
    }

    store.close().await;
    info!("Booking service stopped");
    Ok(())
}
