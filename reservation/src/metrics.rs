//! Prometheus metrics for the booking service.
//!
//! Counters emitted by the coordinator:
//!
//! | name | labels |
//! |---|---|
//! | `reservation.reserve.succeeded` | |
//! | `reservation.reserve.rejected` | `reason` |
//! | `reservation.confirm.succeeded` | |
//! | `reservation.confirm.rejected` | `reason` |
//! | `reservation.cancel.succeeded` | |
//! | `reservation.cancel.rejected` | `reason` |
//! | `reservation.sweep.expired` | |
//! | `reservation.transaction_failed` | |
//!
//! `reason` is [`ReservationError::kind`](crate::ReservationError::kind).

use metrics::describe_counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to install metrics exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Install the Prometheus exporter with an HTTP listener on `addr`.
///
/// # Errors
///
/// Returns [`MetricsError::Install`] if a recorder is already installed or
/// the listener cannot be started.
pub fn install_exporter(addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| MetricsError::Install(e.to_string()))?;

    register_metrics();
    tracing::info!(%addr, "Metrics available at http://{addr}/metrics");
    Ok(())
}

fn register_metrics() {
    describe_counter!(
        "reservation.reserve.succeeded",
        "Reservations created"
    );
    describe_counter!(
        "reservation.reserve.rejected",
        "Reserve calls that returned an error, by reason"
    );
    describe_counter!(
        "reservation.confirm.succeeded",
        "Bookings confirmed after a captured payment"
    );
    describe_counter!(
        "reservation.confirm.rejected",
        "Confirm calls that returned an error, by reason"
    );
    describe_counter!("reservation.cancel.succeeded", "Bookings cancelled");
    describe_counter!(
        "reservation.cancel.rejected",
        "Cancel calls that returned an error, by reason"
    );
    describe_counter!(
        "reservation.sweep.expired",
        "Reservations expired by the reconciliation sweep"
    );
    describe_counter!(
        "reservation.transaction_failed",
        "Payments captured without a committed confirmation"
    );
    describe_counter!(
        "ticket_store.commit.failed",
        "Durable Store transactions that failed to commit"
    );
}
