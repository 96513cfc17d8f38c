//! Periodic reconciliation of lapsed reservations.
//!
//! A reservation that is never confirmed or cancelled would otherwise keep
//! its ticket locked in the Durable Store after the lock itself has expired.
//! The worker runs [`ReservationCoordinator::reconcile_expired`] on a fixed
//! interval until a shutdown signal arrives.
//!
//! # Example
//!
//! ```ignore
//! let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
//! let worker = SweepWorker::new(coordinator, Duration::from_secs(30), shutdown_tx.subscribe());
//! let handle = worker.spawn();
//!
//! // Later
//! let _ = shutdown_tx.send(());
//! handle.await?;
//! ```

use crate::coordinator::ReservationCoordinator;
use std::sync::Arc;
use std::time::Duration;
use ticketlock_core::{LockStore, PaymentGateway, TicketStore};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Background task expiring lapsed reservations.
pub struct SweepWorker<S, L, P> {
    coordinator: Arc<ReservationCoordinator<S, L, P>>,
    interval: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl<S, L, P> SweepWorker<S, L, P>
where
    S: TicketStore + 'static,
    L: LockStore + 'static,
    P: PaymentGateway + 'static,
{
    /// Create a worker sweeping every `interval`.
    #[must_use]
    pub const fn new(
        coordinator: Arc<ReservationCoordinator<S, L, P>>,
        interval: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            coordinator,
            interval,
            shutdown,
        }
    }

    /// Run the worker as a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Sweep until the shutdown signal fires (or its sender is dropped).
    ///
    /// A sweep in progress is finished before the signal is observed. Ticks
    /// missed during a slow sweep are delayed, not replayed.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Reconciliation sweep started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!("Reconciliation sweep received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Reconciliation sweep stopped");
    }

    async fn sweep_once(&self) {
        match self.coordinator.reconcile_expired().await {
            Ok(report) if report.is_empty() => debug!("Reconciliation sweep found nothing to expire"),
            Ok(report) => info!(
                examined = report.examined,
                expired = report.expired,
                skipped = report.skipped,
                failed = report.failed,
                "Reconciliation sweep completed"
            ),
            Err(e) => error!(error = %e, "Reconciliation sweep failed"),
        }
    }
}
