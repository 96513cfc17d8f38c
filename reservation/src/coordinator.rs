//! Reservation coordinator.
//!
//! Orchestrates the Durable Store, the Lock Store and the Payment Gateway for
//! every ticket operation:
//!
//! ```text
//! Reserve:  read ticket ─▶ acquire lock ─▶ tx{ ticket=locked, insert booking } ─▶ feed
//!                              │                      │ (failure)
//!                              ▼                      ▼
//!                        AlreadyLocked         release lock, error
//!
//! Confirm:  open booking ─▶ expired? ─▶ tx{ expire } ─▶ Expired
//!                │
//!                ▼
//!           holder check ─▶ extend lock ─▶ charge ─▶ tx{ confirmed, booked } ─▶ release lock
//!                                             │              │ (failure)
//!                                             ▼              ▼
//!                                      PaymentFailed   TransactionFailed(payment_ref)
//! ```
//!
//! The lock decides which of several concurrent reservers wins a ticket. The
//! ticket status column is read first only to reject tickets that are already
//! booked. Every status change of a booking and its ticket happens in one
//! store transaction, re-checked under row locks, so a Confirm, a Cancel and
//! the reconciliation sweep racing on the same booking resolve it exactly
//! once.

use crate::error::{Missing, ReservationError, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use ticketlock_core::environment::Clock;
use ticketlock_core::{
    Booking, BookingDetails, BookingId, BookingStatus, ChangeFeed, ChangeReason, DateTime,
    LockHolder, LockStore, PaymentGateway, PaymentIntent, PaymentRequest, StoreError, StoreTransaction,
    Ticket, TicketChange, TicketId, TicketStatus, TicketStore, UserId, Utc,
};

/// Lock lifetime granted on top of the payment timeout while a charge is in flight.
const PAYMENT_LOCK_MARGIN: Duration = Duration::from_secs(5);

/// Tunables of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationSettings {
    /// How long a reservation holds its ticket
    pub hold: Duration,
    /// Currency sent to the payment gateway
    pub currency: String,
    /// Upper bound on one gateway call
    pub payment_timeout: Duration,
    /// Maximum reservations expired per sweep
    pub sweep_batch_size: usize,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            hold: Duration::from_secs(600),
            currency: "ntd".to_string(),
            payment_timeout: Duration::from_secs(30),
            sweep_batch_size: 100,
        }
    }
}

/// A successful reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reservation {
    /// The new booking
    pub booking_id: BookingId,
    /// End of the hold window
    pub expires_at: DateTime<Utc>,
}

/// A successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    /// The confirmed booking
    pub booking_id: BookingId,
    /// Gateway reference of the captured charge
    pub payment_ref: String,
}

/// Opaque payment details supplied by the caller (card token, wallet id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentDetails(String);

impl PaymentDetails {
    /// Wrap caller-supplied payment details.
    #[must_use]
    pub fn new(details: impl Into<String>) -> Self {
        Self(details.into())
    }

    /// The raw details.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Expired reservations found
    pub examined: usize,
    /// Reservations this pass expired
    pub expired: usize,
    /// Reservations a concurrent confirm or cancel resolved first
    pub skipped: usize,
    /// Reservations that could not be expired this pass
    pub failed: usize,
}

impl ReconcileReport {
    /// Whether the pass found nothing to do.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.examined == 0
    }
}

/// Result of expiring a single reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expiry {
    Applied,
    AlreadyResolved,
}

/// Coordinates Reserve, Confirm, Cancel, `ListBookings` and the expiry sweep.
///
/// All collaborators are injected at construction. The coordinator holds no
/// in-process lock; correctness rests on the Lock Store's atomic acquire and
/// the Durable Store's transactions.
pub struct ReservationCoordinator<S, L, P> {
    store: Arc<S>,
    locks: Arc<L>,
    gateway: Arc<P>,
    feed: Arc<dyn ChangeFeed>,
    clock: Arc<dyn Clock>,
    settings: ReservationSettings,
}

impl<S, L, P> ReservationCoordinator<S, L, P>
where
    S: TicketStore,
    L: LockStore,
    P: PaymentGateway,
{
    /// Create a coordinator over the given collaborators.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        locks: Arc<L>,
        gateway: Arc<P>,
        feed: Arc<dyn ChangeFeed>,
        clock: Arc<dyn Clock>,
        settings: ReservationSettings,
    ) -> Self {
        Self {
            store,
            locks,
            gateway,
            feed,
            clock,
            settings,
        }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &ReservationSettings {
        &self.settings
    }

    /// Hold a ticket for `user_id` for the configured hold window.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`] if the ticket does not exist
    /// - [`ReservationError::Conflict`] if the ticket is not available
    /// - [`ReservationError::AlreadyLocked`] if another user holds the lock
    /// - [`ReservationError::Store`] / [`ReservationError::Lock`] on
    ///   infrastructure failure (the lock is released first)
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id, user_id = %user_id))]
    pub async fn reserve(&self, ticket_id: TicketId, user_id: UserId) -> Result<Reservation> {
        let result = self.try_reserve(ticket_id, user_id).await;
        match &result {
            Ok(_) => metrics::counter!("reservation.reserve.succeeded").increment(1),
            Err(e) => {
                metrics::counter!("reservation.reserve.rejected", "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }

    async fn try_reserve(&self, ticket_id: TicketId, user_id: UserId) -> Result<Reservation> {
        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(ticket_id)))?;

        // A locked ticket falls through: the lock store decides who holds it.
        if ticket.status == TicketStatus::Booked {
            return Err(ReservationError::Conflict(format!(
                "ticket {ticket_id} is already booked"
            )));
        }

        // The lock is taken under the id the booking will carry.
        let holder = LockHolder::new(user_id, BookingId::new());
        if !self
            .locks
            .acquire_if_absent(ticket_id, holder, self.settings.hold)
            .await?
        {
            tracing::debug!("Ticket lock held by another reservation");
            return Err(ReservationError::AlreadyLocked { ticket_id });
        }

        match self.create_reservation(ticket_id, holder).await {
            Ok((booking, ticket)) => {
                tracing::info!(
                    booking_id = %booking.id,
                    expires_at = %booking.expires_at,
                    "Ticket reserved"
                );
                self.publish(&ticket, booking.id, ChangeReason::Reserved);
                Ok(Reservation {
                    booking_id: booking.id,
                    expires_at: booking.expires_at,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reservation not written, releasing ticket lock");
                self.release_lock(ticket_id, holder).await;
                Err(e)
            }
        }
    }

    async fn create_reservation(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
    ) -> Result<(Booking, Ticket)> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        let mut ticket = tx
            .ticket_for_update(ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(ticket_id)))?;
        if !ticket.is_available() {
            return Err(ReservationError::Conflict(format!(
                "ticket {ticket_id} is {}",
                ticket.status
            )));
        }
        ticket.lock()?;

        let booking = Booking::reserve_with_id(
            holder.booking_id,
            &ticket,
            holder.user_id,
            now,
            self.hold_window(),
        );
        tx.update_ticket(&ticket).await?;
        tx.insert_booking(&booking).await.map_err(|e| match e {
            StoreError::Constraint(reason) => ReservationError::Conflict(reason),
            other => other.into(),
        })?;
        tx.commit().await?;

        Ok((booking, ticket))
    }

    /// Pay for and confirm the caller's reservation of `ticket_id`.
    ///
    /// A reservation whose window has passed is expired on the spot and the
    /// ticket returned to sale.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`] if the caller has no open reservation
    /// - [`ReservationError::Expired`] if the hold window has passed
    /// - [`ReservationError::LockReleased`] if the caller no longer holds the lock
    /// - [`ReservationError::PaymentFailed`] if the charge was declined, failed
    ///   or timed out; nothing changed and the reservation stays open
    /// - [`ReservationError::TransactionFailed`] if the charge went through but
    ///   the confirmation could not be committed
    #[tracing::instrument(skip_all, fields(ticket_id = %ticket_id, user_id = %user_id))]
    pub async fn confirm(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        details: PaymentDetails,
    ) -> Result<Confirmation> {
        let result = self.try_confirm(ticket_id, user_id, details).await;
        match &result {
            Ok(_) => metrics::counter!("reservation.confirm.succeeded").increment(1),
            Err(e) => {
                metrics::counter!("reservation.confirm.rejected", "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }

    async fn try_confirm(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
        details: PaymentDetails,
    ) -> Result<Confirmation> {
        let Some(booking) = self.store.reserved_booking(ticket_id, user_id).await? else {
            // Only used to tell a lapsed hold apart from no hold at all.
            return match self.store.latest_booking(ticket_id, user_id).await? {
                Some(latest) if latest.status == BookingStatus::Expired => {
                    Err(ReservationError::Expired {
                        booking_id: latest.id,
                    })
                }
                _ => Err(ReservationError::NotFound(Missing::Reservation {
                    ticket_id,
                    user_id,
                })),
            };
        };

        if booking.is_expired_at(self.clock.now()) {
            match self.expire_reservation(booking.id).await? {
                Expiry::Applied => tracing::info!(
                    booking_id = %booking.id,
                    "Stale reservation expired on confirm"
                ),
                Expiry::AlreadyResolved => tracing::debug!(
                    booking_id = %booking.id,
                    "Stale reservation already resolved"
                ),
            }
            return Err(ReservationError::Expired {
                booking_id: booking.id,
            });
        }

        let holder = LockHolder::new(user_id, booking.id);
        let current = self.locks.holder_of(ticket_id).await?;
        if current != Some(holder) {
            tracing::warn!(current = ?current, "Ticket lock no longer held for this booking");
            return Err(ReservationError::LockReleased { ticket_id });
        }

        // Keep the lock alive for the whole gateway call.
        let in_flight = self.settings.payment_timeout + PAYMENT_LOCK_MARGIN;
        if !self.locks.extend(ticket_id, holder, in_flight).await? {
            tracing::warn!("Ticket lock lost before payment");
            return Err(ReservationError::LockReleased { ticket_id });
        }

        let ticket = self
            .store
            .ticket(ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(ticket_id)))?;

        let intent = self
            .charge(PaymentRequest {
                amount: ticket.price,
                currency: self.settings.currency.clone(),
                user_id,
                ticket_id,
                payment_method: details.0,
            })
            .await?;

        match self.commit_confirmation(booking.id, user_id, &intent.id).await {
            Ok(ticket) => {
                self.release_lock(ticket_id, holder).await;
                tracing::info!(
                    booking_id = %booking.id,
                    payment_ref = %intent.id,
                    "Booking confirmed"
                );
                self.publish(&ticket, booking.id, ChangeReason::Confirmed);
                Ok(Confirmation {
                    booking_id: booking.id,
                    payment_ref: intent.id,
                })
            }
            Err(e) => {
                metrics::counter!("reservation.transaction_failed").increment(1);
                tracing::error!(
                    booking_id = %booking.id,
                    payment_ref = %intent.id,
                    error = %e,
                    "Payment captured but booking not confirmed; reconciliation required"
                );
                Err(ReservationError::TransactionFailed {
                    booking_id: booking.id,
                    payment_ref: intent.id,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// One gateway call, bounded by the payment timeout.
    async fn charge(&self, request: PaymentRequest) -> Result<PaymentIntent> {
        let timeout = self.settings.payment_timeout;
        match tokio::time::timeout(timeout, self.gateway.create_intent(request)).await {
            Err(_) => Err(ReservationError::PaymentFailed {
                reason: format!("payment gateway did not answer within {timeout:?}"),
            }),
            Ok(Err(e)) => Err(ReservationError::PaymentFailed {
                reason: e.to_string(),
            }),
            Ok(Ok(intent)) if intent.success => Ok(intent),
            Ok(Ok(intent)) => {
                tracing::info!(payment_ref = %intent.id, status = %intent.status, "Payment declined");
                Err(ReservationError::PaymentFailed {
                    reason: intent.error.unwrap_or(intent.status),
                })
            }
        }
    }

    async fn commit_confirmation(
        &self,
        booking_id: BookingId,
        user_id: UserId,
        payment_ref: &str,
    ) -> Result<Ticket> {
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Booking(booking_id)))?;
        if booking.status != BookingStatus::Reserved {
            return Err(ReservationError::Conflict(format!(
                "booking {booking_id} became {} during payment",
                booking.status
            )));
        }
        let mut ticket = tx
            .ticket_for_update(booking.ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(booking.ticket_id)))?;

        booking.confirm(payment_ref)?;
        ticket.book(user_id)?;
        tx.update_booking(&booking).await?;
        tx.update_ticket(&ticket).await?;
        tx.commit().await?;

        Ok(ticket)
    }

    /// Cancel a reserved or confirmed booking and return its ticket to sale.
    ///
    /// # Errors
    ///
    /// - [`ReservationError::NotFound`] if the booking does not exist
    /// - [`ReservationError::Unauthorized`] if it belongs to another user
    /// - [`ReservationError::Conflict`] if it is already cancelled or expired
    #[tracing::instrument(skip_all, fields(booking_id = %booking_id, user_id = %user_id))]
    pub async fn cancel(&self, booking_id: BookingId, user_id: UserId) -> Result<()> {
        let result = self.try_cancel(booking_id, user_id).await;
        match &result {
            Ok(()) => metrics::counter!("reservation.cancel.succeeded").increment(1),
            Err(e) => {
                metrics::counter!("reservation.cancel.rejected", "reason" => e.kind())
                    .increment(1);
            }
        }
        result
    }

    async fn try_cancel(&self, booking_id: BookingId, user_id: UserId) -> Result<()> {
        let booking = self
            .store
            .booking(booking_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Booking(booking_id)))?;
        if booking.user_id != user_id {
            return Err(ReservationError::Unauthorized {
                booking_id,
                user_id,
            });
        }
        if !booking.is_active() {
            return Err(ReservationError::Conflict(format!(
                "booking {booking_id} is already {}",
                booking.status
            )));
        }

        let mut tx = self.store.begin().await?;
        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Booking(booking_id)))?;
        let mut ticket = tx
            .ticket_for_update(booking.ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(booking.ticket_id)))?;

        booking.cancel()?;
        ticket.release()?;
        tx.update_booking(&booking).await?;
        tx.update_ticket(&ticket).await?;
        tx.commit().await?;

        self.release_lock(ticket.id, LockHolder::new(user_id, booking_id))
            .await;
        tracing::info!(ticket_id = %ticket.id, "Booking cancelled");
        self.publish(&ticket, booking_id, ChangeReason::Cancelled);
        Ok(())
    }

    /// All bookings of `user_id`, newest first, with ticket and event context.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Store`] if the read fails.
    pub async fn list_bookings(&self, user_id: UserId) -> Result<Vec<BookingDetails>> {
        Ok(self.store.bookings_for_user(user_id).await?)
    }

    /// Expire one batch of reservations whose hold has lapsed.
    ///
    /// Each reservation is expired in its own transaction; one failure does
    /// not stop the rest of the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ReservationError::Store`] if the batch cannot be read.
    pub async fn reconcile_expired(&self) -> Result<ReconcileReport> {
        let now = self.clock.now();
        let candidates = self
            .store
            .expired_reservations(now, self.settings.sweep_batch_size)
            .await?;

        let mut report = ReconcileReport {
            examined: candidates.len(),
            ..ReconcileReport::default()
        };

        for booking in candidates {
            match self.expire_reservation(booking.id).await {
                Ok(Expiry::Applied) => report.expired += 1,
                Ok(Expiry::AlreadyResolved) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        booking_id = %booking.id,
                        ticket_id = %booking.ticket_id,
                        error = %e,
                        "Failed to expire reservation"
                    );
                }
            }
        }

        metrics::counter!("reservation.sweep.expired")
            .increment(u64::try_from(report.expired).unwrap_or(u64::MAX));
        Ok(report)
    }

    /// Mark a reservation expired and return its ticket to sale.
    ///
    /// Tolerates a booking that a concurrent caller already resolved.
    async fn expire_reservation(&self, booking_id: BookingId) -> Result<Expiry> {
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .booking_for_update(booking_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Booking(booking_id)))?;
        if booking.status != BookingStatus::Reserved {
            return Ok(Expiry::AlreadyResolved);
        }
        let mut ticket = tx
            .ticket_for_update(booking.ticket_id)
            .await?
            .ok_or(ReservationError::NotFound(Missing::Ticket(booking.ticket_id)))?;

        booking.expire()?;
        tx.update_booking(&booking).await?;
        if ticket.status == TicketStatus::Locked {
            ticket.release()?;
            tx.update_ticket(&ticket).await?;
        } else {
            tracing::warn!(
                ticket_id = %ticket.id,
                status = %ticket.status,
                "Expired reservation's ticket was not locked"
            );
        }
        tx.commit().await?;

        self.release_lock(booking.ticket_id, LockHolder::new(booking.user_id, booking.id))
            .await;
        self.publish(&ticket, booking_id, ChangeReason::Expired);
        Ok(Expiry::Applied)
    }

    /// Release `holder`'s lock. Failures are logged; the TTL reclaims it.
    async fn release_lock(&self, ticket_id: TicketId, holder: LockHolder) {
        match self.locks.release_held(ticket_id, holder).await {
            Ok(released) => {
                tracing::debug!(ticket_id = %ticket_id, released, "Ticket lock release");
            }
            Err(e) => tracing::warn!(
                ticket_id = %ticket_id,
                error = %e,
                "Failed to release ticket lock; it lapses at its TTL"
            ),
        }
    }

    fn publish(&self, ticket: &Ticket, booking_id: BookingId, reason: ChangeReason) {
        self.feed.publish(TicketChange {
            ticket_id: ticket.id,
            event_id: ticket.event_id,
            status: ticket.status,
            booking_id,
            reason,
            occurred_at: self.clock.now(),
        });
    }

    fn hold_window(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.settings.hold)
            .unwrap_or_else(|_| chrono::Duration::minutes(10))
    }
}

impl<S, L, P> std::fmt::Debug for ReservationCoordinator<S, L, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReservationCoordinator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
