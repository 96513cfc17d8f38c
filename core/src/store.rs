//! Durable Store abstraction: the transactional source of truth for tickets
//! and bookings.
//!
//! # Design
//!
//! Point reads go straight through [`TicketStore`]. Every mutation goes
//! through a [`StoreTransaction`] obtained from [`TicketStore::begin`], so the
//! booking row and the ticket row always change together or not at all.
//!
//! A transaction is scoped: it must be consumed by [`StoreTransaction::commit`]
//! to take effect. Dropping it on any other path (early `return`, `?`,
//! panic unwinding) discards its writes. Callers never need a manual rollback
//! on error paths; [`StoreTransaction::rollback`] exists for explicit,
//! logged abandonment.
//!
//! # Implementations
//!
//! - `PostgresTicketStore` (in `ticketlock-postgres`): production storage,
//!   `SELECT ... FOR UPDATE` row locks inside transactions
//! - `InMemoryTicketStore` (in `ticketlock-testing`): deterministic tests,
//!   serialised transactions with fault injection

use crate::booking::{Booking, BookingDetails};
use crate::ticket::{Ticket, UnknownStatus};
use crate::types::{BookingId, TicketId, UserId};
use chrono::{DateTime, Utc};
use std::future::Future;
use thiserror::Error;

/// Errors raised by a Durable Store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, query or commit failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A write violated a uniqueness or integrity constraint.
    #[error("Constraint violation: {0}")]
    Constraint(String),

    /// A stored row could not be decoded into the domain model.
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl From<UnknownStatus> for StoreError {
    fn from(e: UnknownStatus) -> Self {
        Self::Corrupt(e.to_string())
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Durable, transactional storage of tickets and bookings.
pub trait TicketStore: Send + Sync {
    /// Transaction handle type.
    type Tx: StoreTransaction;

    /// Open a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if no connection is available.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Tx>> + Send;

    /// Read a ticket.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn ticket(&self, id: TicketId) -> impl Future<Output = StoreResult<Option<Ticket>>> + Send;

    /// Read a booking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn booking(&self, id: BookingId) -> impl Future<Output = StoreResult<Option<Booking>>> + Send;

    /// The open (`reserved`) booking `user_id` holds on `ticket_id`.
    ///
    /// At most one exists: a ticket has at most one active booking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn reserved_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> impl Future<Output = StoreResult<Option<Booking>>> + Send;

    /// The most recent booking `user_id` made on `ticket_id`, in any status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn latest_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> impl Future<Output = StoreResult<Option<Booking>>> + Send;

    /// Reservations whose hold lapsed before `now`, oldest deadline first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or a row is corrupt.
    fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> impl Future<Output = StoreResult<Vec<Booking>>> + Send;

    /// All bookings of a user with ticket, event, venue and performer
    /// context, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or a row is corrupt.
    fn bookings_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = StoreResult<Vec<BookingDetails>>> + Send;
}

/// A scoped, all-or-nothing unit of work.
///
/// Reads through `*_for_update` lock the row until the transaction ends, so
/// the status observed there is the status the write applies to.
pub trait StoreTransaction: Send {
    /// Read and lock a ticket row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn ticket_for_update(
        &mut self,
        id: TicketId,
    ) -> impl Future<Output = StoreResult<Option<Ticket>>> + Send;

    /// Read and lock a booking row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the read fails or the row is corrupt.
    fn booking_for_update(
        &mut self,
        id: BookingId,
    ) -> impl Future<Output = StoreResult<Option<Booking>>> + Send;

    /// Insert a new booking.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if another active booking exists for
    /// the ticket, [`StoreError::Database`] on other failures.
    fn insert_booking(&mut self, booking: &Booking) -> impl Future<Output = StoreResult<()>> + Send;

    /// Persist the mutable fields of a booking (status, payment reference).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn update_booking(&mut self, booking: &Booking) -> impl Future<Output = StoreResult<()>> + Send;

    /// Persist the mutable fields of a ticket (status, owner).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn update_ticket(&mut self, ticket: &Ticket) -> impl Future<Output = StoreResult<()>> + Send;

    /// Make every write of this transaction durable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the commit fails; nothing was
    /// applied in that case.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the backend reports a failure
    /// while rolling back.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}
