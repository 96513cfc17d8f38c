//! Lock Store abstraction: the mutual-exclusion primitive for reservations.
//!
//! The key is the ticket id and the value is a [`LockHolder`]: the user and
//! the booking the lock was taken for. Every entry carries a TTL equal to the
//! reservation hold; an abandoned hold disappears on its own.
//!
//! Scoping the value to the booking means a late release for an old booking
//! never frees a newer hold by the same user.
//!
//! # Atomicity
//!
//! [`LockStore::acquire_if_absent`] MUST be a single atomic round trip
//! (Redis `SET key value NX PX ttl`). It is the only thing that decides which
//! of several concurrent reservers wins a ticket; the ticket status column is
//! merely a hint. [`LockStore::release_held`] and [`LockStore::extend`] MUST
//! compare the holder and act in the same atomic step (a Lua script in
//! Redis), or a stale caller could free or prolong someone else's hold.

use crate::types::{BookingId, TicketId, UserId};
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Value stored under a ticket's lock key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LockHolder {
    /// User holding the ticket
    pub user_id: UserId,
    /// Booking the hold belongs to
    pub booking_id: BookingId,
}

impl LockHolder {
    /// Holder token for `booking_id` made by `user_id`.
    #[must_use]
    pub const fn new(user_id: UserId, booking_id: BookingId) -> Self {
        Self {
            user_id,
            booking_id,
        }
    }
}

/// `{user_id}:{booking_id}`
impl fmt::Display for LockHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_id, self.booking_id)
    }
}

/// A lock value that is not `{uuid}:{uuid}`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed lock holder: {0:?}")]
pub struct MalformedHolder(pub String);

impl FromStr for LockHolder {
    type Err = MalformedHolder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedHolder(s.to_string());
        let (user, booking) = s.split_once(':').ok_or_else(malformed)?;
        let user = Uuid::parse_str(user).map_err(|_| malformed())?;
        let booking = Uuid::parse_str(booking).map_err(|_| malformed())?;
        Ok(Self::new(UserId::from_uuid(user), BookingId::from_uuid(booking)))
    }
}

/// Errors raised by a Lock Store implementation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    /// Connection or command failure.
    #[error("Lock backend error: {0}")]
    Backend(String),

    /// A stored holder value could not be decoded.
    #[error("Corrupt lock value for ticket {ticket_id}: {value:?}")]
    Corrupt {
        /// Ticket whose lock entry is malformed
        ticket_id: TicketId,
        /// Raw value found
        value: String,
    },
}

/// Result alias for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Transient key-value store with per-key TTL and conditional set.
pub trait LockStore: Send + Sync {
    /// Take the lock for `holder` unless a live entry exists.
    ///
    /// Returns `true` if this call created the entry.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store cannot be reached.
    fn acquire_if_absent(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Remove the entry regardless of holder. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store cannot be reached.
    fn release(&self, ticket_id: TicketId) -> impl Future<Output = LockResult<()>> + Send;

    /// Remove the entry only if it is held by `holder`. Idempotent.
    ///
    /// Returns `true` if an entry was removed.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store cannot be reached.
    fn release_held(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
    ) -> impl Future<Output = LockResult<bool>> + Send;

    /// Current holder of the live entry, if any.
    ///
    /// # Errors
    ///
    /// Returns [`LockError`] if the store cannot be reached or the entry is
    /// malformed.
    fn holder_of(&self, ticket_id: TicketId)
    -> impl Future<Output = LockResult<Option<LockHolder>>> + Send;

    /// Ensure `holder`'s entry lives for at least `ttl` from now.
    ///
    /// Never shortens a longer remaining TTL. Returns `false` if the entry is
    /// absent or held by someone else.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Backend`] if the store cannot be reached.
    fn extend(
        &self,
        ticket_id: TicketId,
        holder: LockHolder,
        ttl: Duration,
    ) -> impl Future<Output = LockResult<bool>> + Send;
}
