//! Booking entity: a user's claim on a ticket, from reservation to a
//! terminal outcome.
//!
//! ```text
//! reserved ──confirm──▶ confirmed ──cancel──▶ cancelled
//!    │  └────────────cancel──────────────────▲
//!    └──expire──▶ expired
//! ```
//!
//! `confirmed` is terminal for payment purposes; it can still be cancelled by
//! its owner, which frees the ticket. `cancelled` and `expired` are final.

use crate::ticket::{Ticket, TransitionError, UnknownStatus};
use crate::types::{BookingId, EventId, TicketId, UserId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    /// Ticket held pending payment.
    Reserved,
    /// Paid; the ticket is owned by the booking's user.
    Confirmed,
    /// Withdrawn by the user.
    Cancelled,
    /// Hold window passed without confirmation.
    Expired,
}

impl BookingStatus {
    /// Database spelling of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "reserved",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }

    /// Parse the database spelling.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStatus`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "reserved" => Ok(Self::Reserved),
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownStatus {
                entity: "booking",
                value: other.to_string(),
            }),
        }
    }

    /// Reserved or confirmed: at most one such booking exists per ticket.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Reserved | Self::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A reservation or purchase of one ticket by one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identity
    pub id: BookingId,
    /// Ticket being held or bought
    pub ticket_id: TicketId,
    /// User holding the booking
    pub user_id: UserId,
    /// Current status
    pub status: BookingStatus,
    /// When the hold started
    pub reserved_at: DateTime<Utc>,
    /// When the hold lapses (`reserved_at + hold`)
    pub expires_at: DateTime<Utc>,
    /// Gateway reference once paid
    pub payment_ref: Option<String>,
}

impl Booking {
    /// Starts a new reservation on `ticket` for `user`.
    #[must_use]
    pub fn reserve(ticket: &Ticket, user_id: UserId, now: DateTime<Utc>, hold: Duration) -> Self {
        Self::reserve_with_id(BookingId::new(), ticket, user_id, now, hold)
    }

    /// Like [`Booking::reserve`], with an id chosen up front (the id the
    /// ticket lock was taken under).
    #[must_use]
    pub fn reserve_with_id(
        id: BookingId,
        ticket: &Ticket,
        user_id: UserId,
        now: DateTime<Utc>,
        hold: Duration,
    ) -> Self {
        Self {
            id,
            ticket_id: ticket.id,
            user_id,
            status: BookingStatus::Reserved,
            reserved_at: now,
            expires_at: now + hold,
            payment_ref: None,
        }
    }

    /// The hold window has passed (`now > expires_at`).
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Whether this booking still claims its ticket.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// `reserved → confirmed`, recording the payment reference.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the booking is reserved.
    pub fn confirm(&mut self, payment_ref: impl Into<String>) -> Result<(), TransitionError> {
        match self.status {
            BookingStatus::Reserved => {
                self.status = BookingStatus::Confirmed;
                self.payment_ref = Some(payment_ref.into());
                Ok(())
            }
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::Expired => {
                Err(self.illegal(BookingStatus::Confirmed))
            }
        }
    }

    /// `reserved | confirmed → cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the booking is already final.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        match self.status {
            BookingStatus::Reserved | BookingStatus::Confirmed => {
                self.status = BookingStatus::Cancelled;
                Ok(())
            }
            BookingStatus::Cancelled | BookingStatus::Expired => {
                Err(self.illegal(BookingStatus::Cancelled))
            }
        }
    }

    /// `reserved → expired`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the booking is reserved.
    pub fn expire(&mut self) -> Result<(), TransitionError> {
        match self.status {
            BookingStatus::Reserved => {
                self.status = BookingStatus::Expired;
                Ok(())
            }
            BookingStatus::Confirmed | BookingStatus::Cancelled | BookingStatus::Expired => {
                Err(self.illegal(BookingStatus::Expired))
            }
        }
    }

    const fn illegal(&self, to: BookingStatus) -> TransitionError {
        TransitionError {
            entity: "booking",
            from: self.status.as_str(),
            to: to.as_str(),
        }
    }
}

/// Venue context for a booking listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueSummary {
    /// Venue location (e.g. `"Madison Square Garden, New York"`)
    pub location: String,
    /// Seating capacity
    pub capacity: i32,
}

/// Performer context for a booking listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerSummary {
    /// Performer name
    pub name: String,
    /// Genre, if catalogued
    pub genre: Option<String>,
}

/// Event context for a booking listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    /// Event identity
    pub id: EventId,
    /// Event name
    pub name: String,
    /// When the event takes place
    pub date: DateTime<Utc>,
    /// Where
    pub venue: VenueSummary,
    /// Who
    pub performer: PerformerSummary,
}

/// A booking joined with its ticket, event, venue and performer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingDetails {
    /// The booking itself
    pub booking: Booking,
    /// The booked ticket
    pub ticket: Ticket,
    /// The ticket's event
    pub event: EventSummary,
}
