//! Ticket entity and its status state machine.
//!
//! ```text
//! available ──lock──▶ locked ──book──▶ booked
//!     ▲                 │                │
//!     └────release──────┴────release─────┘
//! ```
//!
//! `booked → available` is only reachable through cancellation of a
//! confirmed booking.

use crate::types::{EventId, Money, TicketId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Lifecycle status of a ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Free to be reserved.
    Available,
    /// Held by a live reservation pending payment.
    Locked,
    /// Paid for and owned.
    Booked,
}

impl TicketStatus {
    /// Database spelling of the status.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Locked => "locked",
            Self::Booked => "booked",
        }
    }

    /// Parse the database spelling.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownStatus`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self, UnknownStatus> {
        match s {
            "available" => Ok(Self::Available),
            "locked" => Ok(Self::Locked),
            "booked" => Ok(Self::Booked),
            other => Err(UnknownStatus {
                entity: "ticket",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status string read from storage that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {entity} status: {value:?}")]
pub struct UnknownStatus {
    /// Which entity the status belonged to
    pub entity: &'static str,
    /// The offending value
    pub value: String,
}

/// An attempted status change that the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal {entity} transition: {from} -> {to}")]
pub struct TransitionError {
    /// Which entity was being transitioned
    pub entity: &'static str,
    /// Status before the attempt
    pub from: &'static str,
    /// Requested status
    pub to: &'static str,
}

/// A single purchasable seat for an event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket identity
    pub id: TicketId,
    /// Event this ticket admits to
    pub event_id: EventId,
    /// Seat label (e.g. `"VIP-12"`)
    pub seat: String,
    /// Price in minor units
    pub price: Money,
    /// Current status
    pub status: TicketStatus,
    /// Owner once booked
    pub owner: Option<UserId>,
}

impl Ticket {
    /// Creates an available, unowned ticket.
    #[must_use]
    pub fn new(event_id: EventId, seat: impl Into<String>, price: Money) -> Self {
        Self {
            id: TicketId::new(),
            event_id,
            seat: seat.into(),
            price,
            status: TicketStatus::Available,
            owner: None,
        }
    }

    /// Whether the ticket can be reserved right now.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.status, TicketStatus::Available)
    }

    /// `available → locked`.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the ticket is available.
    pub fn lock(&mut self) -> Result<(), TransitionError> {
        match self.status {
            TicketStatus::Available => {
                self.status = TicketStatus::Locked;
                Ok(())
            }
            TicketStatus::Locked | TicketStatus::Booked => Err(self.illegal(TicketStatus::Locked)),
        }
    }

    /// `locked → booked`, assigning the owner.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] unless the ticket is locked.
    pub fn book(&mut self, owner: UserId) -> Result<(), TransitionError> {
        match self.status {
            TicketStatus::Locked => {
                self.status = TicketStatus::Booked;
                self.owner = Some(owner);
                Ok(())
            }
            TicketStatus::Available | TicketStatus::Booked => {
                Err(self.illegal(TicketStatus::Booked))
            }
        }
    }

    /// `locked | booked → available`, clearing the owner.
    ///
    /// # Errors
    ///
    /// Returns [`TransitionError`] if the ticket is already available; freeing
    /// it twice would hide a double release.
    pub fn release(&mut self) -> Result<(), TransitionError> {
        match self.status {
            TicketStatus::Locked | TicketStatus::Booked => {
                self.status = TicketStatus::Available;
                self.owner = None;
                Ok(())
            }
            TicketStatus::Available => Err(self.illegal(TicketStatus::Available)),
        }
    }

    const fn illegal(&self, to: TicketStatus) -> TransitionError {
        TransitionError {
            entity: "ticket",
            from: self.status.as_str(),
            to: to.as_str(),
        }
    }
}
