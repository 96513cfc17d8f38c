//! Post-commit change notifications for downstream read models (search
//! index, analytics).
//!
//! Publishing happens strictly after a durable commit. Delivery guarantees
//! belong to the feed implementation; a publish failure never undoes or fails
//! the committed operation.

use crate::ticket::TicketStatus;
use crate::types::{BookingId, EventId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What caused the ticket to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeReason {
    /// A reservation locked the ticket.
    Reserved,
    /// Payment confirmed; the ticket is booked.
    Confirmed,
    /// The booking was cancelled; the ticket is available again.
    Cancelled,
    /// The hold lapsed; the ticket is available again.
    Expired,
}

/// A committed ticket state change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketChange {
    /// Ticket that changed
    pub ticket_id: TicketId,
    /// Its event (search documents are per event)
    pub event_id: EventId,
    /// Status after the commit
    pub status: TicketStatus,
    /// Booking that drove the change
    pub booking_id: BookingId,
    /// Why
    pub reason: ChangeReason,
    /// Commit time as seen by the coordinator's clock
    pub occurred_at: DateTime<Utc>,
}

/// Sink for committed ticket changes.
pub trait ChangeFeed: Send + Sync {
    /// Publish a change. Implementations must not block for long; buffer or
    /// hand off instead.
    fn publish(&self, change: TicketChange);
}

/// Change feed that only logs. Used when no index is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChangeFeed;

impl ChangeFeed for TracingChangeFeed {
    fn publish(&self, change: TicketChange) {
        tracing::debug!(
            ticket_id = %change.ticket_id,
            event_id = %change.event_id,
            booking_id = %change.booking_id,
            status = %change.status,
            reason = ?change.reason,
            "Ticket change committed"
        );
    }
}
