//! Reservation error taxonomy.

use std::fmt;
use thiserror::Error;
use ticketlock_core::{BookingId, LockError, StoreError, TicketId, TransitionError, UserId};

/// What a `NotFound` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    /// A ticket id that does not exist
    Ticket(TicketId),
    /// A booking id that does not exist
    Booking(BookingId),
    /// No open reservation by this user on this ticket
    Reservation {
        /// Ticket looked up
        ticket_id: TicketId,
        /// User looked up
        user_id: UserId,
    },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ticket(id) => write!(f, "ticket {id}"),
            Self::Booking(id) => write!(f, "booking {id}"),
            Self::Reservation { ticket_id, user_id } => {
                write!(f, "reservation of ticket {ticket_id} by user {user_id}")
            }
        }
    }
}

/// Errors returned by the reservation coordinator.
#[derive(Error, Debug)]
pub enum ReservationError {
    /// Ticket or booking absent.
    #[error("Not found: {0}")]
    NotFound(Missing),

    /// Another user holds the ticket lock.
    #[error("Ticket {ticket_id} is locked by another reservation")]
    AlreadyLocked {
        /// Contended ticket
        ticket_id: TicketId,
    },

    /// The caller's lock expired or was taken over before it could be used.
    #[error("Lock on ticket {ticket_id} is no longer held by the caller")]
    LockReleased {
        /// Ticket whose lock was lost
        ticket_id: TicketId,
    },

    /// The ticket or booking is not in the status the operation needs.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The reservation window has passed.
    #[error("Reservation {booking_id} has expired")]
    Expired {
        /// Expired booking
        booking_id: BookingId,
    },

    /// The gateway declined the charge or could not be reached.
    ///
    /// Nothing durable changed; the reservation is still open.
    #[error("Payment failed: {reason}")]
    PaymentFailed {
        /// Decline reason or transport failure
        reason: String,
    },

    /// The charge succeeded but the confirmation could not be committed.
    ///
    /// The payment reference must be reconciled (commit retried or refunded)
    /// out-of-band.
    #[error("Payment {payment_ref} captured but booking {booking_id} was not confirmed: {reason}")]
    TransactionFailed {
        /// Booking that should have been confirmed
        booking_id: BookingId,
        /// Gateway reference of the captured charge
        payment_ref: String,
        /// Why the commit did not happen
        reason: String,
    },

    /// The caller does not own the booking.
    #[error("User {user_id} does not own booking {booking_id}")]
    Unauthorized {
        /// Booking acted upon
        booking_id: BookingId,
        /// Caller
        user_id: UserId,
    },

    /// Durable Store failure before any side effect.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Lock Store failure before any side effect.
    #[error(transparent)]
    Lock(#[from] LockError),
}

impl From<TransitionError> for ReservationError {
    fn from(e: TransitionError) -> Self {
        Self::Conflict(e.to_string())
    }
}

impl ReservationError {
    /// Short, stable label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyLocked { .. } => "already_locked",
            Self::LockReleased { .. } => "lock_released",
            Self::Conflict(_) => "conflict",
            Self::Expired { .. } => "expired",
            Self::PaymentFailed { .. } => "payment_failed",
            Self::TransactionFailed { .. } => "transaction_failed",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Store(_) => "store",
            Self::Lock(_) => "lock",
        }
    }

    /// Whether the caller may simply try the same operation again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::PaymentFailed { .. } | Self::Store(_) | Self::Lock(_)
        )
    }

    /// Whether the failure was lost contention on the ticket.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyLocked { .. } | Self::LockReleased { .. } | Self::Conflict(_)
        )
    }
}

/// Result alias for coordinator operations.
pub type Result<T> = std::result::Result<T, ReservationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_error_is_conflict() {
        let err: ReservationError = TransitionError {
            entity: "booking",
            from: "cancelled",
            to: "cancelled",
        }
        .into();
        assert!(err.is_conflict());
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ReservationError::PaymentFailed {
            reason: "declined".into()
        }
        .is_retryable());
        assert!(ReservationError::Store(StoreError::Database("down".into())).is_retryable());
        assert!(!ReservationError::TransactionFailed {
            booking_id: BookingId::new(),
            payment_ref: "pi_1".into(),
            reason: "commit".into(),
        }
        .is_retryable());
        assert!(!ReservationError::AlreadyLocked {
            ticket_id: TicketId::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_transaction_failed_message_carries_payment_ref() {
        let err = ReservationError::TransactionFailed {
            booking_id: BookingId::new(),
            payment_ref: "pi_mock_42".into(),
            reason: "connection reset".into(),
        };
        assert!(err.to_string().contains("pi_mock_42"));
    }

    #[test]
    fn test_missing_display() {
        let ticket = TicketId::new();
        assert_eq!(
            ReservationError::NotFound(Missing::Ticket(ticket)).to_string(),
            format!("Not found: ticket {ticket}")
        );
    }
}
