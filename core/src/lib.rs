//! # Ticketlock Core
//!
//! Domain model and collaborator traits for the ticket reservation core.
//!
//! A ticket is a scarce resource. A user reserves it, holds it for a fixed
//! window while paying, and either confirms, cancels, or lets the hold lapse.
//! This crate defines the pieces every layer agrees on:
//!
//! - **Entities**: [`Ticket`] and [`Booking`] with exhaustive status state
//!   machines ([`TicketStatus`], [`BookingStatus`])
//! - **Durable Store**: [`TicketStore`] with scoped [`StoreTransaction`]s
//! - **Lock Store**: [`LockStore`], the real race-resolution primitive
//! - **Payment Gateway**: [`PaymentGateway`], fallible and non-transactional
//! - **Change Feed**: [`ChangeFeed`], notified after commits
//! - **Environment**: [`environment::Clock`] for testable time
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────────────────────────┐
//!   request ──▶│   Reservation Coordinator  │──▶ ChangeFeed
//!              └─────┬──────────┬──────┬────┘
//!                    │          │      │
//!             ┌──────▼───┐ ┌────▼───┐ ┌▼────────────┐
//!             │ Durable  │ │ Lock   │ │ Payment     │
//!             │ Store    │ │ Store  │ │ Gateway     │
//!             │ (SQL tx) │ │ (TTL)  │ │ (external)  │
//!             └──────────┘ └────────┘ └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod booking;
pub mod change_feed;
pub mod lock;
pub mod payment;
pub mod store;
pub mod ticket;
pub mod types;

pub use booking::{
    Booking, BookingDetails, BookingStatus, EventSummary, PerformerSummary, VenueSummary,
};
pub use change_feed::{ChangeFeed, ChangeReason, TicketChange, TracingChangeFeed};
pub use lock::{LockError, LockHolder, LockResult, LockStore, MalformedHolder};
pub use payment::{GatewayError, PaymentGateway, PaymentIntent, PaymentRequest};
pub use store::{StoreError, StoreResult, StoreTransaction, TicketStore};
pub use ticket::{Ticket, TicketStatus, TransitionError, UnknownStatus};
pub use types::{BookingId, EventId, Money, TicketId, UserId};

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

/// Environment module - injected dependencies that are not stores
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use ticketlock_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let before = chrono::Utc::now();
    /// assert!(clock.now() >= before);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
