//! # Ticketlock Testing
//!
//! In-memory collaborators and helpers for testing the reservation core.
//!
//! This crate provides:
//! - [`InMemoryTicketStore`]: transactional Durable Store with fault injection
//! - [`InMemoryLockStore`]: TTL Lock Store driven by an injected clock
//! - [`ScriptedPaymentGateway`]: queued approve/decline/failure answers
//! - [`RecordingChangeFeed`]: captures post-commit notifications
//! - [`FixedClock`] / [`ManualClock`]: deterministic time
//! - [`fixtures`]: a catalogued event with priced tickets
//!
//! ## Example
//!
//! ```ignore
//! let clock = ManualClock::new(test_epoch());
//! let store = Arc::new(InMemoryTicketStore::new());
//! let locks = Arc::new(InMemoryLockStore::new(Arc::new(clock.clone())));
//! let ticket = fixtures::seed_ticket(&store, Money::from_cents(9999)).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod feed;
pub mod lock;
pub mod payment;
pub mod store;

pub use clock::{FixedClock, ManualClock, test_clock, test_epoch};
pub use feed::RecordingChangeFeed;
pub use lock::InMemoryLockStore;
pub use payment::{PaymentOutcome, ScriptedPaymentGateway};
pub use store::{InMemoryTicketStore, InMemoryTransaction};

/// Test data builders.
pub mod fixtures {
    use crate::clock::test_epoch;
    use crate::store::InMemoryTicketStore;
    use chrono::Duration;
    use ticketlock_core::{
        EventId, EventSummary, Money, PerformerSummary, Ticket, VenueSummary,
    };

    /// A catalogued event in a known venue.
    #[must_use]
    pub fn event() -> EventSummary {
        EventSummary {
            id: EventId::new(),
            name: "Coldplay - Music of the Spheres".to_string(),
            date: test_epoch() + Duration::days(30),
            venue: VenueSummary {
                location: "Hollywood Bowl, Los Angeles".to_string(),
                capacity: 17_500,
            },
            performer: PerformerSummary {
                name: "Coldplay".to_string(),
                genre: Some("Rock".to_string()),
            },
        }
    }

    /// Register a fresh event and one available ticket for it.
    pub async fn seed_ticket(store: &InMemoryTicketStore, price: Money) -> Ticket {
        let event = event();
        let ticket = Ticket::new(event.id, "Standard-1", price);
        store.add_event(event).await;
        store.add_ticket(ticket.clone()).await;
        ticket
    }
}

/// Install a `tracing` subscriber that writes through the test harness.
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_test_writer()
        .try_init();
}
