//! Shared harness: a coordinator over in-memory collaborators on a manual clock.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use ticketlock_core::{Booking, Money, Ticket, TicketId};
use ticketlock_reservation::{ReservationCoordinator, ReservationSettings};
use ticketlock_testing::{
    InMemoryLockStore, InMemoryTicketStore, ManualClock, RecordingChangeFeed,
    ScriptedPaymentGateway, fixtures, init_test_tracing, test_epoch,
};

pub type Coordinator =
    ReservationCoordinator<InMemoryTicketStore, InMemoryLockStore, ScriptedPaymentGateway>;

/// Reservation hold used by the default harness.
pub const HOLD: Duration = Duration::from_secs(600);

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<InMemoryTicketStore>,
    pub locks: Arc<InMemoryLockStore>,
    pub gateway: Arc<ScriptedPaymentGateway>,
    pub feed: Arc<RecordingChangeFeed>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(ReservationSettings::default())
    }

    pub fn with_settings(settings: ReservationSettings) -> Self {
        init_test_tracing();

        let clock = ManualClock::new(test_epoch());
        let store = Arc::new(InMemoryTicketStore::new());
        let locks = Arc::new(InMemoryLockStore::new(Arc::new(clock.clone())));
        let gateway = Arc::new(ScriptedPaymentGateway::new());
        let feed = Arc::new(RecordingChangeFeed::new());

        let coordinator = Arc::new(ReservationCoordinator::new(
            Arc::clone(&store),
            Arc::clone(&locks),
            Arc::clone(&gateway),
            Arc::clone(&feed) as Arc<dyn ticketlock_core::ChangeFeed>,
            Arc::new(clock.clone()),
            settings,
        ));

        Self {
            clock,
            store,
            locks,
            gateway,
            feed,
            coordinator,
        }
    }

    /// An available ticket priced at 99.99.
    pub async fn ticket(&self) -> Ticket {
        fixtures::seed_ticket(&self.store, Money::from_cents(9_999)).await
    }

    pub async fn stored_ticket(&self, id: TicketId) -> Ticket {
        use ticketlock_core::TicketStore;
        self.store.ticket(id).await.unwrap().unwrap()
    }

    pub async fn stored_booking(&self, id: ticketlock_core::BookingId) -> Booking {
        use ticketlock_core::TicketStore;
        self.store.booking(id).await.unwrap().unwrap()
    }

    /// User holding the ticket's lock, if it is live.
    pub async fn lock_holder(&self, id: TicketId) -> Option<ticketlock_core::UserId> {
        use ticketlock_core::LockStore;
        self.locks.holder_of(id).await.unwrap().map(|h| h.user_id)
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }
}
