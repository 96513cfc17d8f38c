//! In-memory Durable Store with real transactional semantics.
//!
//! A transaction owns the table mutex for its whole lifetime and works on a
//! staged copy of the tables. `commit` swaps the copy in; dropping the
//! transaction throws it away. Transactions are therefore serialisable, and a
//! write that is never committed is never observed.
//!
//! Point reads on the store wait for any open transaction to finish.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use ticketlock_core::{
    Booking, BookingDetails, BookingId, DateTime, EventId, EventSummary, StoreError, StoreResult,
    StoreTransaction, Ticket, TicketId, TicketStore, UserId, Utc,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Clone, Default)]
struct Tables {
    tickets: HashMap<TicketId, Ticket>,
    bookings: HashMap<BookingId, Booking>,
    events: HashMap<EventId, EventSummary>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_next_write: AtomicBool,
    fail_next_commit: AtomicBool,
    commits: AtomicUsize,
}

/// Mock Durable Store.
///
/// Uses in-memory storage for testing, with fault injection for the write
/// and commit paths.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTicketStore {
    tables: Arc<Mutex<Tables>>,
    faults: Arc<Faults>,
}

impl InMemoryTicketStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an event so that bookings on its tickets can be listed.
    pub async fn add_event(&self, event: EventSummary) {
        self.tables.lock().await.events.insert(event.id, event);
    }

    /// Insert or overwrite a ticket outside any transaction.
    pub async fn add_ticket(&self, ticket: Ticket) {
        self.tables.lock().await.tickets.insert(ticket.id, ticket);
    }

    /// All bookings ever created for a ticket, in creation order.
    pub async fn bookings_for_ticket(&self, ticket_id: TicketId) -> Vec<Booking> {
        let tables = self.tables.lock().await;
        let mut bookings: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.ticket_id == ticket_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.reserved_at);
        bookings
    }

    /// Make the next `insert_booking`/`update_*` call fail.
    pub fn fail_next_write(&self) {
        self.faults.fail_next_write.store(true, Ordering::SeqCst);
    }

    /// Make the next `commit` fail (the transaction is discarded).
    pub fn fail_next_commit(&self) {
        self.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of successful commits so far.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.faults.commits.load(Ordering::SeqCst)
    }
}

impl TicketStore for InMemoryTicketStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        let guard = Arc::clone(&self.tables).lock_owned().await;
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            guard,
            staged,
            faults: Arc::clone(&self.faults),
        })
    }

    async fn ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        Ok(self.tables.lock().await.tickets.get(&id).cloned())
    }

    async fn booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.tables.lock().await.bookings.get(&id).cloned())
    }

    async fn reserved_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> StoreResult<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .find(|b| {
                b.ticket_id == ticket_id
                    && b.user_id == user_id
                    && b.status == ticketlock_core::BookingStatus::Reserved
            })
            .cloned())
    }

    async fn latest_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> StoreResult<Option<Booking>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.ticket_id == ticket_id && b.user_id == user_id)
            .max_by(|a, b| {
                a.reserved_at
                    .cmp(&b.reserved_at)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .cloned())
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Booking>> {
        let tables = self.tables.lock().await;
        let mut expired: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.status == ticketlock_core::BookingStatus::Reserved && b.expires_at < now)
            .cloned()
            .collect();
        expired.sort_by_key(|b| (b.expires_at, b.id));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn bookings_for_user(&self, user_id: UserId) -> StoreResult<Vec<BookingDetails>> {
        let tables = self.tables.lock().await;
        let mut details: Vec<BookingDetails> = tables
            .bookings
            .values()
            .filter(|b| b.user_id == user_id)
            .filter_map(|b| {
                let ticket = tables.tickets.get(&b.ticket_id)?;
                let event = tables.events.get(&ticket.event_id)?;
                Some(BookingDetails {
                    booking: b.clone(),
                    ticket: ticket.clone(),
                    event: event.clone(),
                })
            })
            .collect();
        details.sort_by(|a, b| {
            b.booking
                .reserved_at
                .cmp(&a.booking.reserved_at)
                .then_with(|| a.booking.id.cmp(&b.booking.id))
        });
        Ok(details)
    }
}

/// Transaction over [`InMemoryTicketStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    staged: Tables,
    faults: Arc<Faults>,
}

impl InMemoryTransaction {
    fn check_write_fault(&self) -> StoreResult<()> {
        if self.faults.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl StoreTransaction for InMemoryTransaction {
    async fn ticket_for_update(&mut self, id: TicketId) -> StoreResult<Option<Ticket>> {
        Ok(self.staged.tickets.get(&id).cloned())
    }

    async fn booking_for_update(&mut self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.staged.bookings.get(&id).cloned())
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.check_write_fault()?;

        if self.staged.bookings.contains_key(&booking.id) {
            return Err(StoreError::Constraint(format!(
                "booking {} already exists",
                booking.id
            )));
        }

        // Mirrors the partial unique index on active bookings per ticket.
        let clash = self
            .staged
            .bookings
            .values()
            .any(|b| b.ticket_id == booking.ticket_id && b.is_active());
        if clash && booking.is_active() {
            return Err(StoreError::Constraint(format!(
                "ticket {} already has an active booking",
                booking.ticket_id
            )));
        }

        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.check_write_fault()?;
        match self.staged.bookings.get_mut(&booking.id) {
            Some(row) => {
                row.status = booking.status;
                row.payment_ref.clone_from(&booking.payment_ref);
                Ok(())
            }
            None => Err(StoreError::Database(format!(
                "booking {} does not exist",
                booking.id
            ))),
        }
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        self.check_write_fault()?;
        match self.staged.tickets.get_mut(&ticket.id) {
            Some(row) => {
                row.status = ticket.status;
                row.owner = ticket.owner;
                Ok(())
            }
            None => Err(StoreError::Database(format!(
                "ticket {} does not exist",
                ticket.id
            ))),
        }
    }

    async fn commit(self) -> StoreResult<()> {
        let Self {
            mut guard,
            staged,
            faults,
        } = self;

        if faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(StoreError::Database("injected commit failure".to_string()));
        }

        *guard = staged;
        faults.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
