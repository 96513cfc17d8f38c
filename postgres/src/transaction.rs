//! Scoped `PostgreSQL` transaction.

use crate::map_sqlx;
use crate::rows::{BOOKING_COLUMNS, TICKET_COLUMNS, booking_from_row, ticket_from_row};
use sqlx::{Postgres, Transaction};
use ticketlock_core::{
    Booking, BookingId, StoreError, StoreResult, StoreTransaction, Ticket, TicketId,
};

/// A `PostgreSQL` transaction over tickets and bookings.
///
/// Wraps [`sqlx::Transaction`], which issues `ROLLBACK` when dropped without
/// a commit, so every early return discards the unit of work.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

impl PostgresTransaction {
    pub(crate) const fn new(tx: Transaction<'static, Postgres>) -> Self {
        Self { tx }
    }
}

impl std::fmt::Debug for PostgresTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresTransaction").finish_non_exhaustive()
    }
}

impl StoreTransaction for PostgresTransaction {
    async fn ticket_for_update(&mut self, id: TicketId) -> StoreResult<Option<Ticket>> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn booking_for_update(&mut self, id: BookingId) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn insert_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO bookings (
                id, ticket_id, user_id, status, reserved_at, expires_at, payment_ref
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.ticket_id.as_uuid())
        .bind(booking.user_id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.reserved_at)
        .bind(booking.expires_at)
        .bind(booking.payment_ref.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }

    async fn update_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE bookings
            SET status = $2, payment_ref = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(booking.id.as_uuid())
        .bind(booking.status.as_str())
        .bind(booking.payment_ref.as_deref())
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "booking {} does not exist",
                booking.id
            )));
        }
        Ok(())
    }

    async fn update_ticket(&mut self, ticket: &Ticket) -> StoreResult<()> {
        let result = sqlx::query(
            r"
            UPDATE tickets
            SET status = $2, owner_id = $3, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.status.as_str())
        .bind(ticket.owner.map(|u| *u.as_uuid()))
        .execute(&mut *self.tx)
        .await
        .map_err(map_sqlx)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(format!(
                "ticket {} does not exist",
                ticket.id
            )));
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(|e| {
            metrics::counter!("ticket_store.commit.failed").increment(1);
            StoreError::Database(format!("Failed to commit transaction: {e}"))
        })
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to roll back transaction: {e}")))
    }
}
