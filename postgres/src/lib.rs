//! `PostgreSQL` Durable Store for the ticket reservation core.
//!
//! This crate implements [`TicketStore`] on top of `sqlx`:
//!
//! - Connection pooling with configurable limits
//! - Embedded migrations (`migrations/` at the workspace root)
//! - Scoped transactions with `SELECT ... FOR UPDATE` row locks
//! - A partial unique index guaranteeing one live booking per ticket
//!
//! # Example
//!
//! ```no_run
//! use ticketlock_postgres::PostgresTicketStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresTicketStore::new("postgres://localhost/ticketlock").await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
pub mod seed;
mod transaction;

use rows::{BOOKING_COLUMNS, booking_from_row, details_from_row, ticket_from_row, TICKET_COLUMNS};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;
use ticketlock_core::{
    Booking, BookingDetails, BookingId, DateTime, StoreError, StoreResult, Ticket, TicketId,
    TicketStore, UserId, Utc,
};

pub use transaction::PostgresTransaction;

/// Pool sizing and timeouts.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of idle connections kept open
    pub min_connections: u32,
    /// How long to wait for a connection
    pub acquire_timeout: Duration,
    /// Close connections idle for longer than this
    pub idle_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Maps `sqlx` failures onto [`StoreError`].
pub(crate) fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            StoreError::Constraint(db.message().to_string())
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(e.to_string())
        }
        _ => StoreError::Database(e.to_string()),
    }
}

/// `PostgreSQL`-backed [`TicketStore`].
#[derive(Clone, Debug)]
pub struct PostgresTicketStore {
    pool: PgPool,
}

impl PostgresTicketStore {
    /// Connect with default pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn new(database_url: &str) -> StoreResult<Self> {
        Self::connect(database_url, &PoolSettings::default()).await
    }

    /// Connect with explicit pool settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the connection fails.
    pub async fn connect(database_url: &str, settings: &PoolSettings) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .idle_timeout(settings.idle_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

        tracing::info!(
            max_connections = settings.max_connections,
            "Connected to PostgreSQL ticket store"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        tracing::info!("Ticket store migrations applied");
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl TicketStore for PostgresTicketStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> StoreResult<PostgresTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to start transaction: {e}")))?;
        Ok(PostgresTransaction::new(tx))
    }

    async fn ticket(&self, id: TicketId) -> StoreResult<Option<Ticket>> {
        let query = format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn booking(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        let query = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn reserved_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> StoreResult<Option<Booking>> {
        let query = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ticket_id = $1 AND user_id = $2 AND status = 'reserved'"
        );
        let row = sqlx::query(&query)
            .bind(ticket_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn latest_booking(
        &self,
        ticket_id: TicketId,
        user_id: UserId,
    ) -> StoreResult<Option<Booking>> {
        let query = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE ticket_id = $1 AND user_id = $2 \
             ORDER BY reserved_at DESC, id \
             LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(ticket_id.as_uuid())
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(booking_from_row).transpose()
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<Booking>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let query = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status = 'reserved' AND expires_at < $1 \
             ORDER BY expires_at, id \
             LIMIT $2"
        );
        let rows = sqlx::query(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        rows.iter().map(booking_from_row).collect()
    }

    async fn bookings_for_user(&self, user_id: UserId) -> StoreResult<Vec<BookingDetails>> {
        let rows = sqlx::query(
            r"
            SELECT
                b.id, b.ticket_id, b.user_id, b.status, b.reserved_at, b.expires_at, b.payment_ref,
                t.event_id, t.seat, t.price_cents, t.status AS ticket_status, t.owner_id,
                e.name AS event_name, e.date AS event_date,
                v.location AS venue_location, v.capacity AS venue_capacity,
                p.name AS performer_name, p.genre AS performer_genre
            FROM bookings b
            JOIN tickets t ON t.id = b.ticket_id
            JOIN events e ON e.id = t.event_id
            JOIN venues v ON v.id = e.venue_id
            JOIN performers p ON p.id = e.performer_id
            WHERE b.user_id = $1
            ORDER BY b.reserved_at DESC, b.id
            ",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        rows.iter().map(details_from_row).collect()
    }
}
