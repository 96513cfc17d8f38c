//! Row decoding from `sqlx` rows into domain types.

use sqlx::Row;
use sqlx::postgres::PgRow;
use ticketlock_core::{
    Booking, BookingDetails, BookingId, BookingStatus, EventId, EventSummary, Money,
    PerformerSummary, StoreError, Ticket, TicketId, TicketStatus, UserId, VenueSummary,
};

pub(crate) const TICKET_COLUMNS: &str = "id, event_id, seat, price_cents, status, owner_id";

pub(crate) const BOOKING_COLUMNS: &str =
    "id, ticket_id, user_id, status, reserved_at, expires_at, payment_ref";

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

pub(crate) fn ticket_from_row(row: &PgRow) -> Result<Ticket, StoreError> {
    let status: String = column(row, "status")?;
    Ok(Ticket {
        id: TicketId::from_uuid(column(row, "id")?),
        event_id: EventId::from_uuid(column(row, "event_id")?),
        seat: column(row, "seat")?,
        price: Money::from_cents(column(row, "price_cents")?),
        status: TicketStatus::parse(&status)?,
        owner: column::<Option<uuid::Uuid>>(row, "owner_id")?.map(UserId::from_uuid),
    })
}

pub(crate) fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    let status: String = column(row, "status")?;
    Ok(Booking {
        id: BookingId::from_uuid(column(row, "id")?),
        ticket_id: TicketId::from_uuid(column(row, "ticket_id")?),
        user_id: UserId::from_uuid(column(row, "user_id")?),
        status: BookingStatus::parse(&status)?,
        reserved_at: column(row, "reserved_at")?,
        expires_at: column(row, "expires_at")?,
        payment_ref: column(row, "payment_ref")?,
    })
}

/// Decodes one row of the booking listing join (see `bookings_for_user`).
pub(crate) fn details_from_row(row: &PgRow) -> Result<BookingDetails, StoreError> {
    let booking = booking_from_row(row)?;
    let ticket_status: String = column(row, "ticket_status")?;
    let event_id = EventId::from_uuid(column(row, "event_id")?);

    let ticket = Ticket {
        id: booking.ticket_id,
        event_id,
        seat: column(row, "seat")?,
        price: Money::from_cents(column(row, "price_cents")?),
        status: TicketStatus::parse(&ticket_status)?,
        owner: column::<Option<uuid::Uuid>>(row, "owner_id")?.map(UserId::from_uuid),
    };

    let event = EventSummary {
        id: event_id,
        name: column(row, "event_name")?,
        date: column(row, "event_date")?,
        venue: VenueSummary {
            location: column(row, "venue_location")?,
            capacity: column(row, "venue_capacity")?,
        },
        performer: PerformerSummary {
            name: column(row, "performer_name")?,
            genre: column(row, "performer_genre")?,
        },
    };

    Ok(BookingDetails {
        booking,
        ticket,
        event,
    })
}
