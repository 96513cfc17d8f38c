//! Demo catalogue for local development.
//!
//! Seeds venues, performers, one event per performer and a tiered block of
//! tickets per event. Nothing is written when a venue already exists.

use crate::map_sqlx;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use ticketlock_core::{Money, StoreError, StoreResult};
use uuid::Uuid;

/// A priced block of seats, labelled `<section>-<n>`.
#[derive(Debug, Clone, Copy)]
pub struct PriceTier {
    /// Seat label prefix
    pub section: &'static str,
    /// Price per ticket
    pub price: Money,
    /// Number of tickets in the tier
    pub count: usize,
}

/// Tiers created for every seeded event.
pub const PRICE_TIERS: [PriceTier; 4] = [
    PriceTier {
        section: "VIP",
        price: Money::from_cents(29_999),
        count: 100,
    },
    PriceTier {
        section: "Premium",
        price: Money::from_cents(19_999),
        count: 200,
    },
    PriceTier {
        section: "Standard",
        price: Money::from_cents(9_999),
        count: 300,
    },
    PriceTier {
        section: "Economy",
        price: Money::from_cents(4_999),
        count: 400,
    },
];

const VENUES: [(&str, &str, i32); 3] = [
    (
        "Madison Square Garden, New York",
        r#"{"sections": ["A", "B", "C"], "rows": 50, "seatsPerRow": 20}"#,
        20_789,
    ),
    (
        "Hollywood Bowl, Los Angeles",
        r#"{"sections": ["1", "2", "3"], "rows": 30, "seatsPerRow": 25}"#,
        17_500,
    ),
    (
        "Royal Albert Hall, London",
        r#"{"sections": ["Stalls", "Circle", "Gallery"], "rows": 40, "seatsPerRow": 15}"#,
        5_272,
    ),
];

const PERFORMERS: [(&str, &str, &str); 4] = [
    ("Taylor Swift", "Pop superstar", "Pop"),
    ("Coldplay", "British rock band", "Rock"),
    ("Ed Sheeran", "Singer-songwriter", "Pop"),
    ("Billie Eilish", "Alternative pop artist", "Alternative"),
];

/// (venue index, performer index, name, description, y, m, d, h, min)
type EventRow = (usize, usize, &'static str, &'static str, i32, u32, u32, u32, u32);

const EVENTS: [EventRow; 4] = [
    (
        0,
        0,
        "Taylor Swift - Eras Tour",
        "The Eras Tour is coming to Madison Square Garden",
        2024,
        6,
        15,
        20,
        0,
    ),
    (
        1,
        1,
        "Coldplay - Music of the Spheres",
        "Experience Coldplay's cosmic journey",
        2024,
        7,
        20,
        19,
        30,
    ),
    (
        2,
        2,
        "Ed Sheeran - Mathematics Tour",
        "Ed Sheeran's intimate acoustic performance",
        2024,
        8,
        10,
        20,
        0,
    ),
    (
        0,
        3,
        "Billie Eilish - Happier Than Ever",
        "Billie Eilish's hauntingly beautiful performance",
        2024,
        9,
        5,
        19,
        0,
    ),
];

/// Counts of rows written by [`seed_demo_catalogue`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Events created
    pub events: usize,
    /// Tickets created
    pub tickets: usize,
}

fn event_date(y: i32, m: u32, d: u32, h: u32, min: u32) -> StoreResult<DateTime<Utc>> {
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|date| date.and_hms_opt(h, min, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| StoreError::Database(format!("invalid event date {y}-{m}-{d}")))
}

/// Seed the demo catalogue if the database has no venues yet.
///
/// Returns `None` when seeding was skipped.
///
/// # Errors
///
/// Returns [`StoreError`] if any insert fails; nothing is written in that case.
pub async fn seed_demo_catalogue(pool: &PgPool) -> StoreResult<Option<SeedSummary>> {
    let mut tx = pool.begin().await.map_err(map_sqlx)?;

    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx)?;
    if existing > 0 {
        tracing::info!("Demo catalogue already present, skipping seed");
        return Ok(None);
    }

    let mut venue_ids = Vec::with_capacity(VENUES.len());
    for (location, seat_map, capacity) in VENUES {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO venues (id, location, seat_map, capacity) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(location)
            .bind(seat_map)
            .bind(capacity)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        venue_ids.push(id);
    }

    let mut performer_ids = Vec::with_capacity(PERFORMERS.len());
    for (name, description, genre) in PERFORMERS {
        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO performers (id, name, description, genre) VALUES ($1, $2, $3, $4)")
            .bind(id)
            .bind(name)
            .bind(description)
            .bind(genre)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
        performer_ids.push(id);
    }

    let mut summary = SeedSummary::default();
    for (venue, performer, name, description, y, m, d, h, min) in EVENTS {
        let event_id = Uuid::new_v4();
        sqlx::query(
            r"
            INSERT INTO events (id, venue_id, performer_id, name, description, date)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(event_id)
        .bind(venue_ids[venue])
        .bind(performer_ids[performer])
        .bind(name)
        .bind(description)
        .bind(event_date(y, m, d, h, min)?)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;

        let (ids, seats, prices) = tier_rows();
        summary.tickets += ids.len();
        sqlx::query(
            r"
            INSERT INTO tickets (id, event_id, seat, price_cents)
            SELECT id, $1, seat, price_cents
            FROM UNNEST($2::uuid[], $3::text[], $4::bigint[]) AS t(id, seat, price_cents)
            ",
        )
        .bind(event_id)
        .bind(ids)
        .bind(seats)
        .bind(prices)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx)?;
        summary.events += 1;
    }

    tx.commit().await.map_err(map_sqlx)?;

    tracing::info!(
        events = summary.events,
        tickets = summary.tickets,
        "Seeded demo catalogue"
    );
    Ok(Some(summary))
}

fn tier_rows() -> (Vec<Uuid>, Vec<String>, Vec<i64>) {
    let total = PRICE_TIERS.iter().map(|t| t.count).sum();
    let mut ids = Vec::with_capacity(total);
    let mut seats = Vec::with_capacity(total);
    let mut prices = Vec::with_capacity(total);
    for tier in PRICE_TIERS {
        for n in 1..=tier.count {
            ids.push(Uuid::new_v4());
            seats.push(format!("{}-{n}", tier.section));
            prices.push(tier.price.cents());
        }
    }
    (ids, seats, prices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_cover_one_thousand_seats() {
        let (ids, seats, prices) = tier_rows();
        assert_eq!(ids.len(), 1000);
        assert_eq!(seats[0], "VIP-1");
        assert_eq!(seats[99], "VIP-100");
        assert_eq!(seats[100], "Premium-1");
        assert_eq!(seats[999], "Economy-400");
        assert_eq!(prices[0], 29_999);
        assert_eq!(prices[999], 4_999);
    }

    #[test]
    fn event_dates_are_valid() {
        for (_, _, _, _, y, m, d, h, min) in EVENTS {
            assert!(event_date(y, m, d, h, min).is_ok());
        }
        assert!(event_date(2024, 2, 30, 0, 0).is_err());
    }
}
