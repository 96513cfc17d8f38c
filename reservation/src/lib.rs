//! # Ticketlock Reservation
//!
//! The reservation coordinator: reserves, confirms and cancels tickets under
//! concurrent contention, and reclaims reservations whose hold lapsed.
//!
//! - [`ReservationCoordinator`]: Reserve / Confirm / Cancel / `ListBookings` /
//!   `ReconcileExpired`
//! - [`SweepWorker`]: runs `ReconcileExpired` on an interval
//! - [`MockPaymentGateway`]: development payment processor
//! - [`Config`]: environment-driven service configuration
//!
//! ## Example
//!
//! ```ignore
//! let coordinator = ReservationCoordinator::new(
//!     Arc::new(store),
//!     Arc::new(locks),
//!     Arc::new(MockPaymentGateway::default()),
//!     Arc::new(TracingChangeFeed),
//!     Arc::new(SystemClock),
//!     ReservationSettings::default(),
//! );
//!
//! let reservation = coordinator.reserve(ticket_id, user_id).await?;
//! let confirmation = coordinator
//!     .confirm(ticket_id, user_id, PaymentDetails::new("tok_visa"))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod metrics;
pub mod payment_gateway;
pub mod sweep;

pub use config::Config;
pub use coordinator::{
    Confirmation, PaymentDetails, ReconcileReport, Reservation, ReservationCoordinator,
    ReservationSettings,
};
pub use error::{Missing, ReservationError, Result};
pub use payment_gateway::MockPaymentGateway;
pub use sweep::SweepWorker;
