//! Payment Gateway contract.
//!
//! The gateway is an external, non-transactional collaborator: a successful
//! charge cannot be undone by this core. Callers must therefore treat any
//! failure *after* a successful charge as a reconciliation case.

use crate::types::{Money, TicketId, UserId};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

/// Charge request sent to the gateway.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Amount to charge
    pub amount: Money,
    /// ISO-ish currency code (e.g. `"ntd"`)
    pub currency: String,
    /// Paying user
    pub user_id: UserId,
    /// Ticket being paid for
    pub ticket_id: TicketId,
    /// Opaque payment details supplied by the caller (card token, wallet id)
    pub payment_method: String,
}

/// Gateway response for a created payment intent.
///
/// A declined charge is a *successful call* with `success == false`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Gateway reference id
    pub id: String,
    /// Whether the charge went through
    pub success: bool,
    /// Gateway status string (e.g. `"succeeded"`, `"failed"`)
    pub status: String,
    /// Decline reason, if any
    pub error: Option<String>,
}

/// Transport-level gateway failures (the call itself did not complete).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The gateway did not answer in time.
    #[error("Gateway timeout")]
    Timeout,

    /// The gateway could not be reached or answered with a server error.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The request was rejected as malformed.
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
}

/// Abstraction over payment processors.
pub trait PaymentGateway: Send + Sync {
    /// Create (and capture) a payment intent.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] if the call does not complete. A declined
    /// charge is returned as `Ok` with `success == false`.
    fn create_intent(
        &self,
        request: PaymentRequest,
    ) -> impl Future<Output = Result<PaymentIntent, GatewayError>> + Send;
}
