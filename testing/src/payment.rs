//! Scripted payment gateway.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use ticketlock_core::{GatewayError, PaymentGateway, PaymentIntent, PaymentRequest};

/// What the next gateway call should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    /// Charge succeeds.
    Approve,
    /// Charge is declined with a reason.
    Decline(String),
    /// The call fails at transport level.
    Fail(GatewayError),
    /// The call does not return for the given duration.
    Stall(Duration),
    /// Charge succeeds after the given delay.
    ApproveAfter(Duration),
}

/// Payment gateway whose answers are queued by the test.
///
/// When the queue is empty every charge is approved. Every request is
/// recorded so tests can assert what was (or was not) charged.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPaymentGateway {
    script: Arc<Mutex<VecDeque<PaymentOutcome>>>,
    requests: Arc<Mutex<Vec<PaymentRequest>>>,
    sequence: Arc<AtomicUsize>,
}

impl ScriptedPaymentGateway {
    /// Create a gateway that approves everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of a future call.
    pub fn push(&self, outcome: PaymentOutcome) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(outcome);
    }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PaymentGateway for ScriptedPaymentGateway {
    async fn create_intent(&self, request: PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        let outcome = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(PaymentOutcome::Approve);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        let n = self.sequence.fetch_add(1, Ordering::SeqCst);
        let id = format!("pi_test_{n}");

        match outcome {
            PaymentOutcome::Approve => Ok(PaymentIntent {
                id,
                success: true,
                status: "succeeded".to_string(),
                error: None,
            }),
            PaymentOutcome::Decline(reason) => Ok(PaymentIntent {
                id,
                success: false,
                status: "failed".to_string(),
                error: Some(reason),
            }),
            PaymentOutcome::Fail(e) => Err(e),
            PaymentOutcome::ApproveAfter(delay) => {
                tokio::time::sleep(delay).await;
                Ok(PaymentIntent {
                    id,
                    success: true,
                    status: "succeeded".to_string(),
                    error: None,
                })
            }
            PaymentOutcome::Stall(for_how_long) => {
                tokio::time::sleep(for_how_long).await;
                Err(GatewayError::Timeout)
            }
        }
    }
}
