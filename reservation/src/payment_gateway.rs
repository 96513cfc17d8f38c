//! Mock payment gateway for development.
//!
//! Simulates a card processor: a random network delay, then an approval with
//! the configured probability. Declines look like an insufficient-funds
//! answer. In production this is replaced by a real processor integration.

use rand::Rng;
use std::time::Duration;
use ticketlock_core::{GatewayError, PaymentGateway, PaymentIntent, PaymentRequest};

/// Decline message returned by the mock processor.
pub const MOCK_DECLINE_REASON: &str = "Mock payment failure - insufficient funds";

/// Randomised payment gateway.
#[derive(Debug, Clone)]
pub struct MockPaymentGateway {
    success_rate: f64,
    min_latency_ms: u64,
    max_latency_ms: u64,
}

impl MockPaymentGateway {
    /// Gateway approving a `success_rate` fraction of charges (clamped to `0.0..=1.0`)
    /// after 100-600 ms.
    #[must_use]
    pub fn new(success_rate: f64) -> Self {
        let success_rate = if success_rate.is_nan() {
            0.0
        } else {
            success_rate.clamp(0.0, 1.0)
        };
        Self {
            success_rate,
            min_latency_ms: 100,
            max_latency_ms: 600,
        }
    }

    /// Answer immediately.
    #[must_use]
    pub const fn without_latency(mut self) -> Self {
        self.min_latency_ms = 0;
        self.max_latency_ms = 0;
        self
    }

    /// Configured approval probability.
    #[must_use]
    pub const fn success_rate(&self) -> f64 {
        self.success_rate
    }
}

impl Default for MockPaymentGateway {
    fn default() -> Self {
        Self::new(0.95)
    }
}

impl PaymentGateway for MockPaymentGateway {
    async fn create_intent(&self, request: PaymentRequest) -> Result<PaymentIntent, GatewayError> {
        if request.payment_method.trim().is_empty() {
            return Err(GatewayError::InvalidRequest(
                "payment details are required".to_string(),
            ));
        }
        if request.amount.is_zero() {
            return Err(GatewayError::InvalidRequest("amount must be positive".to_string()));
        }

        // ThreadRng is not Send; draw everything before the first await.
        let (latency, success) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.min_latency_ms..=self.max_latency_ms),
                rng.gen_bool(self.success_rate),
            )
        };
        tokio::time::sleep(Duration::from_millis(latency)).await;

        let id = format!(
            "pi_mock_{}_{}",
            request.user_id,
            chrono::Utc::now().timestamp()
        );

        tracing::info!(
            payment_ref = %id,
            amount = %request.amount,
            currency = %request.currency,
            ticket_id = %request.ticket_id,
            success,
            "Mock payment processed"
        );

        Ok(if success {
            PaymentIntent {
                id,
                success: true,
                status: "succeeded".to_string(),
                error: None,
            }
        } else {
            PaymentIntent {
                id,
                success: false,
                status: "failed".to_string(),
                error: Some(MOCK_DECLINE_REASON.to_string()),
            }
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use ticketlock_core::{Money, TicketId, UserId};

    fn request(method: &str) -> PaymentRequest {
        PaymentRequest {
            amount: Money::from_cents(9_999),
            currency: "ntd".to_string(),
            user_id: UserId::new(),
            ticket_id: TicketId::new(),
            payment_method: method.to_string(),
        }
    }

    #[tokio::test]
    async fn test_always_approves_at_full_rate() {
        let gateway = MockPaymentGateway::new(1.0).without_latency();
        let req = request("tok_visa");
        let user = req.user_id;

        let intent = gateway.create_intent(req).await.unwrap();

        assert!(intent.success);
        assert_eq!(intent.status, "succeeded");
        assert!(intent.id.starts_with(&format!("pi_mock_{user}_")));
        assert!(intent.error.is_none());
    }

    #[tokio::test]
    async fn test_always_declines_at_zero_rate() {
        let gateway = MockPaymentGateway::new(0.0).without_latency();

        let intent = gateway.create_intent(request("tok_visa")).await.unwrap();

        assert!(!intent.success);
        assert_eq!(intent.status, "failed");
        assert_eq!(intent.error.as_deref(), Some(MOCK_DECLINE_REASON));
    }

    #[tokio::test]
    async fn test_rejects_missing_payment_details() {
        let gateway = MockPaymentGateway::new(1.0).without_latency();

        let result = gateway.create_intent(request("  ")).await;

        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
    }

    #[test]
    fn test_success_rate_is_clamped() {
        assert!((MockPaymentGateway::new(1.7).success_rate() - 1.0).abs() < f64::EPSILON);
        assert!(MockPaymentGateway::new(-0.2).success_rate().abs() < f64::EPSILON);
    }

    proptest::proptest! {
        #[test]
        fn prop_success_rate_always_a_probability(rate in proptest::num::f64::ANY) {
            let clamped = MockPaymentGateway::new(rate).success_rate();
            proptest::prop_assert!((0.0..=1.0).contains(&clamped));
        }
    }
}
