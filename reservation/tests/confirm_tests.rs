//! Confirm: payment, lazy expiry, lost locks and the commit-after-charge gap.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

mod common;

use common::Harness;
use std::sync::Arc;
use std::time::Duration;
use ticketlock_core::{
    BookingId, BookingStatus, ChangeReason, GatewayError, LockHolder, Money, TicketStatus,
    UserId,
};
use ticketlock_reservation::{
    Missing, PaymentDetails, ReservationError, ReservationSettings,
};
use ticketlock_testing::PaymentOutcome;

fn card() -> PaymentDetails {
    PaymentDetails::new("tok_visa")
}

#[tokio::test]
async fn test_reserve_then_confirm_books_ticket() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();

    let confirmation = harness
        .coordinator
        .confirm(ticket.id, user, card())
        .await
        .unwrap();

    assert_eq!(confirmation.booking_id, reservation.booking_id);
    assert!(!confirmation.payment_ref.is_empty());

    let stored = harness.stored_ticket(ticket.id).await;
    assert_eq!(stored.status, TicketStatus::Booked);
    assert_eq!(stored.owner, Some(user));

    let booking = harness.stored_booking(reservation.booking_id).await;
    assert_eq!(booking.status, BookingStatus::Confirmed);
    assert_eq!(booking.payment_ref.as_deref(), Some(confirmation.payment_ref.as_str()));

    assert_eq!(harness.lock_holder(ticket.id).await, None);

    let reasons: Vec<_> = harness.feed.changes().iter().map(|c| c.reason).collect();
    assert_eq!(reasons, vec![ChangeReason::Reserved, ChangeReason::Confirmed]);
    assert_eq!(harness.feed.changes()[1].status, TicketStatus::Booked);
}

#[tokio::test]
async fn test_gateway_receives_price_currency_and_details() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    harness.coordinator.reserve(ticket.id, user).await.unwrap();

    harness
        .coordinator
        .confirm(ticket.id, user, PaymentDetails::new("pm_card_mastercard"))
        .await
        .unwrap();

    let requests = harness.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount, Money::from_cents(9_999));
    assert_eq!(requests[0].currency, "ntd");
    assert_eq!(requests[0].user_id, user);
    assert_eq!(requests[0].ticket_id, ticket.id);
    assert_eq!(requests[0].payment_method, "pm_card_mastercard");
}

/// Ticket T1 at 99.99: A reserves, B is locked out, A's hold lapses, B gets it.
#[tokio::test]
async fn test_expired_hold_returns_ticket_to_sale() {
    let harness = Harness::new();
    let t1 = harness.ticket().await;
    assert_eq!(t1.price, Money::from_cents(9_999));
    let (user_a, user_b) = (UserId::new(), UserId::new());

    let b1 = harness.coordinator.reserve(t1.id, user_a).await.unwrap();
    assert_eq!(
        b1.expires_at,
        ticketlock_testing::test_epoch() + chrono::Duration::minutes(10)
    );

    harness.advance_minutes(1);
    let blocked = harness.coordinator.reserve(t1.id, user_b).await;
    assert!(matches!(blocked, Err(ReservationError::AlreadyLocked { .. })));

    harness.advance_minutes(10);
    let late = harness.coordinator.confirm(t1.id, user_a, card()).await;
    assert!(matches!(
        late,
        Err(ReservationError::Expired { booking_id }) if booking_id == b1.booking_id
    ));
    assert_eq!(
        harness.stored_ticket(t1.id).await.status,
        TicketStatus::Available
    );
    assert_eq!(
        harness.stored_booking(b1.booking_id).await.status,
        BookingStatus::Expired
    );
    assert!(harness.gateway.requests().is_empty());

    harness.coordinator.reserve(t1.id, user_b).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_duplicate_confirms_after_expiry_reset_once() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let ticket_id = ticket.id;
    let user = UserId::new();
    harness.coordinator.reserve(ticket_id, user).await.unwrap();
    harness.advance_minutes(11);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let coordinator = Arc::clone(&harness.coordinator);
        handles.push(tokio::spawn(async move {
            coordinator.confirm(ticket_id, user, card()).await
        }));
    }
    for handle in handles {
        let result = handle.await.expect("confirm task panicked");
        assert!(
            matches!(result, Err(ReservationError::Expired { .. })),
            "expected Expired, got {result:?}"
        );
    }

    let expirations = harness
        .feed
        .changes()
        .iter()
        .filter(|c| c.reason == ChangeReason::Expired)
        .count();
    assert_eq!(expirations, 1);
    assert_eq!(
        harness.stored_ticket(ticket_id).await.status,
        TicketStatus::Available
    );

    // A later duplicate still sees Expired rather than NotFound.
    let again = harness.coordinator.confirm(ticket_id, user, card()).await;
    assert!(matches!(again, Err(ReservationError::Expired { .. })));
}

#[tokio::test]
async fn test_confirm_without_reservation_is_not_found() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let stranger = UserId::new();

    let result = harness.coordinator.confirm(ticket.id, stranger, card()).await;

    assert!(matches!(
        result,
        Err(ReservationError::NotFound(Missing::Reservation { user_id, .. })) if user_id == stranger
    ));
}

#[tokio::test]
async fn test_second_confirm_is_not_found() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness.coordinator.confirm(ticket.id, user, card()).await.unwrap();

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(matches!(result, Err(ReservationError::NotFound(_))));
    assert_eq!(harness.gateway.requests().len(), 1);
}

#[tokio::test]
async fn test_stolen_lock_is_lock_released_without_charge() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    let intruder = UserId::new();
    harness
        .locks
        .force_holder(ticket.id, LockHolder::new(intruder, BookingId::new()), common::HOLD)
        .unwrap();

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(matches!(result, Err(ReservationError::LockReleased { .. })));
    assert!(result.unwrap_err().is_conflict());
    assert!(harness.gateway.requests().is_empty());
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Reserved
    );
    assert_eq!(harness.lock_holder(ticket.id).await, Some(intruder));
}

#[tokio::test]
async fn test_lock_for_another_booking_of_the_same_user_is_lock_released() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness
        .locks
        .force_holder(ticket.id, LockHolder::new(user, BookingId::new()), common::HOLD)
        .unwrap();

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(matches!(result, Err(ReservationError::LockReleased { .. })));
    assert!(harness.gateway.requests().is_empty());
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Reserved
    );
}

#[tokio::test]
async fn test_rereserve_after_cancel_confirms_the_open_booking() {
    // Every reservation here shares one clock instant, so the cancelled and
    // the open booking tie on reserved_at.
    for _ in 0..40 {
        let harness = Harness::new();
        let ticket = harness.ticket().await;
        let user = UserId::new();
        let first = harness.coordinator.reserve(ticket.id, user).await.unwrap();
        harness.coordinator.cancel(first.booking_id, user).await.unwrap();
        let second = harness.coordinator.reserve(ticket.id, user).await.unwrap();

        let confirmation = harness
            .coordinator
            .confirm(ticket.id, user, card())
            .await
            .unwrap();

        assert_eq!(confirmation.booking_id, second.booking_id);
        assert_eq!(
            harness.stored_booking(first.booking_id).await.status,
            BookingStatus::Cancelled
        );
        assert_eq!(
            harness.stored_ticket(ticket.id).await.status,
            TicketStatus::Booked
        );
    }
}

#[tokio::test]
async fn test_expired_booking_then_no_reservation_reports_expired() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness.advance_minutes(11);
    harness.coordinator.reconcile_expired().await.unwrap();

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(matches!(
        result,
        Err(ReservationError::Expired { booking_id }) if booking_id == reservation.booking_id
    ));
}

#[tokio::test]
async fn test_declined_payment_leaves_reservation_open() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness
        .gateway
        .push(PaymentOutcome::Decline("insufficient funds".to_string()));

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    match result {
        Err(ReservationError::PaymentFailed { reason }) => {
            assert_eq!(reason, "insufficient funds");
        }
        other => panic!("expected PaymentFailed, got {other:?}"),
    }
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Reserved
    );
    assert_eq!(
        harness.stored_ticket(ticket.id).await.status,
        TicketStatus::Locked
    );
    assert_eq!(harness.lock_holder(ticket.id).await, Some(user));

    // The caller may retry within the hold window.
    let confirmation = harness.coordinator.confirm(ticket.id, user, card()).await.unwrap();
    assert_eq!(confirmation.booking_id, reservation.booking_id);
}

#[tokio::test]
async fn test_gateway_error_is_payment_failed() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness.gateway.push(PaymentOutcome::Fail(GatewayError::Unavailable(
        "503 from processor".to_string(),
    )));

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(matches!(result, Err(ReservationError::PaymentFailed { .. })));
    assert!(result.unwrap_err().is_retryable());
    assert_eq!(
        harness.stored_ticket(ticket.id).await.status,
        TicketStatus::Locked
    );
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let harness = Harness::with_settings(ReservationSettings {
        payment_timeout: Duration::from_millis(50),
        ..ReservationSettings::default()
    });
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness
        .gateway
        .push(PaymentOutcome::Stall(Duration::from_secs(5)));

    let started = std::time::Instant::now();
    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(matches!(result, Err(ReservationError::PaymentFailed { .. })));
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Reserved
    );
}

#[tokio::test]
async fn test_commit_failure_after_charge_is_transaction_failed() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket.id, user).await.unwrap();
    harness.store.fail_next_commit();

    let result = harness.coordinator.confirm(ticket.id, user, card()).await;

    match result {
        Err(ReservationError::TransactionFailed {
            booking_id,
            payment_ref,
            ..
        }) => {
            assert_eq!(booking_id, reservation.booking_id);
            assert!(payment_ref.starts_with("pi_test_"));
        }
        other => panic!("expected TransactionFailed, got {other:?}"),
    }
    assert_eq!(harness.gateway.requests().len(), 1);
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Reserved
    );
    assert_eq!(
        harness.stored_ticket(ticket.id).await.status,
        TicketStatus::Locked
    );
    assert!(!harness
        .feed
        .changes()
        .iter()
        .any(|c| c.reason == ChangeReason::Confirmed));
}

#[tokio::test]
async fn test_booking_cancelled_during_payment_is_transaction_failed() {
    let harness = Harness::new();
    let ticket = harness.ticket().await;
    let ticket_id = ticket.id;
    let user = UserId::new();
    let reservation = harness.coordinator.reserve(ticket_id, user).await.unwrap();
    harness
        .gateway
        .push(PaymentOutcome::ApproveAfter(Duration::from_millis(200)));

    let coordinator = Arc::clone(&harness.coordinator);
    let confirm = tokio::spawn(async move { coordinator.confirm(ticket_id, user, card()).await });

    // The charge is in flight; the user cancels from another session.
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness
        .coordinator
        .cancel(reservation.booking_id, user)
        .await
        .unwrap();

    match confirm.await.unwrap() {
        Err(ReservationError::TransactionFailed { payment_ref, .. }) => {
            assert_eq!(payment_ref, "pi_test_0");
        }
        other => panic!("expected TransactionFailed, got {other:?}"),
    }
    assert_eq!(
        harness.stored_booking(reservation.booking_id).await.status,
        BookingStatus::Cancelled
    );
    assert_eq!(
        harness.stored_ticket(ticket_id).await.status,
        TicketStatus::Available
    );
}
