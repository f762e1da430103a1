mod common;

use common::{Harness, STUDENT, TEACHER, monday_ten, request, teacher};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tutorbook::application::checkout::CheckoutStart;
use tutorbook::domain::booking::{BookingIntent, BookingStatus, UserId};
use tutorbook::domain::ports::{BookingStore, PaymentStatus, VerifiedPayment};
use tutorbook::domain::principal::Principal;
use tutorbook::error::BookingError;
use tutorbook::infrastructure::in_memory::RecordingNotificationSink;

fn paid(reference: &str, intent: &BookingIntent) -> VerifiedPayment {
    VerifiedPayment {
        reference: reference.to_string(),
        status: PaymentStatus::Success,
        amount_minor: 500_000,
        currency: "NGN".to_string(),
        metadata: intent.to_metadata(),
    }
}

fn intent() -> BookingIntent {
    BookingIntent {
        student_id: UserId::new(STUDENT),
        teacher_id: UserId::new(TEACHER),
        subject_id: "math".into(),
        level: "SS2".into(),
        requested_time: monday_ten(),
        duration_minutes: 60,
    }
}

#[tokio::test]
async fn test_paid_checkout_creates_pending_booking() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let reference = h.pay(STUDENT, request(TEACHER, monday_ten(), 60)).await;

    let id = h.checkout().complete_booking(&reference).await.unwrap();

    let booking = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.calculated_price, dec!(5000));
    assert_eq!(booking.payment_reference.as_deref(), Some(reference.as_str()));
    assert_eq!(booking.student_id, UserId::new(STUDENT));
    assert_eq!(booking.requested_time, monday_ten());
    assert_eq!(booking.end_time_utc, None);

    let sent = h.notifications.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, UserId::new(TEACHER));
    assert_eq!(sent[0].link, format!("/bookings/{id}"));
}

#[tokio::test]
async fn test_completion_is_idempotent() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let reference = h.pay(STUDENT, request(TEACHER, monday_ten(), 60)).await;
    let checkout = h.checkout();

    let first = checkout.complete_booking(&reference).await.unwrap();
    let second = checkout
        .complete_booking(&format!("  {reference} "))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(h.store.all().await.unwrap().len(), 1);
    assert_eq!(h.notifications.sent().await.len(), 1);
}

#[tokio::test]
async fn test_concurrent_callbacks_create_one_booking() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let reference = h.pay(STUDENT, request(TEACHER, monday_ten(), 60)).await;
    let (a, b) = (h.checkout(), h.checkout());

    let (first, second) = tokio::join!(
        a.complete_booking(&reference),
        b.complete_booking(&reference)
    );

    assert_eq!(first.unwrap(), second.unwrap());
    assert_eq!(h.store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_price_comes_from_the_gateway() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let mut payment = paid("ref-cheap", &intent());
    payment.amount_minor = 123_456;
    h.gateway.record(payment).await;

    let id = h.checkout().complete_booking("ref-cheap").await.unwrap();
    let booking = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(booking.calculated_price, dec!(1234.56));
}

#[tokio::test]
async fn test_unsuccessful_payments_are_rejected() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let checkout = h.checkout();

    // Initialized but never settled.
    let start = checkout
        .initiate_payment(&Principal::student(STUDENT), request(TEACHER, monday_ten(), 60))
        .await
        .unwrap();
    let CheckoutStart::Redirect(init) = start else {
        panic!("expected a redirect");
    };
    assert!(matches!(
        checkout.complete_booking(&init.reference).await,
        Err(BookingError::PaymentVerificationError(_))
    ));

    let mut abandoned = paid("ref-abandoned", &intent());
    abandoned.status = PaymentStatus::Abandoned;
    h.gateway.record(abandoned).await;
    assert!(matches!(
        checkout.complete_booking("ref-abandoned").await,
        Err(BookingError::PaymentVerificationError(_))
    ));

    let mut dollars = paid("ref-usd", &intent());
    dollars.currency = "USD".into();
    h.gateway.record(dollars).await;
    assert!(matches!(
        checkout.complete_booking("ref-usd").await,
        Err(BookingError::PaymentVerificationError(_))
    ));

    assert!(matches!(
        checkout.complete_booking("ref-unknown").await,
        Err(BookingError::PaymentVerificationError(_))
    ));
    assert!(matches!(
        checkout.complete_booking("   ").await,
        Err(BookingError::ValidationError(_))
    ));
    assert!(h.store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_metadata() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let checkout = h.checkout();

    let mut missing = paid("ref-missing", &intent());
    missing.metadata.remove("teacher_id");
    h.gateway.record(missing).await;
    assert!(matches!(
        checkout.complete_booking("ref-missing").await,
        Err(BookingError::MalformedMetadataError(_))
    ));

    let mut garbled = paid("ref-garbled", &intent());
    garbled
        .metadata
        .insert("requested_time".into(), "next tuesday".into());
    h.gateway.record(garbled).await;
    assert!(matches!(
        checkout.complete_booking("ref-garbled").await,
        Err(BookingError::MalformedMetadataError(_))
    ));

    let mut marathon = paid("ref-marathon", &intent());
    marathon
        .metadata
        .insert("duration_minutes".into(), "600".into());
    h.gateway.record(marathon).await;
    assert!(matches!(
        checkout.complete_booking("ref-marathon").await,
        Err(BookingError::MalformedMetadataError(_))
    ));

    assert!(h.store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_gateway_outage_is_retried() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    h.gateway.record(paid("ref-1", &intent())).await;

    h.gateway.fail_next(2);
    let id = h.checkout().complete_booking("ref-1").await.unwrap();
    assert_eq!(h.gateway.verify_calls(), 3);
    assert!(h.store.get(id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_gateway_outage_gives_up_after_max_attempts() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    h.gateway.record(paid("ref-1", &intent())).await;

    h.gateway.fail_next(5);
    let result = h.checkout().complete_booking("ref-1").await;
    assert!(matches!(result, Err(BookingError::PaymentVerificationError(_))));
    assert_eq!(h.gateway.verify_calls(), 3);
    assert!(h.store.all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_notification_failure_keeps_the_booking() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let reference = h.pay(STUDENT, request(TEACHER, monday_ten(), 60)).await;

    let checkout = h.checkout_with(Arc::new(RecordingNotificationSink::failing()));
    let id = checkout.complete_booking(&reference).await.unwrap();
    assert_eq!(
        h.store.get(id).await.unwrap().unwrap().status,
        BookingStatus::Pending
    );
}

#[tokio::test]
async fn test_slot_taken_after_payment() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    // Both students pay before the teacher accepts anyone.
    let first = h.pay(STUDENT, request(TEACHER, monday_ten(), 60)).await;
    let second = h.pay("student-2", request(TEACHER, monday_ten(), 60)).await;

    let id = h.checkout().complete_booking(&first).await.unwrap();
    h.lifecycle()
        .accept(&Principal::teacher(TEACHER), id)
        .await
        .unwrap();

    assert!(matches!(
        h.checkout().complete_booking(&second).await,
        Err(BookingError::SchedulingConflictError(_))
    ));
    assert_eq!(h.store.all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_initiate_payment_checks_the_request() {
    let mut unapproved = teacher("teacher-pending", Some(dec!(5000)), None);
    unapproved.approval = tutorbook::domain::teacher::ApprovalStatus::Pending;
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None), unapproved]);
    let checkout = h.checkout();
    let student = Principal::student(STUDENT);

    assert!(matches!(
        checkout
            .initiate_payment(&Principal::teacher(TEACHER), request(TEACHER, monday_ten(), 60))
            .await,
        Err(BookingError::AuthorizationError(_))
    ));
    assert!(matches!(
        checkout
            .initiate_payment(&student, request("teacher-ghost", monday_ten(), 60))
            .await,
        Err(BookingError::NotFoundError { .. })
    ));
    assert!(matches!(
        checkout
            .initiate_payment(&student, request("teacher-pending", monday_ten(), 60))
            .await,
        Err(BookingError::ValidationError(_))
    ));
    assert!(matches!(
        checkout
            .initiate_payment(&student, request(TEACHER, monday_ten(), 240))
            .await,
        Err(BookingError::ValidationError(_))
    ));
    // 21:00 UTC is after the Lagos close.
    assert!(matches!(
        checkout
            .initiate_payment(&student, request(TEACHER, common::march(2, 21, 0), 60))
            .await,
        Err(BookingError::ValidationError(_))
    ));
    assert!(matches!(
        checkout
            .initiate_payment(&student, request(TEACHER, common::march(1, 7, 0), 60))
            .await,
        Err(BookingError::ValidationError(_))
    ));
}

#[tokio::test]
async fn test_initiate_payment_refuses_booked_slot() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    h.accepted_booking(STUDENT, request(TEACHER, monday_ten(), 60))
        .await;

    let result = h
        .checkout()
        .initiate_payment(
            &Principal::student("student-2"),
            request(TEACHER, common::march(2, 10, 30), 60),
        )
        .await;
    assert!(matches!(result, Err(BookingError::SchedulingConflictError(_))));
}

#[tokio::test]
async fn test_initiate_payment_carries_the_intent() {
    let h = Harness::new(vec![teacher(TEACHER, Some(dec!(5000)), None)]);
    let reference = h.pay(STUDENT, request(TEACHER, monday_ten(), 90)).await;

    let verified = {
        use tutorbook::domain::ports::PaymentGateway;
        h.gateway.verify(&reference).await.unwrap()
    };
    assert_eq!(verified.amount_minor, 750_000);
    assert_eq!(verified.currency, "NGN");
    let decoded = BookingIntent::from_metadata(&verified.metadata).unwrap();
    assert_eq!(decoded.duration_minutes, 90);
    assert_eq!(decoded.student_id, UserId::new(STUDENT));
}

#[tokio::test]
async fn test_free_session_books_without_payment() {
    let h = Harness::new(vec![teacher(TEACHER, None, None)]);

    let start = h
        .checkout()
        .initiate_payment(&Principal::student(STUDENT), request(TEACHER, monday_ten(), 60))
        .await
        .unwrap();
    let CheckoutStart::Booked(id) = start else {
        panic!("expected an immediate booking");
    };

    let booking = h.store.get(id).await.unwrap().unwrap();
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.calculated_price, Decimal::ZERO);
    assert_eq!(booking.payment_reference, None);
    assert_eq!(h.gateway.verify_calls(), 0);
}

#[tokio::test]
async fn test_unpriceable_rate_is_refused() {
    let h = Harness::new(vec![teacher(TEACHER, Some(Decimal::MAX), None)]);

    let result = h
        .checkout()
        .initiate_payment(&Principal::student(STUDENT), request(TEACHER, monday_ten(), 180))
        .await;
    assert!(matches!(result, Err(BookingError::ValidationError(_))));
    assert!(h.store.all().await.unwrap().is_empty());
}
