use crate::application::conflicts::ConflictDetector;
use crate::application::retry::with_backoff;
use crate::application::{booking_link, notify_quietly};
use crate::config::BookingConfig;
use crate::domain::booking::{Booking, BookingId, BookingIntent, UserId};
use crate::domain::ports::{
    BookingStoreBox, ClockBox, InsertOutcome, NotificationSinkBox, PaymentGatewayBox, PaymentInit,
    PaymentRequest, PaymentStatus, TeacherDirectoryBox,
};
use crate::domain::principal::{Principal, Role};
use crate::error::{BookingError, GatewayError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal::prelude::ToPrimitive;
use std::sync::Arc;

/// A student's request to book a slot with a teacher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub teacher_id: UserId,
    pub subject_id: String,
    pub level: String,
    pub requested_time: DateTime<Utc>,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckoutStart {
    /// Send the student to the gateway; the booking is created on callback.
    Redirect(PaymentInit),
    /// Nothing to pay, the booking already exists.
    Booked(BookingId),
}

/// Turns payments into bookings.
///
/// `initiate_payment` checks the requested slot and opens a gateway
/// transaction carrying the booking intent as metadata. `complete_booking`
/// runs on the gateway callback: it verifies the transaction, decodes the
/// intent and creates the PENDING booking, at most once per reference.
pub struct CheckoutService {
    config: Arc<BookingConfig>,
    gateway: PaymentGatewayBox,
    store: BookingStoreBox,
    teachers: TeacherDirectoryBox,
    conflicts: ConflictDetector,
    notifications: NotificationSinkBox,
    clock: ClockBox,
}

impl CheckoutService {
    pub fn new(
        config: Arc<BookingConfig>,
        gateway: PaymentGatewayBox,
        store: BookingStoreBox,
        teachers: TeacherDirectoryBox,
        notifications: NotificationSinkBox,
        clock: ClockBox,
    ) -> Self {
        Self {
            conflicts: ConflictDetector::new(store.clone()),
            config,
            gateway,
            store,
            teachers,
            notifications,
            clock,
        }
    }

    pub async fn initiate_payment(
        &self,
        principal: &Principal,
        request: BookingRequest,
    ) -> Result<CheckoutStart> {
        if principal.role != Role::Student {
            return Err(BookingError::AuthorizationError(
                "only students can book sessions".to_string(),
            ));
        }
        let now = self.clock.now();
        if !self.config.duration_allowed(request.duration_minutes) {
            return Err(BookingError::ValidationError(format!(
                "duration must be between {} and {} minutes",
                self.config.min_duration_minutes, self.config.max_duration_minutes
            )));
        }
        if request.requested_time <= now {
            return Err(BookingError::ValidationError(
                "requested time must be in the future".to_string(),
            ));
        }

        let teacher = self
            .teachers
            .get(&request.teacher_id)
            .await?
            .ok_or_else(|| BookingError::not_found("teacher", &request.teacher_id))?;
        if !teacher.is_approved() || !teacher.teaches(&request.subject_id, &request.level) {
            return Err(BookingError::ValidationError(
                "teacher does not offer this subject and level".to_string(),
            ));
        }
        let available = teacher.tz().is_some_and(|tz| {
            teacher
                .schedule
                .is_available(request.requested_time, request.duration_minutes, tz)
        });
        if !available {
            return Err(BookingError::ValidationError(
                "teacher is not available at the requested time".to_string(),
            ));
        }

        let intent = BookingIntent {
            student_id: principal.user_id.clone(),
            teacher_id: teacher.id.clone(),
            subject_id: request.subject_id,
            level: request.level,
            requested_time: request.requested_time,
            duration_minutes: request.duration_minutes,
        };
        if self
            .conflicts
            .is_busy(&intent.teacher_id, &intent.window())
            .await?
        {
            return Err(BookingError::SchedulingConflictError(
                "teacher is already booked at the requested time".to_string(),
            ));
        }

        let price = teacher
            .session_price(intent.duration_minutes)?
            .unwrap_or(Decimal::ZERO);
        if price <= Decimal::ZERO {
            return self.book_free(intent, now).await.map(CheckoutStart::Booked);
        }

        let request = PaymentRequest {
            amount_minor: to_minor_units(price)?,
            currency: self.config.currency.clone(),
            callback_url: self.config.callback_url.clone(),
            metadata: intent.to_metadata(),
        };
        let init = self
            .gateway
            .initialize(request)
            .await
            .map_err(|e| BookingError::InternalError(Box::new(e)))?;
        tracing::info!(reference = %init.reference, teacher_id = %intent.teacher_id, %price, "payment initialized");
        Ok(CheckoutStart::Redirect(init))
    }

    /// Idempotent: a reference that already produced a booking returns that
    /// booking's id.
    pub async fn complete_booking(&self, reference: &str) -> Result<BookingId> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BookingError::ValidationError(
                "payment reference is required".to_string(),
            ));
        }

        let verified = with_backoff(
            &self.config.gateway_retry,
            || self.gateway.verify(reference),
            GatewayError::is_retryable,
        )
        .await
        .map_err(|e| BookingError::PaymentVerificationError(e.to_string()))?;
        if verified.status != PaymentStatus::Success {
            return Err(BookingError::PaymentVerificationError(format!(
                "transaction {reference} is {:?}",
                verified.status
            )));
        }
        if verified.reference != reference {
            return Err(BookingError::PaymentVerificationError(format!(
                "gateway answered for {} instead of {reference}",
                verified.reference
            )));
        }
        if verified.amount_minor <= 0 || verified.currency != self.config.currency {
            return Err(BookingError::PaymentVerificationError(format!(
                "unexpected amount {} {}",
                verified.amount_minor, verified.currency
            )));
        }

        let intent = BookingIntent::from_metadata(&verified.metadata)?;
        if !self.config.duration_allowed(intent.duration_minutes) {
            return Err(BookingError::MalformedMetadataError(format!(
                "duration {} out of range",
                intent.duration_minutes
            )));
        }

        if let Some(existing) = self.store.find_by_payment_reference(reference).await? {
            tracing::info!(%reference, booking_id = %existing.id, "payment already turned into a booking");
            return Ok(existing.id);
        }

        if self
            .conflicts
            .is_busy(&intent.teacher_id, &intent.window())
            .await?
        {
            tracing::error!(%reference, teacher_id = %intent.teacher_id, "paid slot no longer free, refund required");
            return Err(BookingError::SchedulingConflictError(
                "the teacher is no longer free at the paid time".to_string(),
            ));
        }

        // The verified amount is the only trusted price.
        let price = Decimal::new(verified.amount_minor, 2);
        let booking = Booking::pending(
            intent,
            Some(reference.to_string()),
            price,
            self.clock.now(),
        );
        let teacher_id = booking.teacher_id.clone();

        match self.store.insert(booking).await? {
            InsertOutcome::Created(id) => {
                tracing::info!(booking_id = %id, %reference, %price, "booking created");
                notify_quietly(
                    &self.notifications,
                    &teacher_id,
                    "You have a new session request".to_string(),
                    booking_link(id),
                )
                .await;
                Ok(id)
            }
            InsertOutcome::Duplicate(id) => {
                tracing::info!(booking_id = %id, %reference, "concurrent callback already created the booking");
                Ok(id)
            }
        }
    }

    async fn book_free(&self, intent: BookingIntent, now: DateTime<Utc>) -> Result<BookingId> {
        let booking = Booking::pending(intent, None, Decimal::ZERO, now);
        let teacher_id = booking.teacher_id.clone();
        let id = self.store.insert(booking).await?.id();
        tracing::info!(booking_id = %id, "free booking created");
        notify_quietly(
            &self.notifications,
            &teacher_id,
            "You have a new session request".to_string(),
            booking_link(id),
        )
        .await;
        Ok(id)
    }
}

fn to_minor_units(price: Decimal) -> Result<i64> {
    price
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|minor| {
            minor
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
        })
        .ok_or_else(|| BookingError::ValidationError(format!("price {price} is out of range")))
}
