use crate::application::{booking_link, notify_quietly};
use crate::config::{BookingConfig, EarlyCompletion};
use crate::domain::booking::{Booking, BookingId, BookingStatus, Review, UserId};
use crate::domain::ports::{BookingStoreBox, ClockBox, ConditionalWrite, NotificationSinkBox};
use crate::domain::principal::{Principal, Role};
use crate::domain::window::TimeWindow;
use crate::error::{BookingError, Result};
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// Who may perform a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Teacher,
    Student,
    Either,
}

/// Drives a booking from PENDING to a terminal state.
///
/// Every transition re-reads the booking, checks the actor and the current
/// status, then writes conditionally on that status so two racing callers
/// cannot both succeed.
pub struct BookingLifecycle {
    config: Arc<BookingConfig>,
    store: BookingStoreBox,
    notifications: NotificationSinkBox,
    clock: ClockBox,
}

impl BookingLifecycle {
    pub fn new(
        config: Arc<BookingConfig>,
        store: BookingStoreBox,
        notifications: NotificationSinkBox,
        clock: ClockBox,
    ) -> Self {
        Self {
            config,
            store,
            notifications,
            clock,
        }
    }

    /// A booking as seen by one of its participants.
    pub async fn booking(&self, principal: &Principal, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Either)?;
        Ok(booking)
    }

    /// PENDING → ACCEPTED. Fixes the end time, allocates a video room and
    /// refuses if the teacher already holds an overlapping ACCEPTED session.
    pub async fn accept(&self, principal: &Principal, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Teacher)?;
        expect_status(&booking, BookingStatus::Pending)?;

        let now = self.clock.now();
        if now >= booking.requested_time {
            return Err(BookingError::ValidationError(
                "the session start has already passed".to_string(),
            ));
        }

        let window = booking.window();
        let mut next = booking;
        next.status = BookingStatus::Accepted;
        next.end_time_utc = Some(window.end);
        next.video_room_id = Some(format!("room-{}", Uuid::new_v4().simple()));
        next.updated_at = now;

        let saved = self
            .commit(BookingStatus::Pending, next, Some(window))
            .await?;
        self.tell(
            &saved,
            &saved.student_id,
            "Your session request was accepted",
        )
        .await;
        Ok(saved)
    }

    /// PENDING → DECLINED.
    pub async fn decline(&self, principal: &Principal, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Teacher)?;
        expect_status(&booking, BookingStatus::Pending)?;

        let mut next = booking;
        next.status = BookingStatus::Declined;
        next.updated_at = self.clock.now();

        let saved = self.commit(BookingStatus::Pending, next, None).await?;
        self.tell(
            &saved,
            &saved.student_id,
            "Your session request was declined",
        )
        .await;
        Ok(saved)
    }

    /// PENDING, ACCEPTED or RESCHEDULE_REQUESTED → CANCELLED. An ACCEPTED
    /// session can no longer be cancelled once the cutoff before its start
    /// is reached.
    pub async fn cancel(&self, principal: &Principal, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Either)?;
        let current = booking.status;
        if !current.can_transition_to(BookingStatus::Cancelled) {
            return Err(stale(&booking, "PENDING, ACCEPTED or RESCHEDULE_REQUESTED"));
        }

        let now = self.clock.now();
        let cutoff =
            booking.requested_time - Duration::minutes(self.config.cancellation_cutoff_minutes);
        if current == BookingStatus::Accepted && now >= cutoff {
            return Err(BookingError::ValidationError(format!(
                "accepted sessions cannot be cancelled within {} minutes of the start",
                self.config.cancellation_cutoff_minutes
            )));
        }

        let mut next = booking;
        next.status = BookingStatus::Cancelled;
        next.end_time_utc = None;
        next.updated_at = now;

        let saved = self.commit(current, next, None).await?;
        self.tell(
            &saved,
            saved.counterpart(&principal.user_id),
            "A session was cancelled",
        )
        .await;
        Ok(saved)
    }

    /// ACCEPTED → RESCHEDULE_REQUESTED. Only the student asks; the only way
    /// forward from there is a cancellation and a fresh booking.
    pub async fn request_reschedule(
        &self,
        principal: &Principal,
        id: BookingId,
    ) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Student)?;
        expect_status(&booking, BookingStatus::Accepted)?;

        let mut next = booking;
        next.status = BookingStatus::RescheduleRequested;
        next.end_time_utc = None;
        next.updated_at = self.clock.now();

        let saved = self.commit(BookingStatus::Accepted, next, None).await?;
        self.tell(
            &saved,
            &saved.teacher_id,
            "Your student asked to reschedule a session",
        )
        .await;
        Ok(saved)
    }

    /// ACCEPTED → COMPLETED. Completing an already completed booking is a
    /// no-op that returns it unchanged.
    pub async fn complete(&self, principal: &Principal, id: BookingId) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Either)?;
        if booking.status == BookingStatus::Completed {
            return Ok(booking);
        }
        expect_status(&booking, BookingStatus::Accepted)?;

        let now = self.clock.now();
        let scheduled_end = booking.end_time_utc.unwrap_or_else(|| booking.scheduled_end());
        if now < scheduled_end {
            match self.config.early_completion {
                EarlyCompletion::Reject => {
                    return Err(BookingError::ValidationError(
                        "the session has not reached its scheduled end".to_string(),
                    ));
                }
                EarlyCompletion::Warn => {
                    tracing::warn!(booking_id = %booking.id, %scheduled_end, "session completed before its scheduled end");
                }
            }
        }

        let mut next = booking;
        next.status = BookingStatus::Completed;
        next.end_time_utc = Some(scheduled_end);
        next.updated_at = now;

        let saved = self.commit(BookingStatus::Accepted, next, None).await?;
        self.tell(
            &saved,
            saved.counterpart(&principal.user_id),
            "A session was marked as completed",
        )
        .await;
        Ok(saved)
    }

    /// Attaches the student's review to a COMPLETED booking, once.
    pub async fn submit_review(
        &self,
        principal: &Principal,
        id: BookingId,
        rating: u8,
        comment: Option<String>,
    ) -> Result<Booking> {
        let booking = self.load(id).await?;
        authorize(principal, &booking, Party::Student)?;
        expect_status(&booking, BookingStatus::Completed)?;
        if !(1..=5).contains(&rating) {
            return Err(BookingError::ValidationError(
                "rating must be between 1 and 5".to_string(),
            ));
        }
        if booking.review.is_some() {
            return Err(BookingError::ValidationError(
                "this session has already been reviewed".to_string(),
            ));
        }

        let now = self.clock.now();
        let mut next = booking;
        next.review = Some(Review {
            rating,
            comment: comment.filter(|c| !c.trim().is_empty()),
            created_at: now,
        });
        next.updated_at = now;

        // The stored row is re-checked for a review under the store's lock.
        let saved = self
            .apply(ConditionalWrite {
                expected: BookingStatus::Completed,
                booking: next,
                exclusive: None,
                first_review: true,
            })
            .await?;
        self.tell(&saved, &saved.teacher_id, "You received a new review")
            .await;
        Ok(saved)
    }

    async fn load(&self, id: BookingId) -> Result<Booking> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", id))
    }

    async fn commit(
        &self,
        expected: BookingStatus,
        booking: Booking,
        exclusive: Option<TimeWindow>,
    ) -> Result<Booking> {
        self.apply(ConditionalWrite {
            expected,
            booking,
            exclusive,
            first_review: false,
        })
        .await
    }

    async fn apply(&self, write: ConditionalWrite) -> Result<Booking> {
        let id = write.booking.id;
        let (from, to) = (write.expected, write.booking.status);
        let saved = self.store.write(write).await?;
        tracing::info!(booking_id = %id, %from, %to, "booking transition");
        Ok(saved)
    }

    async fn tell(&self, booking: &Booking, user_id: &UserId, message: &str) {
        notify_quietly(
            &self.notifications,
            user_id,
            message.to_string(),
            booking_link(booking.id),
        )
        .await;
    }
}

fn authorize(principal: &Principal, booking: &Booking, party: Party) -> Result<()> {
    let is_teacher = principal.role == Role::Teacher && principal.user_id == booking.teacher_id;
    let is_student = principal.role == Role::Student && principal.user_id == booking.student_id;
    if !is_teacher && !is_student {
        return Err(BookingError::AuthorizationError(
            "not a participant of this booking".to_string(),
        ));
    }
    match party {
        Party::Teacher if !is_teacher => Err(BookingError::AuthorizationError(
            "only the teacher can do this".to_string(),
        )),
        Party::Student if !is_student => Err(BookingError::AuthorizationError(
            "only the student can do this".to_string(),
        )),
        _ => Ok(()),
    }
}

fn expect_status(booking: &Booking, expected: BookingStatus) -> Result<()> {
    if booking.status == expected {
        Ok(())
    } else {
        Err(stale(booking, expected.as_str()))
    }
}

fn stale(booking: &Booking, expected: &str) -> BookingError {
    BookingError::StaleStateError {
        id: booking.id.to_string(),
        actual: booking.status,
        expected: expected.to_string(),
    }
}
