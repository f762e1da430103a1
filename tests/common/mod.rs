#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tutorbook::application::checkout::{BookingRequest, CheckoutService, CheckoutStart};
use tutorbook::application::conflicts::ConflictDetector;
use tutorbook::application::lifecycle::BookingLifecycle;
use tutorbook::application::matching::MatchingService;
use tutorbook::application::video::VideoAccess;
use tutorbook::config::{BookingConfig, RetryPolicy};
use tutorbook::domain::booking::{BookingId, UserId};
use tutorbook::domain::principal::Principal;
use tutorbook::domain::schedule::{DayKey, TimeSlot, WeeklySchedule};
use tutorbook::domain::teacher::{ApprovalStatus, TaughtSubject, TeacherProfile};
use tutorbook::infrastructure::clock::ManualClock;
use tutorbook::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryPaymentGateway, InMemoryTeacherDirectory, LocalVideoIssuer,
    RecordingNotificationSink,
};

pub const STUDENT: &str = "student-1";
pub const TEACHER: &str = "teacher-ada";

/// A day of March 2026 in UTC. The 1st is a Sunday, the 2nd a Monday.
pub fn march(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
}

/// Sunday morning, the day before most test sessions.
pub fn start_of_tests() -> DateTime<Utc> {
    march(1, 8, 0)
}

/// Monday 10:00 UTC, 11:00 in Lagos.
pub fn monday_ten() -> DateTime<Utc> {
    march(2, 10, 0)
}

/// Approved maths teacher in Lagos (UTC+1), free 08:00-20:00 local every day.
pub fn teacher(
    id: &str,
    hourly_rate: Option<Decimal>,
    average_rating: Option<f64>,
) -> TeacherProfile {
    let mut schedule = WeeklySchedule::new();
    for day in DayKey::ALL {
        schedule.add_slot(day, TimeSlot::parse("08:00", "20:00").unwrap());
    }
    TeacherProfile {
        id: UserId::new(id),
        display_name: format!("Teacher {id}"),
        approval: ApprovalStatus::Approved,
        subjects: vec![TaughtSubject {
            subject_id: "math".into(),
            name: "Mathematics".into(),
            level: "SS2".into(),
        }],
        languages: vec!["English".into(), "Yoruba".into()],
        specializations: vec!["WAEC prep".into()],
        hourly_rate,
        timezone: "Africa/Lagos".into(),
        schedule,
        average_rating,
        review_count: average_rating.map_or(0, |_| 12),
    }
}

pub fn request(teacher_id: &str, at: DateTime<Utc>, duration_minutes: u32) -> BookingRequest {
    BookingRequest {
        teacher_id: UserId::new(teacher_id),
        subject_id: "math".into(),
        level: "SS2".into(),
        requested_time: at,
        duration_minutes,
    }
}

/// Services wired to in-memory adapters sharing one manual clock.
pub struct Harness {
    pub config: Arc<BookingConfig>,
    pub clock: ManualClock,
    pub store: InMemoryBookingStore,
    pub teachers: InMemoryTeacherDirectory,
    pub gateway: InMemoryPaymentGateway,
    pub notifications: RecordingNotificationSink,
}

impl Harness {
    pub fn new(teachers: Vec<TeacherProfile>) -> Self {
        Self::with_config(test_config(), teachers)
    }

    pub fn with_config(config: BookingConfig, teachers: Vec<TeacherProfile>) -> Self {
        Self {
            config: Arc::new(config),
            clock: ManualClock::new(start_of_tests()),
            store: InMemoryBookingStore::new(),
            teachers: InMemoryTeacherDirectory::with_teachers(teachers),
            gateway: InMemoryPaymentGateway::new(),
            notifications: RecordingNotificationSink::new(),
        }
    }

    pub fn checkout(&self) -> CheckoutService {
        self.checkout_with(Arc::new(self.notifications.clone()))
    }

    pub fn checkout_with(&self, notifications: Arc<RecordingNotificationSink>) -> CheckoutService {
        CheckoutService::new(
            self.config.clone(),
            Arc::new(self.gateway.clone()),
            Arc::new(self.store.clone()),
            Arc::new(self.teachers.clone()),
            notifications,
            Arc::new(self.clock.clone()),
        )
    }

    pub fn lifecycle(&self) -> BookingLifecycle {
        BookingLifecycle::new(
            self.config.clone(),
            Arc::new(self.store.clone()),
            Arc::new(self.notifications.clone()),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn matching(&self) -> MatchingService {
        MatchingService::new(
            self.config.clone(),
            Arc::new(self.teachers.clone()),
            ConflictDetector::new(Arc::new(self.store.clone())),
            Arc::new(self.clock.clone()),
        )
    }

    pub fn video(&self) -> VideoAccess {
        VideoAccess::new(
            self.config.clone(),
            Arc::new(self.store.clone()),
            Arc::new(LocalVideoIssuer),
            Arc::new(self.clock.clone()),
        )
    }

    /// Starts checkout and settles the payment; returns the gateway reference.
    pub async fn pay(&self, student: &str, request: BookingRequest) -> String {
        let start = self
            .checkout()
            .initiate_payment(&Principal::student(student), request)
            .await
            .unwrap();
        let CheckoutStart::Redirect(init) = start else {
            panic!("expected a gateway redirect");
        };
        assert!(self.gateway.settle(&init.reference).await);
        init.reference
    }

    /// A PENDING booking paid for by `student`.
    pub async fn pending_booking(&self, student: &str, request: BookingRequest) -> BookingId {
        let reference = self.pay(student, request).await;
        self.checkout().complete_booking(&reference).await.unwrap()
    }

    /// An ACCEPTED booking between `student` and the request's teacher.
    pub async fn accepted_booking(&self, student: &str, request: BookingRequest) -> BookingId {
        let teacher = request.teacher_id.clone();
        let id = self.pending_booking(student, request).await;
        self.lifecycle()
            .accept(&Principal::teacher(teacher.as_str()), id)
            .await
            .unwrap();
        id
    }
}

/// Defaults with a fast retry so gateway outage tests stay quick.
pub fn test_config() -> BookingConfig {
    BookingConfig {
        gateway_retry: RetryPolicy {
            max_attempts: 3,
            interval_ms: 1,
        },
        ..BookingConfig::default()
    }
}
