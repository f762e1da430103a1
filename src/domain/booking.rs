use crate::domain::window::TimeWindow;
use crate::error::{BookingError, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookingId(pub Uuid);

impl BookingId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Opaque reference to a student or teacher account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Declined,
    Cancelled,
    RescheduleRequested,
    Completed,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Declined => "DECLINED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::RescheduleRequested => "RESCHEDULE_REQUESTED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Declined | BookingStatus::Cancelled | BookingStatus::Completed
        )
    }

    /// The transition table. Anything not listed here is impossible.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::{Accepted, Cancelled, Completed, Declined, Pending, RescheduleRequested};
        matches!(
            (self, next),
            (Pending, Accepted | Declined | Cancelled)
                | (Accepted, Cancelled | RescheduleRequested | Completed)
                | (RescheduleRequested, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    /// Idempotency key for creation. Absent only for free bookings.
    pub payment_reference: Option<String>,
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub subject_id: String,
    pub level: String,
    pub requested_time: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Set while the booking is ACCEPTED or COMPLETED.
    pub end_time_utc: Option<DateTime<Utc>>,
    pub calculated_price: Decimal,
    pub status: BookingStatus,
    pub video_room_id: Option<String>,
    pub review: Option<Review>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// A freshly paid-for booking awaiting the teacher's answer.
    pub fn pending(
        intent: BookingIntent,
        payment_reference: Option<String>,
        calculated_price: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: BookingId::generate(),
            payment_reference,
            student_id: intent.student_id,
            teacher_id: intent.teacher_id,
            subject_id: intent.subject_id,
            level: intent.level,
            requested_time: intent.requested_time,
            duration_minutes: intent.duration_minutes,
            end_time_utc: None,
            calculated_price,
            status: BookingStatus::Pending,
            video_room_id: None,
            review: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The session window, whether or not `end_time_utc` is set yet.
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(self.requested_time, self.duration_minutes)
    }

    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.requested_time + Duration::minutes(i64::from(self.duration_minutes))
    }

    pub fn is_participant(&self, user: &UserId) -> bool {
        &self.student_id == user || &self.teacher_id == user
    }

    /// The participant who did not perform the action.
    pub fn counterpart(&self, actor: &UserId) -> &UserId {
        if &self.student_id == actor {
            &self.teacher_id
        } else {
            &self.student_id
        }
    }
}

/// Gateway metadata keys carrying the booking intent.
pub mod metadata_keys {
    pub const STUDENT_ID: &str = "student_id";
    pub const TEACHER_ID: &str = "teacher_id";
    pub const SUBJECT_ID: &str = "subject_id";
    pub const LEVEL: &str = "level";
    pub const REQUESTED_TIME: &str = "requested_time";
    pub const DURATION_MINUTES: &str = "duration_minutes";
}

pub type Metadata = BTreeMap<String, String>;

/// What the student asked for, as carried through the payment gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingIntent {
    pub student_id: UserId,
    pub teacher_id: UserId,
    pub subject_id: String,
    pub level: String,
    pub requested_time: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl BookingIntent {
    pub fn window(&self) -> TimeWindow {
        TimeWindow::starting_at(self.requested_time, self.duration_minutes)
    }

    pub fn to_metadata(&self) -> Metadata {
        use metadata_keys::*;
        let mut metadata = Metadata::new();
        metadata.insert(STUDENT_ID.into(), self.student_id.to_string());
        metadata.insert(TEACHER_ID.into(), self.teacher_id.to_string());
        metadata.insert(SUBJECT_ID.into(), self.subject_id.clone());
        metadata.insert(LEVEL.into(), self.level.clone());
        metadata.insert(REQUESTED_TIME.into(), self.requested_time.to_rfc3339());
        metadata.insert(DURATION_MINUTES.into(), self.duration_minutes.to_string());
        metadata
    }

    pub fn from_metadata(metadata: &Metadata) -> Result<Self> {
        use metadata_keys::*;
        let requested_time = DateTime::parse_from_rfc3339(required(metadata, REQUESTED_TIME)?)
            .map_err(|e| BookingError::MalformedMetadataError(format!("{REQUESTED_TIME}: {e}")))?
            .with_timezone(&Utc);
        let duration_minutes = required(metadata, DURATION_MINUTES)?
            .parse::<u32>()
            .map_err(|e| {
                BookingError::MalformedMetadataError(format!("{DURATION_MINUTES}: {e}"))
            })?;

        Ok(Self {
            student_id: UserId::new(required(metadata, STUDENT_ID)?),
            teacher_id: UserId::new(required(metadata, TEACHER_ID)?),
            subject_id: required(metadata, SUBJECT_ID)?.to_string(),
            level: required(metadata, LEVEL)?.to_string(),
            requested_time,
            duration_minutes,
        })
    }
}

fn required<'a>(metadata: &'a Metadata, key: &str) -> Result<&'a str> {
    metadata
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| BookingError::MalformedMetadataError(format!("missing {key}")))
}
