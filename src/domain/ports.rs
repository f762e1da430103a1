use super::booking::{Booking, BookingId, BookingStatus, Metadata, UserId};
use super::teacher::{TeacherProfile, TeacherQuery};
use super::window::TimeWindow;
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of inserting a booking keyed by its payment reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(BookingId),
    /// A booking with the same payment reference already exists.
    Duplicate(BookingId),
}

impl InsertOutcome {
    pub fn id(self) -> BookingId {
        match self {
            InsertOutcome::Created(id) | InsertOutcome::Duplicate(id) => id,
        }
    }
}

/// A compare-and-set write of a booking row.
///
/// The store applies `booking` only if the stored row still has status
/// `expected`. When `exclusive` is set, the write is also refused if any other
/// ACCEPTED booking of the same teacher overlaps that window. With
/// `first_review` the stored row must not carry a review yet. All checks and
/// the write happen in one transaction.
#[derive(Debug, Clone)]
pub struct ConditionalWrite {
    pub expected: BookingStatus,
    pub booking: Booking,
    pub exclusive: Option<TimeWindow>,
    pub first_review: bool,
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, booking: Booking) -> Result<InsertOutcome>;
    async fn get(&self, id: BookingId) -> Result<Option<Booking>>;
    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Booking>>;
    /// Fails with `StaleStateError`, `SchedulingConflictError` or, for a
    /// second review, `ValidationError`, without writing.
    async fn write(&self, write: ConditionalWrite) -> Result<Booking>;
    /// All ACCEPTED bookings of any of `teacher_ids` overlapping `window`, in one query.
    async fn accepted_overlapping(
        &self,
        teacher_ids: &[UserId],
        window: &TimeWindow,
    ) -> Result<Vec<Booking>>;
    async fn all(&self) -> Result<Vec<Booking>>;
}

#[async_trait]
pub trait TeacherDirectory: Send + Sync {
    /// Approved teachers matching the query's attributes.
    async fn find(&self, query: &TeacherQuery) -> Result<Vec<TeacherProfile>>;
    async fn get(&self, id: &UserId) -> Result<Option<TeacherProfile>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub callback_url: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaymentInit {
    pub reference: String,
    pub authorization_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
    Failed,
    Abandoned,
    Pending,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VerifiedPayment {
    pub reference: String,
    pub status: PaymentStatus,
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: Metadata,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentInit, GatewayError>;
    async fn verify(&self, reference: &str) -> std::result::Result<VerifiedPayment, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub message: String,
    pub link: String,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, notification: Notification) -> Result<()>;
}

/// Liveness signal for instant sessions.
#[async_trait]
pub trait PresenceSignal: Send + Sync {
    async fn online(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCredential {
    pub room_id: String,
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait VideoSessionIssuer: Send + Sync {
    async fn issue(
        &self,
        room_id: &str,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinCredential>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type BookingStoreBox = Arc<dyn BookingStore>;
pub type TeacherDirectoryBox = Arc<dyn TeacherDirectory>;
pub type PaymentGatewayBox = Arc<dyn PaymentGateway>;
pub type NotificationSinkBox = Arc<dyn NotificationSink>;
pub type PresenceSignalBox = Arc<dyn PresenceSignal>;
pub type VideoSessionIssuerBox = Arc<dyn VideoSessionIssuer>;
pub type ClockBox = Arc<dyn Clock>;
