use crate::domain::booking::{Booking, BookingId, BookingStatus, UserId};
use crate::domain::ports::{
    BookingStore, ConditionalWrite, InsertOutcome, JoinCredential, Notification, NotificationSink,
    PaymentGateway, PaymentInit, PaymentRequest, PaymentStatus, PresenceSignal, TeacherDirectory,
    VerifiedPayment, VideoSessionIssuer,
};
use crate::domain::teacher::{TeacherProfile, TeacherQuery};
use crate::domain::window::TimeWindow;
use crate::error::{BookingError, GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct BookingTable {
    rows: HashMap<BookingId, Booking>,
    by_reference: HashMap<String, BookingId>,
}

/// A thread-safe in-memory booking store.
///
/// All writes take the table's write lock, so the status check, the overlap
/// check and the write of a [`ConditionalWrite`] are one atomic step.
#[derive(Default, Clone)]
pub struct InMemoryBookingStore {
    table: Arc<RwLock<BookingTable>>,
}

impl InMemoryBookingStore {
    /// Creates a new, empty in-memory booking store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: Booking) -> Result<InsertOutcome> {
        let mut table = self.table.write().await;
        if let Some(existing) = booking
            .payment_reference
            .as_ref()
            .and_then(|reference| table.by_reference.get(reference))
        {
            return Ok(InsertOutcome::Duplicate(*existing));
        }
        if table.rows.contains_key(&booking.id) {
            return Err(BookingError::InternalError(
                format!("booking id {} already in use", booking.id).into(),
            ));
        }
        let id = booking.id;
        if let Some(reference) = &booking.payment_reference {
            table.by_reference.insert(reference.clone(), id);
        }
        table.rows.insert(id, booking);
        Ok(InsertOutcome::Created(id))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).cloned())
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Booking>> {
        let table = self.table.read().await;
        Ok(table
            .by_reference
            .get(reference)
            .and_then(|id| table.rows.get(id))
            .cloned())
    }

    async fn write(&self, write: ConditionalWrite) -> Result<Booking> {
        let mut table = self.table.write().await;
        let id = write.booking.id;
        let current = table
            .rows
            .get(&id)
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        if current.status != write.expected {
            return Err(BookingError::StaleStateError {
                id: id.to_string(),
                actual: current.status,
                expected: write.expected.to_string(),
            });
        }
        if write.first_review && current.review.is_some() {
            return Err(BookingError::ValidationError(
                "this session has already been reviewed".to_string(),
            ));
        }
        if let Some(window) = &write.exclusive {
            let teacher_id = &write.booking.teacher_id;
            let clash = table.rows.values().find(|other| {
                other.id != id
                    && &other.teacher_id == teacher_id
                    && other.status == BookingStatus::Accepted
                    && other.window().overlaps(window)
            });
            if let Some(other) = clash {
                return Err(BookingError::SchedulingConflictError(format!(
                    "teacher already has accepted booking {} at that time",
                    other.id
                )));
            }
        }
        table.rows.insert(id, write.booking.clone());
        Ok(write.booking)
    }

    async fn accepted_overlapping(
        &self,
        teacher_ids: &[UserId],
        window: &TimeWindow,
    ) -> Result<Vec<Booking>> {
        let wanted: HashSet<&UserId> = teacher_ids.iter().collect();
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|b| {
                b.status == BookingStatus::Accepted
                    && wanted.contains(&b.teacher_id)
                    && b.window().overlaps(window)
            })
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Booking>> {
        let table = self.table.read().await;
        let mut bookings: Vec<Booking> = table.rows.values().cloned().collect();
        bookings.sort_by(|a, b| {
            a.requested_time
                .cmp(&b.requested_time)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(bookings)
    }
}

/// Teacher profiles held in memory, iterated in id order.
#[derive(Default, Clone)]
pub struct InMemoryTeacherDirectory {
    teachers: Arc<RwLock<BTreeMap<UserId, TeacherProfile>>>,
}

impl InMemoryTeacherDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_teachers(teachers: impl IntoIterator<Item = TeacherProfile>) -> Self {
        let teachers = teachers.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            teachers: Arc::new(RwLock::new(teachers)),
        }
    }

    /// Loads a JSON array of teacher profiles.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let teachers: Vec<TeacherProfile> = serde_json::from_reader(reader)?;
        Ok(Self::with_teachers(teachers))
    }

    pub async fn upsert(&self, teacher: TeacherProfile) {
        self.teachers
            .write()
            .await
            .insert(teacher.id.clone(), teacher);
    }
}

#[async_trait]
impl TeacherDirectory for InMemoryTeacherDirectory {
    async fn find(&self, query: &TeacherQuery) -> Result<Vec<TeacherProfile>> {
        let teachers = self.teachers.read().await;
        Ok(teachers
            .values()
            .filter(|t| t.matches(query))
            .cloned()
            .collect())
    }

    async fn get(&self, id: &UserId) -> Result<Option<TeacherProfile>> {
        let teachers = self.teachers.read().await;
        Ok(teachers.get(id).cloned())
    }
}

/// A gateway stand-in keeping its transactions in memory.
///
/// `initialize` opens a pending transaction; [`settle`](Self::settle) plays the
/// part of the student paying. Ledgers can also be preloaded from JSON.
#[derive(Default, Clone)]
pub struct InMemoryPaymentGateway {
    ledger: Arc<RwLock<HashMap<String, VerifiedPayment>>>,
    outages: Arc<AtomicU32>,
    verify_calls: Arc<AtomicU32>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a JSON array of already verified transactions.
    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self> {
        let payments: Vec<VerifiedPayment> = serde_json::from_reader(reader)?;
        let ledger = payments
            .into_iter()
            .map(|p| (p.reference.clone(), p))
            .collect();
        Ok(Self {
            ledger: Arc::new(RwLock::new(ledger)),
            ..Self::default()
        })
    }

    pub async fn record(&self, payment: VerifiedPayment) {
        self.ledger
            .write()
            .await
            .insert(payment.reference.clone(), payment);
    }

    /// Marks a transaction as paid. Returns `false` for unknown references.
    pub async fn settle(&self, reference: &str) -> bool {
        let mut ledger = self.ledger.write().await;
        match ledger.get_mut(reference) {
            Some(payment) => {
                payment.status = PaymentStatus::Success;
                true
            }
            None => false,
        }
    }

    /// The next `count` verify calls fail as if the gateway were unreachable.
    pub fn fail_next(&self, count: u32) {
        self.outages.store(count, Ordering::SeqCst);
    }

    pub fn verify_calls(&self) -> u32 {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn initialize(
        &self,
        request: PaymentRequest,
    ) -> std::result::Result<PaymentInit, GatewayError> {
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected("amount must be positive".into()));
        }
        let reference = format!("ref_{}", Uuid::new_v4().simple());
        let payment = VerifiedPayment {
            reference: reference.clone(),
            status: PaymentStatus::Pending,
            amount_minor: request.amount_minor,
            currency: request.currency,
            metadata: request.metadata,
        };
        self.ledger.write().await.insert(reference.clone(), payment);
        Ok(PaymentInit {
            authorization_url: format!(
                "https://checkout.invalid/pay/{reference}?callback={}",
                request.callback_url
            ),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> std::result::Result<VerifiedPayment, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let outage = self
            .outages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if outage {
            return Err(GatewayError::Unavailable("connection reset".into()));
        }
        self.ledger
            .read()
            .await
            .get(reference)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownReference(reference.to_string()))
    }
}

/// Keeps every delivered notification and logs it.
#[derive(Default, Clone)]
pub struct RecordingNotificationSink {
    sent: Arc<RwLock<Vec<Notification>>>,
    failing: bool,
}

impl RecordingNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose every delivery fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingNotificationSink {
    async fn notify(&self, notification: Notification) -> Result<()> {
        if self.failing {
            return Err(BookingError::InternalError(
                "notification channel unavailable".into(),
            ));
        }
        tracing::info!(user_id = %notification.user_id, link = %notification.link, "{}", notification.message);
        self.sent.write().await.push(notification);
        Ok(())
    }
}

/// A fixed set of online users.
#[derive(Default, Clone)]
pub struct StaticPresence {
    online: HashSet<UserId>,
}

impl StaticPresence {
    pub fn new(online: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            online: online.into_iter().collect(),
        }
    }
}

#[async_trait]
impl PresenceSignal for StaticPresence {
    async fn online(&self, user_ids: &[UserId]) -> Result<HashSet<UserId>> {
        Ok(user_ids
            .iter()
            .filter(|id| self.online.contains(*id))
            .cloned()
            .collect())
    }
}

/// Issues opaque, unsigned room tokens.
#[derive(Default, Clone, Copy)]
pub struct LocalVideoIssuer;

#[async_trait]
impl VideoSessionIssuer for LocalVideoIssuer {
    async fn issue(
        &self,
        room_id: &str,
        user_id: &UserId,
        expires_at: DateTime<Utc>,
    ) -> Result<JoinCredential> {
        Ok(JoinCredential {
            room_id: room_id.to_string(),
            user_id: user_id.clone(),
            token: format!("{room_id}.{user_id}.{}", Uuid::new_v4().simple()),
            expires_at,
        })
    }
}
