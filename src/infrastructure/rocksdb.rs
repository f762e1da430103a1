use crate::domain::booking::{Booking, BookingId, BookingStatus, UserId};
use crate::domain::ports::{BookingStore, ConditionalWrite, InsertOutcome};
use crate::domain::window::TimeWindow;
use crate::error::{BookingError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Column Family for booking rows, keyed by booking id.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family mapping payment references to booking ids.
pub const CF_PAYMENT_REFS: &str = "payment_refs";

/// A persistent booking store using RocksDB.
///
/// Read-check-write sequences (reference uniqueness, conditional status
/// writes, the accepted-overlap guard) run under a single writer lock and land
/// in one `WriteBatch`, so no partial write is ever visible.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_bookings = ColumnFamilyDescriptor::new(CF_BOOKINGS, Options::default());
        let cf_refs = ColumnFamilyDescriptor::new(CF_PAYMENT_REFS, Options::default());

        let db = DB::open_cf_descriptors(&opts, path, vec![cf_bookings, cf_refs])?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            BookingError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn load(&self, id: BookingId) -> Result<Option<Booking>> {
        let cf = self.cf(CF_BOOKINGS)?;
        match self.db.get_cf(cf, id.0.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn reference_owner(&self, reference: &str) -> Result<Option<BookingId>> {
        let cf = self.cf(CF_PAYMENT_REFS)?;
        match self.db.get_cf(cf, reference.as_bytes())? {
            Some(bytes) => {
                let uuid = Uuid::from_slice(&bytes)
                    .map_err(|e| BookingError::InternalError(Box::new(e)))?;
                Ok(Some(BookingId(uuid)))
            }
            None => Ok(None),
        }
    }

    fn scan(&self) -> Result<Vec<Booking>> {
        let cf = self.cf(CF_BOOKINGS)?;
        let mut bookings = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            bookings.push(decode(&value)?);
        }
        Ok(bookings)
    }
}

fn decode(bytes: &[u8]) -> Result<Booking> {
    serde_json::from_slice(bytes).map_err(|e| {
        BookingError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Deserialization error: {e}"),
        )))
    })
}

fn encode(booking: &Booking) -> Result<Vec<u8>> {
    serde_json::to_vec(booking).map_err(|e| {
        BookingError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Serialization error: {e}"),
        )))
    })
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn insert(&self, booking: Booking) -> Result<InsertOutcome> {
        let _guard = self.writer.lock().await;
        if let Some(reference) = &booking.payment_reference
            && let Some(existing) = self.reference_owner(reference)?
        {
            return Ok(InsertOutcome::Duplicate(existing));
        }
        if self.load(booking.id)?.is_some() {
            return Err(BookingError::InternalError(
                format!("booking id {} already in use", booking.id).into(),
            ));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf(CF_BOOKINGS)?, booking.id.0.as_bytes(), encode(&booking)?);
        if let Some(reference) = &booking.payment_reference {
            batch.put_cf(
                self.cf(CF_PAYMENT_REFS)?,
                reference.as_bytes(),
                booking.id.0.as_bytes(),
            );
        }
        self.db.write(batch)?;
        Ok(InsertOutcome::Created(booking.id))
    }

    async fn get(&self, id: BookingId) -> Result<Option<Booking>> {
        self.load(id)
    }

    async fn find_by_payment_reference(&self, reference: &str) -> Result<Option<Booking>> {
        match self.reference_owner(reference)? {
            Some(id) => self.load(id),
            None => Ok(None),
        }
    }

    async fn write(&self, write: ConditionalWrite) -> Result<Booking> {
        let _guard = self.writer.lock().await;
        let id = write.booking.id;
        let current = self
            .load(id)?
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
            let clash = self.scan()?.into_iter().find(|other| {
                other.id != id
                    && other.teacher_id == write.booking.teacher_id
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

        self.db.put_cf(
            self.cf(CF_BOOKINGS)?,
            id.0.as_bytes(),
            encode(&write.booking)?,
        )?;
        Ok(write.booking)
    }

    async fn accepted_overlapping(
        &self,
        teacher_ids: &[UserId],
        window: &TimeWindow,
    ) -> Result<Vec<Booking>> {
        let wanted: HashSet<&UserId> = teacher_ids.iter().collect();
        Ok(self
            .scan()?
            .into_iter()
            .filter(|b| {
                b.status == BookingStatus::Accepted
                    && wanted.contains(&b.teacher_id)
                    && b.window().overlaps(window)
            })
            .collect())
    }

    async fn all(&self) -> Result<Vec<Booking>> {
        let mut bookings = self.scan()?;
        bookings.sort_by(|a, b| {
            a.requested_time
                .cmp(&b.requested_time)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(bookings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingIntent;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn booking(reference: &str) -> Booking {
        let intent = BookingIntent {
            student_id: UserId::new("student-1"),
            teacher_id: UserId::new("teacher-1"),
            subject_id: "math".into(),
            level: "SS2".into(),
            requested_time: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
            duration_minutes: 60,
        };
        Booking::pending(intent, Some(reference.to_string()), dec!(5000), Utc::now())
    }

    #[tokio::test]
    async fn test_rocksdb_open_cf() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).expect("Failed to open RocksDB");

        assert!(store.db.cf_handle(CF_BOOKINGS).is_some());
        assert!(store.db.cf_handle(CF_PAYMENT_REFS).is_some());
    }

    #[tokio::test]
    async fn test_rocksdb_insert_and_lookup() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let b = booking("ref-1");

        assert_eq!(
            store.insert(b.clone()).await.unwrap(),
            InsertOutcome::Created(b.id)
        );
        assert_eq!(
            store.insert(booking("ref-1")).await.unwrap(),
            InsertOutcome::Duplicate(b.id)
        );

        assert_eq!(store.get(b.id).await.unwrap(), Some(b.clone()));
        assert_eq!(
            store.find_by_payment_reference("ref-1").await.unwrap(),
            Some(b)
        );
        assert!(store.find_by_payment_reference("ref-2").await.unwrap().is_none());
        assert_eq!(store.all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rocksdb_conditional_write() {
        let dir = tempdir().unwrap();
        let store = RocksDBStore::open(dir.path()).unwrap();
        let b = booking("ref-1");
        store.insert(b.clone()).await.unwrap();

        let mut next = b.clone();
        next.status = BookingStatus::Declined;
        store
            .write(ConditionalWrite {
                expected: BookingStatus::Pending,
                booking: next.clone(),
                exclusive: None,
                first_review: false,
            })
            .await
            .unwrap();

        let again = store
            .write(ConditionalWrite {
                expected: BookingStatus::Pending,
                booking: next,
                exclusive: None,
                first_review: false,
            })
            .await;
        assert!(matches!(again, Err(BookingError::StaleStateError { .. })));
        assert_eq!(
            store.get(b.id).await.unwrap().unwrap().status,
            BookingStatus::Declined
        );
    }
}
