use crate::domain::booking::UserId;
use crate::domain::ports::BookingStoreBox;
use crate::domain::window::TimeWindow;
use crate::error::Result;
use std::collections::HashSet;

/// Answers "is this teacher already booked for this window?" against
/// ACCEPTED bookings only.
#[derive(Clone)]
pub struct ConflictDetector {
    store: BookingStoreBox,
}

impl ConflictDetector {
    pub fn new(store: BookingStoreBox) -> Self {
        Self { store }
    }

    pub async fn is_busy(&self, teacher_id: &UserId, window: &TimeWindow) -> Result<bool> {
        let busy = self
            .busy_teachers(std::slice::from_ref(teacher_id), window)
            .await?;
        Ok(busy.contains(teacher_id))
    }

    /// Teachers among `teacher_ids` holding an ACCEPTED booking that overlaps
    /// `window`. Issues a single store query regardless of how many ids are
    /// passed.
    pub async fn busy_teachers(
        &self,
        teacher_ids: &[UserId],
        window: &TimeWindow,
    ) -> Result<HashSet<UserId>> {
        if teacher_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let accepted = self.store.accepted_overlapping(teacher_ids, window).await?;
        // Re-check in memory; the store may over-fetch.
        Ok(accepted
            .into_iter()
            .filter(|booking| booking.window().overlaps(window))
            .map(|booking| booking.teacher_id)
            .collect())
    }
}
