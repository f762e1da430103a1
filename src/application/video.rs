use crate::config::BookingConfig;
use crate::domain::booking::{BookingId, BookingStatus};
use crate::domain::ports::{BookingStoreBox, ClockBox, JoinCredential, VideoSessionIssuerBox};
use crate::domain::principal::Principal;
use crate::error::{BookingError, Result};
use chrono::Duration;
use std::sync::Arc;

/// Hands out video-room credentials to participants of an accepted session
/// shortly before it starts and until a grace period after it ends.
pub struct VideoAccess {
    config: Arc<BookingConfig>,
    store: BookingStoreBox,
    issuer: VideoSessionIssuerBox,
    clock: ClockBox,
}

impl VideoAccess {
    pub fn new(
        config: Arc<BookingConfig>,
        store: BookingStoreBox,
        issuer: VideoSessionIssuerBox,
        clock: ClockBox,
    ) -> Self {
        Self {
            config,
            store,
            issuer,
            clock,
        }
    }

    pub async fn join(&self, principal: &Principal, id: BookingId) -> Result<JoinCredential> {
        let booking = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| BookingError::not_found("booking", id))?;
        if !booking.is_participant(&principal.user_id) {
            return Err(BookingError::AuthorizationError(
                "not a participant of this booking".to_string(),
            ));
        }
        if booking.status != BookingStatus::Accepted {
            return Err(BookingError::ValidationError(format!(
                "cannot join a {} session",
                booking.status
            )));
        }
        let Some(room_id) = booking.video_room_id.as_deref() else {
            return Err(BookingError::InternalError(
                format!("accepted booking {id} has no video room").into(),
            ));
        };

        let end = booking.end_time_utc.unwrap_or_else(|| booking.scheduled_end());
        let opens = booking.requested_time - Duration::minutes(self.config.join_lead_minutes);
        let closes = end + Duration::minutes(self.config.join_grace_minutes);
        let now = self.clock.now();
        if now < opens || now > closes {
            return Err(BookingError::ValidationError(format!(
                "the room is open from {opens} to {closes}"
            )));
        }

        self.issuer.issue(room_id, &principal.user_id, closes).await
    }
}
