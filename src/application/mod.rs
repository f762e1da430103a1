//! Application layer orchestrating the booking flow.
//!
//! Searching goes through [`matching::MatchingService`], paying and booking
//! through [`checkout::CheckoutService`], and every later status change through
//! [`lifecycle::BookingLifecycle`]. Services only talk to the outside world via
//! the ports in [`crate::domain::ports`].

pub mod checkout;
pub mod conflicts;
pub mod lifecycle;
pub mod matching;
pub mod ranking;
pub mod retry;
pub mod video;

use crate::domain::booking::{BookingId, UserId};
use crate::domain::ports::{Notification, NotificationSinkBox};

pub(crate) fn booking_link(id: BookingId) -> String {
    format!("/bookings/{id}")
}

/// Side-effect notification: failures are logged and swallowed.
pub(crate) async fn notify_quietly(
    sink: &NotificationSinkBox,
    user_id: &UserId,
    message: String,
    link: String,
) {
    let notification = Notification {
        user_id: user_id.clone(),
        message,
        link,
    };
    if let Err(e) = sink.notify(notification).await {
        tracing::warn!(user_id = %user_id, error = %e, "notification delivery failed");
    }
}
