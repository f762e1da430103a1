//! Candidate scoring.
//!
//! Scores are pure functions of their inputs so that ranking stays
//! deterministic and new signals can be added here without touching the
//! search pipeline.

use crate::domain::booking::UserId;
use std::cmp::Ordering;

/// Awarded to every candidate that survived the subject/level filter.
pub const SUBJECT_MATCH_POINTS: f64 = 40.0;
/// Maximum contribution of the average rating.
pub const RATING_POINTS: f64 = 30.0;
pub const MAX_RATING: f64 = 5.0;

/// `40 + clamp(rating, 0, 5) / 5 * 30`, substituting `default_rating` for
/// teachers without reviews (or with a nonsensical stored average).
pub fn score(average_rating: Option<f64>, default_rating: f64) -> f64 {
    let rating = average_rating
        .filter(|r| r.is_finite())
        .unwrap_or(default_rating);
    let rating = if rating.is_finite() { rating } else { 0.0 };
    SUBJECT_MATCH_POINTS + rating.clamp(0.0, MAX_RATING) / MAX_RATING * RATING_POINTS
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scored<T> {
    pub teacher_id: UserId,
    pub score: f64,
    pub item: T,
}

/// Highest score first; equal scores fall back to ascending teacher id so the
/// same input always yields the same order.
pub fn rank<T>(mut candidates: Vec<Scored<T>>) -> Vec<Scored<T>> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.teacher_id.cmp(&b.teacher_id))
    });
    candidates
}
