use crate::domain::booking::UserId;
use crate::domain::schedule::WeeklySchedule;
use crate::error::{BookingError, Result};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaughtSubject {
    pub subject_id: String,
    pub name: String,
    pub level: String,
}

impl TaughtSubject {
    pub fn matches(&self, subject_id: &str, level: &str) -> bool {
        self.subject_id == subject_id && self.level.trim().eq_ignore_ascii_case(level.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherProfile {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub approval: ApprovalStatus,
    #[serde(default)]
    pub subjects: Vec<TaughtSubject>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub specializations: Vec<String>,
    /// `None` means the rate is negotiable.
    #[serde(default)]
    pub hourly_rate: Option<Decimal>,
    /// IANA zone name, e.g. `Africa/Lagos`.
    pub timezone: String,
    #[serde(default)]
    pub schedule: WeeklySchedule,
    #[serde(default)]
    pub average_rating: Option<f64>,
    #[serde(default)]
    pub review_count: u32,
}

impl TeacherProfile {
    pub fn is_approved(&self) -> bool {
        self.approval == ApprovalStatus::Approved
    }

    pub fn teaches(&self, subject_id: &str, level: &str) -> bool {
        self.subjects.iter().any(|s| s.matches(subject_id, level))
    }

    pub fn tz(&self) -> Option<Tz> {
        self.timezone.parse().ok()
    }

    /// Price of a session of the given length, rounded to two decimals.
    /// `Ok(None)` for a negotiable rate; a rate too large to price is a
    /// `ValidationError`.
    pub fn session_price(&self, duration_minutes: u32) -> Result<Option<Decimal>> {
        let Some(rate) = self.hourly_rate else {
            return Ok(None);
        };
        rate
            .checked_mul(Decimal::from(duration_minutes))
            .and_then(|total| total.checked_div(Decimal::from(60)))
            .map(|price| {
                Some(price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
            })
            .ok_or_else(|| {
                BookingError::ValidationError(format!(
                    "hourly rate {rate} of teacher {} is out of range",
                    self.id
                ))
            })
    }

    pub fn subject_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.subjects.len());
        for subject in &self.subjects {
            if !names.contains(&subject.name) {
                names.push(subject.name.clone());
            }
        }
        names
    }

    /// Store-level attribute filter: approved, teaching the subject at the
    /// level, and matching the optional language and specialization.
    pub fn matches(&self, query: &TeacherQuery) -> bool {
        self.is_approved()
            && self.teaches(&query.subject_id, &query.level)
            && query
                .language
                .as_deref()
                .is_none_or(|lang| self.languages.iter().any(|l| l.eq_ignore_ascii_case(lang)))
            && query.specialization.as_deref().is_none_or(|spec| {
                self.specializations
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(spec))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeacherQuery {
    pub subject_id: String,
    pub level: String,
    pub language: Option<String>,
    pub specialization: Option<String>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeacherSummary {
    pub teacher_id: UserId,
    pub display_name: String,
    pub score: f64,
    pub total_price: Option<Decimal>,
    pub average_rating: Option<f64>,
    pub review_count: u32,
    pub subjects: Vec<String>,
    /// Only filled for instant searches.
    pub available_now: Option<bool>,
}
