use crate::application::conflicts::ConflictDetector;
use crate::application::ranking::{self, Scored};
use crate::config::BookingConfig;
use crate::domain::booking::UserId;
use crate::domain::ports::{ClockBox, PresenceSignalBox, TeacherDirectoryBox};
use crate::domain::teacher::{TeacherProfile, TeacherQuery, TeacherSummary};
use crate::domain::window::TimeWindow;
use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// A session at a client-chosen future instant.
    Scheduled(DateTime<Utc>),
    /// A session starting now with a teacher who is online.
    Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchCriteria {
    pub subject_id: String,
    pub level: String,
    pub language: Option<String>,
    pub specialization: Option<String>,
    pub duration_minutes: u32,
    pub max_price: Option<Decimal>,
    pub mode: SearchMode,
}

/// Why a search came back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyReason {
    /// No approved teacher teaches the subject at the level with the
    /// requested language/specialization.
    NoAttributeMatch,
    /// Teachers match, but every one of them is above the budget.
    NoneWithinBudget,
    /// Teachers match, but none is free at the requested time.
    NoneAvailable,
}

impl EmptyReason {
    pub fn message(self) -> &'static str {
        match self {
            EmptyReason::NoAttributeMatch => "no teacher matches the requested subject and level",
            EmptyReason::NoneWithinBudget => "matching teachers exist but all exceed the budget",
            EmptyReason::NoneAvailable => "matching teachers exist but none is free at that time",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub teachers: Vec<TeacherSummary>,
    pub empty_reason: Option<EmptyReason>,
}

impl SearchOutcome {
    fn empty(reason: EmptyReason) -> Self {
        Self {
            teachers: Vec::new(),
            empty_reason: Some(reason),
        }
    }
}

struct Candidate {
    profile: TeacherProfile,
    total_price: Option<Decimal>,
}

/// Ranks teachers for a search, filtering cheap-to-expensive:
/// attributes, budget, weekly schedule, presence (instant only), booked
/// sessions, then scoring.
pub struct MatchingService {
    config: Arc<BookingConfig>,
    teachers: TeacherDirectoryBox,
    conflicts: ConflictDetector,
    presence: Option<PresenceSignalBox>,
    clock: ClockBox,
}

impl MatchingService {
    pub fn new(
        config: Arc<BookingConfig>,
        teachers: TeacherDirectoryBox,
        conflicts: ConflictDetector,
        clock: ClockBox,
    ) -> Self {
        Self {
            config,
            teachers,
            conflicts,
            presence: None,
            clock,
        }
    }

    /// Without a presence signal every instant search finds nobody.
    pub fn with_presence(mut self, presence: PresenceSignalBox) -> Self {
        self.presence = Some(presence);
        self
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> Result<SearchOutcome> {
        let now = self.clock.now();
        let start = self.validate(criteria, now)?;
        let window = TimeWindow::starting_at(start, criteria.duration_minutes);

        let query = TeacherQuery {
            subject_id: criteria.subject_id.clone(),
            level: criteria.level.clone(),
            language: criteria.language.clone(),
            specialization: criteria.specialization.clone(),
        };
        let matched = self.teachers.find(&query).await?;
        tracing::debug!(count = matched.len(), "attribute filter");
        if matched.is_empty() {
            return Ok(SearchOutcome::empty(EmptyReason::NoAttributeMatch));
        }

        let affordable = budget_filter(matched, criteria.duration_minutes, criteria.max_price);
        tracing::debug!(count = affordable.len(), "budget filter");
        if affordable.is_empty() {
            return Ok(SearchOutcome::empty(EmptyReason::NoneWithinBudget));
        }

        let mut pool: Vec<Candidate> = affordable
            .into_iter()
            .filter(|c| schedule_allows(&c.profile, start, criteria.duration_minutes))
            .collect();
        tracing::debug!(count = pool.len(), "availability filter");

        if criteria.mode == SearchMode::Instant && !pool.is_empty() {
            let online = self.online(&pool).await?;
            pool.retain(|c| online.contains(&c.profile.id));
            tracing::debug!(count = pool.len(), "presence filter");
        }

        let ids: Vec<UserId> = pool.iter().map(|c| c.profile.id.clone()).collect();
        let busy = self.conflicts.busy_teachers(&ids, &window).await?;
        pool.retain(|c| !busy.contains(&c.profile.id));
        tracing::debug!(count = pool.len(), busy = busy.len(), "conflict filter");
        if pool.is_empty() {
            return Ok(SearchOutcome::empty(EmptyReason::NoneAvailable));
        }

        let scored = pool
            .into_iter()
            .map(|c| Scored {
                teacher_id: c.profile.id.clone(),
                score: ranking::score(c.profile.average_rating, self.config.default_rating),
                item: c,
            })
            .collect();
        let instant = criteria.mode == SearchMode::Instant;
        let teachers = ranking::rank(scored)
            .into_iter()
            .take(self.config.max_results)
            .map(|s| summarize(s, instant))
            .collect();

        Ok(SearchOutcome {
            teachers,
            empty_reason: None,
        })
    }

    fn validate(&self, criteria: &SearchCriteria, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        if criteria.subject_id.trim().is_empty() || criteria.level.trim().is_empty() {
            return Err(BookingError::ValidationError(
                "subject and level are required".to_string(),
            ));
        }
        if !self.config.duration_allowed(criteria.duration_minutes) {
            return Err(BookingError::ValidationError(format!(
                "duration must be between {} and {} minutes",
                self.config.min_duration_minutes, self.config.max_duration_minutes
            )));
        }
        if criteria.max_price.is_some_and(|p| p < Decimal::ZERO) {
            return Err(BookingError::ValidationError(
                "max price cannot be negative".to_string(),
            ));
        }
        match criteria.mode {
            SearchMode::Instant => Ok(now),
            SearchMode::Scheduled(at) if at > now => Ok(at),
            SearchMode::Scheduled(_) => Err(BookingError::ValidationError(
                "requested time must be in the future".to_string(),
            )),
        }
    }

    async fn online(&self, pool: &[Candidate]) -> Result<HashSet<UserId>> {
        let Some(presence) = &self.presence else {
            return Ok(HashSet::new());
        };
        let ids: Vec<UserId> = pool.iter().map(|c| c.profile.id.clone()).collect();
        presence.online(&ids).await
    }
}

/// Teachers without a rate always pass; a rate too large to price never does.
fn budget_filter(
    teachers: Vec<TeacherProfile>,
    duration_minutes: u32,
    max_price: Option<Decimal>,
) -> Vec<Candidate> {
    teachers
        .into_iter()
        .filter_map(|profile| match profile.session_price(duration_minutes) {
            Ok(total_price) => Some(Candidate {
                total_price,
                profile,
            }),
            Err(e) => {
                tracing::warn!(teacher_id = %profile.id, error = %e, "unpriceable rate, treating teacher as over budget");
                None
            }
        })
        .filter(|c| match (c.total_price, max_price) {
            (Some(price), Some(max)) => price <= max,
            _ => true,
        })
        .collect()
}

fn schedule_allows(profile: &TeacherProfile, start: DateTime<Utc>, duration_minutes: u32) -> bool {
    match profile.tz() {
        Some(tz) => profile.schedule.is_available(start, duration_minutes, tz),
        None => {
            tracing::warn!(teacher_id = %profile.id, timezone = %profile.timezone, "unknown timezone, treating teacher as unavailable");
            false
        }
    }
}

fn summarize(scored: Scored<Candidate>, instant: bool) -> TeacherSummary {
    let Candidate {
        profile,
        total_price,
    } = scored.item;
    TeacherSummary {
        subjects: profile.subject_names(),
        teacher_id: profile.id,
        display_name: profile.display_name,
        score: scored.score,
        total_price,
        average_rating: profile.average_rating,
        review_count: profile.review_count,
        available_now: instant.then_some(true),
    }
}
