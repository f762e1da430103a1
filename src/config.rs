//! Runtime configuration.
//!
//! Built once at start-up from defaults, an optional TOML file and
//! `TUTORBOOK_*` environment variables, then shared as `Arc<BookingConfig>`.

use crate::error::{BookingError, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest session the weekly schedule can reason about.
const MAX_SESSION_MINUTES: u32 = 24 * 60;
/// Upper bound for the cutoff and join-window offsets.
const MAX_OFFSET_MINUTES: i64 = 7 * 24 * 60;

/// What to do when a participant completes a session before its scheduled end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EarlyCompletion {
    #[default]
    Reject,
    Warn,
}

/// Bounded retry for transient collaborator failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl RetryPolicy {
    /// Delay before the given retry (1-based), growing linearly.
    pub fn delay(&self, retry: u32) -> Duration {
        Duration::from_millis(self.interval_ms.saturating_mul(u64::from(retry)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interval_ms: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingConfig {
    pub currency: String,
    pub callback_url: String,
    pub min_duration_minutes: u32,
    pub max_duration_minutes: u32,
    /// ACCEPTED bookings cannot be cancelled this close to their start.
    pub cancellation_cutoff_minutes: i64,
    pub join_lead_minutes: i64,
    pub join_grace_minutes: i64,
    pub max_results: usize,
    /// Rating assumed for teachers without reviews.
    pub default_rating: f64,
    pub early_completion: EarlyCompletion,
    pub gateway_retry: RetryPolicy,
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            currency: "NGN".to_string(),
            callback_url: "http://localhost:3000/payments/callback".to_string(),
            min_duration_minutes: 30,
            max_duration_minutes: 180,
            cancellation_cutoff_minutes: 60,
            join_lead_minutes: 10,
            join_grace_minutes: 15,
            max_results: 10,
            default_rating: 3.0,
            early_completion: EarlyCompletion::Reject,
            gateway_retry: RetryPolicy::default(),
        }
    }
}

impl BookingConfig {
    /// Defaults, then the TOML file if given, then `TUTORBOOK_` variables
    /// (`TUTORBOOK_GATEWAY_RETRY__MAX_ATTEMPTS=5`).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment
            .merge(Env::prefixed("TUTORBOOK_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the services cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.currency.trim().is_empty() {
            return Err(invalid("currency must not be empty".to_string()));
        }
        if self.min_duration_minutes == 0
            || self.min_duration_minutes > self.max_duration_minutes
            || self.max_duration_minutes > MAX_SESSION_MINUTES
        {
            return Err(invalid(format!(
                "session durations must satisfy 0 < min <= max <= {MAX_SESSION_MINUTES}, got {}..{}",
                self.min_duration_minutes, self.max_duration_minutes
            )));
        }
        for (name, minutes) in [
            ("cancellation_cutoff_minutes", self.cancellation_cutoff_minutes),
            ("join_lead_minutes", self.join_lead_minutes),
            ("join_grace_minutes", self.join_grace_minutes),
        ] {
            if !(0..=MAX_OFFSET_MINUTES).contains(&minutes) {
                return Err(invalid(format!(
                    "{name} must be between 0 and {MAX_OFFSET_MINUTES}, got {minutes}"
                )));
            }
        }
        if self.max_results == 0 {
            return Err(invalid("max_results must be at least 1".to_string()));
        }
        if !(0.0..=5.0).contains(&self.default_rating) {
            return Err(invalid(format!(
                "default_rating must be between 0 and 5, got {}",
                self.default_rating
            )));
        }
        Ok(())
    }

    pub fn duration_allowed(&self, minutes: u32) -> bool {
        (self.min_duration_minutes..=self.max_duration_minutes).contains(&minutes)
    }
}

fn invalid(message: String) -> BookingError {
    BookingError::ConfigError(Box::new(figment::Error::from(message)))
}
