use crate::error::{BookingError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Deserialize, PartialEq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Gateway callback for a paid reference.
    Pay,
    Accept,
    Decline,
    Cancel,
    Reschedule,
    Complete,
    Review,
}

/// One replayed booking action. `at` is the instant the action happens.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ActionRecord {
    pub action: ActionKind,
    pub actor: String,
    pub reference: String,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub rating: Option<u8>,
}

/// Reads booking actions from a CSV source.
///
/// Whitespace is trimmed and trailing optional columns may be omitted.
pub struct ActionReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ActionReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes actions, one `Result` per row.
    pub fn actions(self) -> impl Iterator<Item = Result<ActionRecord>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(BookingError::from))
    }
}
