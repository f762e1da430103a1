//! Recurring weekly availability.
//!
//! A teacher publishes, per weekday, an ordered list of local time-of-day
//! slots. The stored representation is a loose JSON object
//! (`{"mon": [{"start": "09:00", "end": "12:00"}], ...}`); parsing it never
//! fails, entries that cannot be understood are dropped.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DayKey {
    Mon,
    Tue,
    Wed,
    Thu,
    Fri,
    Sat,
    Sun,
}

impl DayKey {
    pub const ALL: [DayKey; 7] = [
        DayKey::Mon,
        DayKey::Tue,
        DayKey::Wed,
        DayKey::Thu,
        DayKey::Fri,
        DayKey::Sat,
        DayKey::Sun,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DayKey::Mon => "mon",
            DayKey::Tue => "tue",
            DayKey::Wed => "wed",
            DayKey::Thu => "thu",
            DayKey::Fri => "fri",
            DayKey::Sat => "sat",
            DayKey::Sun => "sun",
        }
    }

    /// Accepts short (`mon`) and long (`monday`) names, case-insensitively.
    pub fn parse(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "mon" | "monday" => Some(DayKey::Mon),
            "tue" | "tuesday" => Some(DayKey::Tue),
            "wed" | "wednesday" => Some(DayKey::Wed),
            "thu" | "thursday" => Some(DayKey::Thu),
            "fri" | "friday" => Some(DayKey::Fri),
            "sat" | "saturday" => Some(DayKey::Sat),
            "sun" | "sunday" => Some(DayKey::Sun),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        DayKey::from(Weekday::from(self).succ())
    }
}

impl From<Weekday> for DayKey {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayKey::Mon,
            Weekday::Tue => DayKey::Tue,
            Weekday::Wed => DayKey::Wed,
            Weekday::Thu => DayKey::Thu,
            Weekday::Fri => DayKey::Fri,
            Weekday::Sat => DayKey::Sat,
            Weekday::Sun => DayKey::Sun,
        }
    }
}

impl From<DayKey> for Weekday {
    fn from(day: DayKey) -> Self {
        match day {
            DayKey::Mon => Weekday::Mon,
            DayKey::Tue => Weekday::Tue,
            DayKey::Wed => Weekday::Wed,
            DayKey::Thu => Weekday::Thu,
            DayKey::Fri => Weekday::Fri,
            DayKey::Sat => Weekday::Sat,
            DayKey::Sun => Weekday::Sun,
        }
    }
}

/// A local time-of-day range in minutes since midnight, `start < end <= 1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    start: u32,
    end: u32,
}

impl TimeSlot {
    pub fn new(start: u32, end: u32) -> Option<Self> {
        (start < end && end <= MINUTES_PER_DAY).then_some(Self { start, end })
    }

    /// Parses a pair of `HH:MM` strings. `24:00` is accepted as an end of day.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Self::new(parse_clock(start)?, parse_clock(end)?)
    }

    pub fn start_minute(&self) -> u32 {
        self.start
    }

    pub fn end_minute(&self) -> u32 {
        self.end
    }

    pub fn contains(&self, start: u32, end: u32) -> bool {
        self.start <= start && end <= self.end
    }

    fn from_value(value: &Value) -> Option<Self> {
        let entry = value.as_object()?;
        let start = entry.get("start")?.as_str()?;
        let end = entry.get("end")?.as_str()?;
        Self::parse(start, end)
    }

    fn to_value(self) -> Value {
        let mut entry = Map::new();
        entry.insert("start".into(), Value::String(format_clock(self.start)));
        entry.insert("end".into(), Value::String(format_clock(self.end)));
        Value::Object(entry)
    }
}

fn parse_clock(text: &str) -> Option<u32> {
    let mut parts = text.trim().splitn(3, ':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = parts.next()?.parse().ok()?;
    if let Some(seconds) = parts.next() {
        let _: u32 = seconds.parse().ok()?;
    }
    match (hour, minute) {
        (24, 0) => Some(MINUTES_PER_DAY),
        (0..=23, 0..=59) => Some(hour * 60 + minute),
        _ => None,
    }
}

fn format_clock(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Weekly slots keyed by local weekday.
///
/// Serializes to and from the loose JSON shape; deserializing is lenient
/// and goes through [`WeeklySchedule::parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct WeeklySchedule {
    days: BTreeMap<DayKey, Vec<TimeSlot>>,
}

impl WeeklySchedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, day: DayKey, slot: TimeSlot) -> Self {
        self.add_slot(day, slot);
        self
    }

    pub fn add_slot(&mut self, day: DayKey, slot: TimeSlot) {
        self.days.entry(day).or_default().push(slot);
    }

    pub fn slots(&self, day: DayKey) -> &[TimeSlot] {
        self.days.get(&day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Builds a schedule from a loose JSON value, dropping unknown day keys,
    /// non-list day entries and malformed or inverted slots.
    pub fn parse(value: &Value) -> Self {
        let mut schedule = Self::new();
        let Some(days) = value.as_object() else {
            return schedule;
        };
        for (key, entries) in days {
            let Some(day) = DayKey::parse(key) else {
                continue;
            };
            let Some(entries) = entries.as_array() else {
                continue;
            };
            for slot in entries.iter().filter_map(TimeSlot::from_value) {
                schedule.add_slot(day, slot);
            }
        }
        schedule
    }

    /// Same as [`WeeklySchedule::parse`] for a raw JSON text; invalid JSON
    /// yields an empty schedule.
    pub fn parse_str(text: &str) -> Self {
        serde_json::from_str::<Value>(text)
            .map(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    pub fn to_value(&self) -> Value {
        let days = self
            .days
            .iter()
            .map(|(day, slots)| {
                let slots = slots.iter().map(|slot| slot.to_value()).collect();
                (day.as_str().to_string(), Value::Array(slots))
            })
            .collect::<Map<String, Value>>();
        Value::Object(days)
    }

    /// Whether `[start, start + duration)` fits entirely inside one slot,
    /// evaluated in the teacher's local time.
    ///
    /// A window crossing local midnight must be covered by a slot running to
    /// the end of the start day and a slot beginning at midnight of the next.
    pub fn is_available(&self, start: DateTime<Utc>, duration_minutes: u32, tz: Tz) -> bool {
        if duration_minutes == 0 {
            return false;
        }

        let local = start.with_timezone(&tz);
        let day = DayKey::from(local.weekday());
        let start_minute = local.hour() * 60 + local.minute();
        let mut end_minute = start_minute + duration_minutes;
        // A start between whole minutes ends between whole minutes too.
        if local.second() != 0 || local.nanosecond() != 0 {
            end_minute += 1;
        }

        if end_minute <= MINUTES_PER_DAY {
            return self.covers(day, start_minute, end_minute);
        }

        let spill = end_minute - MINUTES_PER_DAY;
        spill <= MINUTES_PER_DAY
            && self.covers(day, start_minute, MINUTES_PER_DAY)
            && self.covers(day.next(), 0, spill)
    }

    fn covers(&self, day: DayKey, start: u32, end: u32) -> bool {
        self.slots(day).iter().any(|slot| slot.contains(start, end))
    }
}

impl From<Value> for WeeklySchedule {
    fn from(value: Value) -> Self {
        Self::parse(&value)
    }
}

impl From<WeeklySchedule> for Value {
    fn from(schedule: WeeklySchedule) -> Self {
        schedule.to_value()
    }
}
