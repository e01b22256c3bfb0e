use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::errors::CoreError;

/// Upper bound on the day-by-day search for the next occurrence.
/// Any satisfiable 5-field expression (including Feb 29) matches within
/// eight years; anything beyond that is treated as never occurring.
const MAX_SEARCH_DAYS: u32 = 366 * 8;

/// A validated recurrence specification.
///
/// Parses either a shorthand (`daily`, `weekly`, ...) or a standard 5-field
/// cron expression (minute, hour, day-of-month, month, day-of-week).
/// Occurrence generation is a pure function of the spec and the window:
/// no hidden state, restartable, whole-minute resolution.
///
/// Serialized as the canonical cron string and re-validated on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Recurrence {
    spec: String,
    minute: FieldSet,
    hour: FieldSet,
    day_of_month: FieldSet,
    month: FieldSet,
    day_of_week: FieldSet,
}

/// One parsed cron field: a bitmask of allowed values plus a flag telling
/// whether the field was written as a bare `*` (needed for the standard
/// day-of-month / day-of-week "either matches" rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    restricted: bool,
}

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1 << value) != 0
    }
}

impl Recurrence {
    /// Parse a shorthand or 5-field cron expression.
    ///
    /// Shorthands and their canonical equivalents:
    /// - `every-minute` → `* * * * *`
    /// - `daily`        → `0 9 * * *`
    /// - `weekly`       → `0 9 * * 1`
    /// - `monthly`      → `0 9 1 * *`
    /// - `yearly`       → `0 9 1 1 *`
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        let cron = match trimmed {
            "every-minute" => "* * * * *",
            "daily" => "0 9 * * *",
            "weekly" => "0 9 * * 1",
            "monthly" => "0 9 1 * *",
            "yearly" => "0 9 1 1 *",
            other => other,
        };

        let fields: Vec<&str> = cron.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CoreError::InvalidRecurrence {
                spec: input.to_string(),
                reason: format!("expected 5 fields, got {}", fields.len()),
            });
        }

        let minute = parse_field(input, fields[0], 0, 59, false)?;
        let hour = parse_field(input, fields[1], 0, 23, false)?;
        let day_of_month = parse_field(input, fields[2], 1, 31, false)?;
        let month = parse_field(input, fields[3], 1, 12, false)?;
        let day_of_week = parse_field(input, fields[4], 0, 7, true)?;

        Ok(Self {
            spec: fields.join(" "),
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        })
    }

    /// The canonical cron string this recurrence was parsed to.
    #[must_use]
    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Whether `at` (truncated to the minute) satisfies this expression.
    #[must_use]
    pub fn matches(&self, at: NaiveDateTime) -> bool {
        self.day_matches(at.date())
            && self.hour.contains(at.hour())
            && self.minute.contains(at.minute())
    }

    /// The first occurrence at or after `from`, if one exists within the
    /// search horizon.
    #[must_use]
    pub fn next_at_or_after(&self, from: NaiveDateTime) -> Option<NaiveDateTime> {
        let start = ceil_to_minute(from)?;
        let mut date = start.date();
        let mut floor: Option<NaiveTime> = Some(start.time());

        for _ in 0..MAX_SEARCH_DAYS {
            if self.day_matches(date) {
                if let Some(time) = self.first_time_at_or_after(floor) {
                    return Some(date.and_time(time));
                }
            }
            date = date.succ_opt()?;
            floor = None;
        }
        None
    }

    /// The first occurrence strictly after `after`, if any.
    #[must_use]
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let from = floor_to_minute(after) + Duration::minutes(1);
        self.next_at_or_after(from)
    }

    /// Lazy ascending iterator over all occurrences in `[start, end]`
    /// (both inclusive). A window with no matching instants yields an
    /// empty iterator, which is not an error.
    #[must_use]
    pub fn occurrences_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> Occurrences<'_> {
        let first = if start > end {
            None
        } else {
            self.next_at_or_after(start).filter(|t| *t <= end)
        };
        Occurrences {
            recurrence: self,
            next: first,
            end,
        }
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        if !self.month.contains(date.month()) {
            return false;
        }
        let dom_ok = self.day_of_month.contains(date.day());
        let dow_ok = self.day_of_week.contains(date.weekday().num_days_from_sunday());
        // Standard cron: when both day fields are restricted, a day matches
        // if either does; otherwise only the restricted one constrains.
        match (self.day_of_month.restricted, self.day_of_week.restricted) {
            (true, true) => dom_ok || dow_ok,
            (true, false) => dom_ok,
            (false, true) => dow_ok,
            (false, false) => true,
        }
    }

    /// Smallest matching time-of-day at or after `floor` (start of day if
    /// `None`), or `None` if no matching time remains in the day.
    fn first_time_at_or_after(&self, floor: Option<NaiveTime>) -> Option<NaiveTime> {
        let (floor_hour, floor_minute) = match floor {
            Some(t) => (t.hour(), t.minute()),
            None => (0, 0),
        };
        for hour in floor_hour..24 {
            if !self.hour.contains(hour) {
                continue;
            }
            let min_start = if hour == floor_hour { floor_minute } else { 0 };
            for minute in min_start..60 {
                if self.minute.contains(minute) {
                    return NaiveTime::from_hms_opt(hour, minute, 0);
                }
            }
        }
        None
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spec)
    }
}

impl FromStr for Recurrence {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Recurrence {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Recurrence> for String {
    fn from(value: Recurrence) -> Self {
        value.spec
    }
}

/// Lazy iterator over the occurrences of a [`Recurrence`] inside an
/// inclusive window. Produced by [`Recurrence::occurrences_between`].
#[derive(Debug)]
pub struct Occurrences<'a> {
    recurrence: &'a Recurrence,
    next: Option<NaiveDateTime>,
    end: NaiveDateTime,
}

impl Iterator for Occurrences<'_> {
    type Item = NaiveDateTime;

    fn next(&mut self) -> Option<NaiveDateTime> {
        let current = self.next?;
        self.next = self
            .recurrence
            .next_after(current)
            .filter(|t| *t <= self.end);
        Some(current)
    }
}

// ── Field parsing ───────────────────────────────────────────────────

/// Parse one cron field into a bitmask. Grammar: comma-separated list of
/// `*`, `N`, or `A-B`, each optionally followed by `/step`.
/// `wrap_seven` folds 7 onto 0 for the day-of-week field (7 ≡ Sunday).
fn parse_field(
    spec: &str,
    field: &str,
    min: u32,
    max: u32,
    wrap_seven: bool,
) -> Result<FieldSet, CoreError> {
    let invalid = |reason: String| CoreError::InvalidRecurrence {
        spec: spec.to_string(),
        reason,
    };

    let mut bits: u64 = 0;
    let mut restricted = false;

    for part in field.split(',') {
        if part.is_empty() {
            return Err(invalid(format!("empty list item in field '{field}'")));
        }

        let (body, step) = match part.split_once('/') {
            Some((body, step_str)) => {
                let step: u32 = step_str
                    .parse()
                    .map_err(|_| invalid(format!("invalid step '{step_str}'")))?;
                if step == 0 {
                    return Err(invalid("step must be at least 1".to_string()));
                }
                (body, step)
            }
            None => (part, 1),
        };

        let (lo, hi) = if body == "*" {
            // `*` alone (no step, no siblings) leaves the field unrestricted.
            if part != "*" || field != "*" {
                restricted = true;
            }
            (min, max)
        } else if let Some((a, b)) = body.split_once('-') {
            restricted = true;
            let lo: u32 = a
                .parse()
                .map_err(|_| invalid(format!("invalid range start '{a}'")))?;
            let hi: u32 = b
                .parse()
                .map_err(|_| invalid(format!("invalid range end '{b}'")))?;
            (lo, hi)
        } else {
            restricted = true;
            let v: u32 = body
                .parse()
                .map_err(|_| invalid(format!("invalid value '{body}'")))?;
            (v, v)
        };

        if lo > hi {
            return Err(invalid(format!("range {lo}-{hi} is inverted")));
        }
        if lo < min || hi > max {
            return Err(invalid(format!(
                "value out of bounds in '{part}' (allowed {min}-{max})"
            )));
        }

        let mut v = lo;
        while v <= hi {
            let bit = if wrap_seven && v == 7 { 0 } else { v };
            bits |= 1 << bit;
            v += step;
        }
    }

    if bits == 0 {
        return Err(invalid(format!("field '{field}' matches no values")));
    }

    Ok(FieldSet { bits, restricted })
}

// ── Minute rounding ─────────────────────────────────────────────────

fn floor_to_minute(t: NaiveDateTime) -> NaiveDateTime {
    t.date().and_time(NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(NaiveTime::MIN))
}

fn ceil_to_minute(t: NaiveDateTime) -> Option<NaiveDateTime> {
    let floored = floor_to_minute(t);
    if floored < t {
        floored.checked_add_signed(Duration::minutes(1))
    } else {
        Some(floored)
    }
}
