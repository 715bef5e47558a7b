//! Subscription period strings such as `"6 months"` or `"1 Year"`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Days, Months, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PERIOD_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)\s*([A-Za-z]+)\s*$").expect("period pattern should compile")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PeriodError {
    #[error("period is empty")]
    Empty,

    #[error("malformed period: {0:?}")]
    Malformed(String),

    #[error("unknown period unit: {0:?}")]
    UnknownUnit(String),

    #[error("period {0} cannot be represented")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeriodUnit {
    Day,
    Week,
    Month,
    Year,
}

impl PeriodUnit {
    /// Accepts singular or plural unit names, case-insensitively.
    fn parse(raw: &str) -> Option<Self> {
        let lower = raw.to_ascii_lowercase();
        let singular = lower.strip_suffix('s').unwrap_or(&lower);
        match singular {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodUnit::Day => "day",
            PeriodUnit::Week => "week",
            PeriodUnit::Month => "month",
            PeriodUnit::Year => "year",
        }
    }
}

/// A parsed `<count> <unit>` subscription length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    count: u32,
    unit: PeriodUnit,
}

impl Period {
    #[must_use]
    pub fn new(count: u32, unit: PeriodUnit) -> Self {
        Self { count, unit }
    }

    /// Parse `<integer><whitespace?><unit>` where unit is day, week, month
    /// or year, optionally pluralized.
    ///
    /// # Errors
    ///
    /// Returns `PeriodError` when the input does not have that shape or the
    /// count does not fit in a `u32`.
    pub fn parse(raw: &str) -> Result<Self, PeriodError> {
        if raw.trim().is_empty() {
            return Err(PeriodError::Empty);
        }
        let caps = PERIOD_PATTERN
            .captures(raw)
            .ok_or_else(|| PeriodError::Malformed(raw.to_owned()))?;

        let unit_raw = &caps[2];
        let unit =
            PeriodUnit::parse(unit_raw).ok_or_else(|| PeriodError::UnknownUnit(unit_raw.to_owned()))?;
        let count = caps[1]
            .parse::<u32>()
            .map_err(|_| PeriodError::Overflow(raw.trim().to_owned()))?;

        Ok(Self { count, unit })
    }

    /// Absolute instant `now + self`, using calendar arithmetic.
    ///
    /// Month and year steps keep the day of month where possible and fall
    /// back to the last day of shorter months (Jan 31 + 1 month = Feb 28/29).
    ///
    /// # Errors
    ///
    /// Returns `PeriodError::Overflow` if the result is out of range.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, PeriodError> {
        let count = self.count;
        let expiry = match self.unit {
            PeriodUnit::Day => now.checked_add_days(Days::new(u64::from(count))),
            PeriodUnit::Week => now.checked_add_days(Days::new(u64::from(count) * 7)),
            PeriodUnit::Month => now.checked_add_months(Months::new(count)),
            PeriodUnit::Year => count
                .checked_mul(12)
                .and_then(|months| now.checked_add_months(Months::new(months))),
        };
        expiry.ok_or_else(|| PeriodError::Overflow(self.to_string()))
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plural = if self.count == 1 { "" } else { "s" };
        write!(f, "{} {}{}", self.count, self.unit.as_str(), plural)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Expiry for an optional period string; anything unparsable means no expiry.
#[must_use]
pub fn expiry_from_spec(spec: Option<&str>, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let period = Period::parse(spec?).ok()?;
    period.expires_at(now).ok()
}
