use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// A simple clock abstraction for deterministic time in services and tests.
#[derive(Debug, Clone, Copy, Default)]
pub enum Clock {
    #[default]
    Default,
    Fixed(DateTime<Utc>),
}

impl Clock {
    /// Returns a clock that uses the current system time.
    #[must_use]
    pub fn default_clock() -> Self {
        Self::Default
    }

    /// Returns a clock fixed at the given timestamp.
    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    /// Returns the current time according to the clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::Default => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// If this is a fixed clock, advance it by the given duration.
    ///
    /// Has no effect on `Clock::Default`.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }
}

/// Whole days of access remaining before `expiry`.
///
/// - `None` when there is no expiry
/// - `Some(0)` once `expiry <= now`
/// - otherwise the remaining time rounded up to whole days
#[must_use]
pub fn days_left(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    let expiry = expiry?;
    if expiry <= now {
        return Some(0);
    }
    let remaining = expiry - now;
    let whole = remaining.num_days();
    if remaining > Duration::days(whole) {
        Some(whole + 1)
    } else {
        Some(whole)
    }
}

/// Interpret a timezone-less timestamp as UTC.
#[must_use]
pub fn assume_utc(naive: NaiveDateTime) -> DateTime<Utc> {
    naive.and_utc()
}

/// Parse a stored timestamp: RFC 3339 with offset, or a naive timestamp taken
/// as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(assume_utc)
}

/// Deterministic timestamp for tests and examples (2023-11-14T22:13:20Z).
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Returns a deterministic `DateTime<Utc>` for tests and doc examples.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

/// Returns a `Clock` fixed at the deterministic test timestamp.
#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_left_is_none_without_expiry() {
        assert_eq!(days_left(None, fixed_now()), None);
    }

    #[test]
    fn days_left_is_zero_once_expired() {
        let now = fixed_now();
        assert_eq!(days_left(Some(now), now), Some(0));
        assert_eq!(days_left(Some(now - Duration::days(3)), now), Some(0));
    }

    #[test]
    fn days_left_rounds_partial_days_up() {
        let now = fixed_now();
        assert_eq!(days_left(Some(now + Duration::seconds(1)), now), Some(1));
        assert_eq!(days_left(Some(now + Duration::days(2)), now), Some(2));
        assert_eq!(
            days_left(Some(now + Duration::days(2) + Duration::hours(1)), now),
            Some(3)
        );
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let parsed = parse_timestamp("2023-11-14 22:13:20").unwrap();
        assert_eq!(parsed, fixed_now());
        let parsed = parse_timestamp("2023-11-14T22:13:20.000").unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn offset_timestamps_are_normalized() {
        let parsed = parse_timestamp("2023-11-15T00:13:20+02:00").unwrap();
        assert_eq!(parsed, fixed_now());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn fixed_clock_advances() {
        let mut clock = fixed_clock();
        clock.advance(Duration::days(1));
        assert_eq!(clock.now(), fixed_now() + Duration::days(1));
    }
}
