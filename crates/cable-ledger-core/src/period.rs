//! Billing periods and clocks.
//!
//! A billing period is one calendar month in the operator's local time. The
//! "current" period runs from the first instant of this month up to and
//! including now, so entries dated in the future never count as paid.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Datelike, Duration, FixedOffset, Local, NaiveDate, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A closed time range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingPeriod {
    /// First instant of the period.
    pub start: DateTime<Utc>,
    /// Last instant of the period (inclusive).
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// Create a period from its bounds.
    #[must_use]
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Whether `instant` falls inside the period, bounds included.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Source of the current time and of calendar-month boundaries.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;

    /// The first instant of the calendar month containing `instant`.
    fn start_of_month(&self, instant: DateTime<Utc>) -> DateTime<Utc>;

    /// The last instant of the calendar month containing `instant`: one
    /// nanosecond before the next month starts.
    fn end_of_month(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        let start = self.start_of_month(instant);
        // 32 days past the first always lands in the next month.
        let next = self.start_of_month(start + Duration::days(32));
        next - Duration::nanoseconds(1)
    }

    /// `[start_of_month(now), now]`.
    fn current_period(&self) -> BillingPeriod {
        let now = self.now();
        BillingPeriod::new(self.start_of_month(now), now)
    }

    /// The whole calendar month containing `instant`.
    fn month_of(&self, instant: DateTime<Utc>) -> BillingPeriod {
        BillingPeriod::new(self.start_of_month(instant), self.end_of_month(instant))
    }
}

/// Compute local midnight on the first of the month containing `instant`.
///
/// If midnight does not exist in `tz` (a DST gap on the first), the first
/// valid hour after it is used.
#[must_use]
pub fn start_of_month_in<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let local = instant.with_timezone(tz);
    let Some(midnight) = NaiveDate::from_ymd_opt(local.year(), local.month(), 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    else {
        return instant;
    };

    (0..3)
        .find_map(|hours| {
            tz.from_local_datetime(&(midnight + Duration::hours(hours)))
                .earliest()
        })
        .map_or(instant, |start| start.with_timezone(&Utc))
}

/// Wall-clock time, in the machine's local timezone or a fixed offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// A clock using the machine's local timezone.
    #[must_use]
    pub const fn local() -> Self {
        Self { offset: None }
    }

    /// A clock whose months are computed at a fixed UTC offset.
    #[must_use]
    pub const fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn start_of_month(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match &self.offset {
            Some(offset) => start_of_month_in(instant, offset),
            None => start_of_month_in(instant, &Local),
        }
    }
}

/// A clock that only moves when told to.
///
/// Months are computed at a fixed offset (UTC unless configured otherwise).
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    offset: FixedOffset,
}

impl ManualClock {
    /// A clock frozen at `now`, computing months in UTC.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    /// A clock frozen at `now`, computing months at `offset`.
    #[must_use]
    pub fn with_offset(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            now: Mutex::new(now),
            offset,
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_of_month(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        start_of_month_in(instant, &self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn current_period_runs_from_first_of_month_to_now() {
        let clock = ManualClock::new(utc(2025, 3, 17, 14, 5));
        let period = clock.current_period();
        assert_eq!(period.start, utc(2025, 3, 1, 0, 0));
        assert_eq!(period.end, utc(2025, 3, 17, 14, 5));
    }

    #[test]
    fn period_bounds_are_inclusive() {
        let clock = ManualClock::new(utc(2025, 3, 17, 14, 5));
        let period = clock.current_period();
        assert!(period.contains(period.start));
        assert!(period.contains(period.end));
        assert!(!period.contains(period.start - Duration::milliseconds(1)));
        assert!(!period.contains(period.end + Duration::milliseconds(1)));
    }

    #[test]
    fn month_start_respects_offset() {
        // 20:00 UTC on Feb 28 is already March 1 in UTC+05:30.
        let ist = FixedOffset::east_opt(5 * 3600 + 1800).unwrap();
        let clock = ManualClock::with_offset(utc(2025, 2, 28, 20, 0), ist);
        assert_eq!(clock.start_of_month(clock.now()), utc(2025, 2, 28, 18, 30));
    }

    #[test]
    fn end_of_month_handles_short_and_leap_months() {
        let clock = ManualClock::new(utc(2024, 2, 10, 0, 0));
        assert_eq!(
            clock.end_of_month(clock.now()),
            utc(2024, 3, 1, 0, 0) - Duration::nanoseconds(1)
        );

        let december = clock.month_of(utc(2024, 12, 31, 23, 59));
        assert_eq!(december.start, utc(2024, 12, 1, 0, 0));
        assert_eq!(december.end, utc(2025, 1, 1, 0, 0) - Duration::nanoseconds(1));
    }

    #[test]
    fn last_millisecond_of_the_month_belongs_to_it() {
        let april = utc(2025, 4, 1, 0, 0);
        let late = april - Duration::microseconds(500);
        let clock = ManualClock::new(late);

        let march = clock.month_of(late);
        assert!(march.contains(late));
        assert!(march.contains(april - Duration::nanoseconds(1)));
        assert!(!march.contains(april));
        assert!(clock.month_of(april).contains(april));
    }

    #[test]
    fn manual_clock_moves_only_when_told() {
        let clock = ManualClock::new(utc(2025, 1, 5, 10, 0));
        assert_eq!(clock.now(), utc(2025, 1, 5, 10, 0));
        clock.advance(Duration::days(36));
        assert_eq!(clock.now(), utc(2025, 2, 10, 10, 0));
        clock.set(utc(2025, 3, 1, 9, 0));
        assert_eq!(clock.current_period().start, utc(2025, 3, 1, 0, 0));
    }
}
