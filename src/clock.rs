//! Wall-clock abstraction shared by the OTP engine, the attempt guard and the
//! counter cache.
//!
//! Production code uses [`SystemClock`]. Tests drive time explicitly through
//! [`ManualClock`] so window boundaries, block expiry and cache TTLs can be
//! exercised without sleeping.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, PoisonError};

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start the clock at `secs` seconds after the Unix epoch.
    #[must_use]
    pub fn at_unix(secs: i64) -> Self {
        Self::new(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Convert a configuration duration into a chrono delta, saturating at 100 years.
pub(crate) fn to_delta(duration: std::time::Duration) -> Duration {
    Duration::from_std(duration).unwrap_or_else(|_| Duration::days(365 * 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_only_when_told() {
        let clock = ManualClock::at_unix(1_000);
        assert_eq!(clock.now().timestamp(), 1_000);

        clock.advance(Duration::seconds(15));
        assert_eq!(clock.now().timestamp(), 1_015);

        clock.set(DateTime::from_timestamp(42, 0).unwrap_or_default());
        assert_eq!(clock.now().timestamp(), 42);
    }

    #[test]
    fn system_clock_is_close_to_utc_now() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }

    #[test]
    fn to_delta_saturates_huge_durations() {
        assert_eq!(
            to_delta(std::time::Duration::from_secs(90)),
            Duration::seconds(90)
        );
        assert_eq!(
            to_delta(std::time::Duration::MAX),
            Duration::days(365 * 100)
        );
    }
}
