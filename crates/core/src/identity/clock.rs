//! Time source for key freshness and token validity checks.

use std::fmt::Debug;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, Utc};

/// Source of the current time.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock with second precision, for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    unix_secs: AtomicI64,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            unix_secs: AtomicI64::new(start.timestamp()),
        }
    }

    /// Creates a clock frozen at a Unix timestamp.
    #[must_use]
    pub const fn at_unix(secs: i64) -> Self {
        Self {
            unix_secs: AtomicI64::new(secs),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        self.unix_secs.fetch_add(by.num_seconds(), Ordering::SeqCst);
    }

    /// Sets the clock to a Unix timestamp.
    pub fn set_unix(&self, secs: i64) {
        self.unix_secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.unix_secs.load(Ordering::SeqCst), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::at_unix(1_000);
        assert_eq!(clock.now().timestamp(), 1_000);

        clock.advance(Duration::seconds(301));
        assert_eq!(clock.now().timestamp(), 1_301);

        clock.set_unix(5);
        assert_eq!(clock.now().timestamp(), 5);
    }

    #[test]
    fn test_manual_clock_starts_at_given_instant() {
        let start = DateTime::from_timestamp(1_700_000_000, 999_000_000).unwrap();
        let clock = ManualClock::new(start);

        // Second precision
        assert_eq!(clock.now(), DateTime::from_timestamp(1_700_000_000, 0).unwrap());
    }

    #[test]
    fn test_system_clock_is_current() {
        let before = Utc::now();
        let now = SystemClock.now();
        assert!(now >= before);
    }
}
