//! Trait definitions for injectable dependencies.
//!
//! This module defines:
//! - [`TimeProvider`]: Wall-clock abstraction used by every time-dependent statistic
//! - [`RealTimeProvider`]: Production clock
//! - [`ManualClock`]: Settable clock for deterministic tests and simulations
//!
//! # Mocking
//!
//! [`TimeProvider`] is annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates `MockTimeProvider` for unit tests.
//!
//! # Example
//!
//! ```
//! use chrono::Duration;
//! use ttl_tuner::traits::{ManualClock, TimeProvider};
//!
//! let clock = ManualClock::default();
//! let start = clock.now();
//! clock.advance(Duration::hours(2));
//! assert_eq!(clock.now() - start, Duration::hours(2));
//! ```

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};

/// Time provider trait for deterministic testing.
///
/// This trait abstracts time operations to allow for
/// deterministic testing by providing fixed timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time provider using system clock.
///
/// This is the production implementation that returns the actual current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Useful for exercising decay, retention and sliding-window behavior
/// without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl TimeProvider for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(RealTimeProvider: Send, Sync, Clone, Copy, Default);
    assert_impl_all!(ManualClock: Send, Sync);

    #[test]
    fn test_real_time_provider_now() {
        let provider = RealTimeProvider;
        let before = Utc::now();
        let now = provider.now();
        let after = Utc::now();
        assert!(now >= before);
        assert!(now <= after);
    }

    #[test]
    fn test_manual_clock_is_frozen() {
        let clock = ManualClock::default();
        let first = clock.now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert_eq!(clock.now(), first);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);

        clock.advance(Duration::minutes(90));
        assert_eq!(clock.now(), start + Duration::minutes(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_mock_time_provider() {
        let fixed = Utc::now();
        let mut mock = MockTimeProvider::new();
        mock.expect_now().times(2).returning(move || fixed);

        assert_eq!(mock.now(), fixed);
        assert_eq!(mock.now(), fixed);
    }
}
