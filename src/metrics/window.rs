//! Sliding access-recency window.
//!
//! Accesses are counted in one-minute buckets covering the last 24 hours,
//! so memory stays bounded at 1441 buckets no matter how hot a key is.
//! A bucket stays in the window while any part of its minute is newer than
//! `now - 24h`, so the trailing edge may include up to one extra minute of
//! accesses but never drops recent ones.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};

/// Length of the recency window in hours.
pub const WINDOW_HOURS: i64 = 24;

const BUCKET_SECS: i64 = 60;
const MAX_BUCKETS: usize = (WINDOW_HOURS * 60 + 1) as usize;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    /// Unix minute (seconds / 60).
    minute: i64,
    count: u64,
}

impl Bucket {
    /// First instant after the bucket's minute.
    fn end(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp((self.minute + 1) * BUCKET_SECS, 0)
    }
}

/// Minute-bucketed log of access timestamps for the last 24 hours.
#[derive(Debug, Clone, Default)]
pub struct AccessWindow {
    buckets: VecDeque<Bucket>,
}

impl AccessWindow {
    /// Create an empty window.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one access at `now`, pruning expired buckets first.
    pub fn record(&mut self, now: DateTime<Utc>) {
        self.prune(now);

        let minute = now.timestamp().div_euclid(BUCKET_SECS);
        match self.buckets.back_mut() {
            // Clock skew backwards lands in the newest bucket.
            Some(last) if minute <= last.minute => last.count += 1,
            _ => self.buckets.push_back(Bucket { minute, count: 1 }),
        }

        while self.buckets.len() > MAX_BUCKETS {
            self.buckets.pop_front();
        }
    }

    /// Drop buckets whose whole minute precedes `now - 24h`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = window_start(now);
        while self
            .buckets
            .front()
            .and_then(Bucket::end)
            .is_some_and(|end| end <= cutoff)
        {
            self.buckets.pop_front();
        }
    }

    /// Number of accesses in buckets overlapping `(now - 24h, now]`. Does not mutate.
    #[must_use]
    pub fn count_since_window_start(&self, now: DateTime<Utc>) -> u64 {
        let cutoff = window_start(now);
        self.buckets
            .iter()
            .filter(|b| b.end().is_some_and(|end| end > cutoff))
            .map(|b| b.count)
            .sum()
    }

    /// Average accesses per hour over the window.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frequency_per_hour(&self, now: DateTime<Utc>) -> f64 {
        self.count_since_window_start(now) as f64 / WINDOW_HOURS as f64
    }

    /// Number of live buckets (for capacity checks).
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

fn window_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(WINDOW_HOURS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-01T12:00:30Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_counts_within_window() {
        let mut window = AccessWindow::new();
        for i in 0..48 {
            window.record(t0() + Duration::minutes(i * 10));
        }
        let now = t0() + Duration::minutes(480);
        assert_eq!(window.count_since_window_start(now), 48);
        assert_eq!(window.frequency_per_hour(now), 2.0);
    }

    #[test]
    fn test_same_minute_shares_bucket() {
        let mut window = AccessWindow::new();
        window.record(t0());
        window.record(t0() + Duration::seconds(10));
        window.record(t0() + Duration::seconds(20));
        assert_eq!(window.bucket_count(), 1);
        assert_eq!(window.count_since_window_start(t0()), 3);
    }

    #[test]
    fn test_old_accesses_expire_on_read() {
        let mut window = AccessWindow::new();
        window.record(t0());
        let later = t0() + Duration::hours(25);
        assert_eq!(window.count_since_window_start(later), 0);
        // Read did not prune.
        assert_eq!(window.bucket_count(), 1);
    }

    #[test]
    fn test_bucket_straddling_cutoff_is_counted() {
        let mut window = AccessWindow::new();
        // Access at 12:00:30; cutoff at 12:00:10 the next day falls inside its minute.
        window.record(t0());
        let now = t0() + Duration::hours(24) - Duration::seconds(20);
        assert_eq!(window.count_since_window_start(now), 1);

        window.prune(now);
        assert_eq!(window.bucket_count(), 1);

        // Once the whole minute is older than the cutoff it drops out.
        let later = t0() + Duration::hours(24) + Duration::seconds(30);
        assert_eq!(window.count_since_window_start(later), 0);
        window.prune(later);
        assert_eq!(window.bucket_count(), 0);
    }

    #[test]
    fn test_prune_on_record() {
        let mut window = AccessWindow::new();
        window.record(t0());
        window.record(t0() + Duration::hours(25));
        assert_eq!(window.bucket_count(), 1);
        assert_eq!(window.count_since_window_start(t0() + Duration::hours(25)), 1);
    }

    #[test]
    fn test_bounded_bucket_count() {
        let mut window = AccessWindow::new();
        for i in 0..3_000 {
            window.record(t0() + Duration::minutes(i));
            assert!(window.bucket_count() <= MAX_BUCKETS);
        }
    }

    #[test]
    fn test_backwards_clock_does_not_panic() {
        let mut window = AccessWindow::new();
        window.record(t0());
        window.record(t0() - Duration::minutes(5));
        assert_eq!(window.count_since_window_start(t0()), 2);
    }
}
