//! Test fixtures.
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::metrics::MetricsSnapshot;

/// Fixed instant used by fixtures.
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// Build a snapshot with `total_accesses` split according to `hit_rate`.
///
/// Everything else is neutral for the adaptive factors: 5 accesses per hour,
/// an average cost of 1.0 and a current TTL of 300 seconds.
pub fn snapshot(key: &str, total_accesses: u64, hit_rate: f64) -> MetricsSnapshot {
    let hit_count = (total_accesses as f64 * hit_rate).round() as u64;
    let now = fixed_time();
    MetricsSnapshot {
        key: key.to_owned(),
        hit_count,
        miss_count: total_accesses - hit_count,
        total_accesses,
        failure_count: 0,
        hit_rate,
        failure_rate: 0.0,
        access_frequency_per_hour: 5.0,
        average_latency_ms: 0.0,
        p95_latency_ms: 0.0,
        average_cost: 1.0,
        current_cost: 1.0,
        current_ttl: Duration::from_secs(300),
        first_seen: now,
        last_access: now,
        captured_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_fixture() {
        let s = snapshot("k", 10, 0.7);
        assert_eq!(s.hit_count, 7);
        assert_eq!(s.miss_count, 3);
        assert_eq!(s.total_accesses, 10);
        assert_eq!(s.key, "k");
    }
}
