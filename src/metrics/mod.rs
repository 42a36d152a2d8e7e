//! Metrics collection.
//!
//! This module provides:
//! - [`CostSample`]: the cost of producing one value
//! - [`KeyMetrics`]: per-key counters, decayed failure rate, latency EMA/p95,
//!   cost history and a 24-hour access window
//! - [`MetricsStore`]: concurrent, bounded key to [`KeyMetrics`] mapping
//! - [`MetricsSnapshot`]: a consistent, serializable view of one key
//! - [`Timer`]: wall-clock latency measurement
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ttl_tuner::config::TunerConfig;
//! use ttl_tuner::metrics::MetricsStore;
//! use ttl_tuner::traits::RealTimeProvider;
//!
//! let store = MetricsStore::new(&TunerConfig::default(), Arc::new(RealTimeProvider));
//! let metrics = store.get_or_create("product:17");
//! metrics.record_miss();
//! metrics.record_hit();
//! metrics.record_hit();
//!
//! let snapshot = metrics.snapshot();
//! assert_eq!(snapshot.total_accesses, 3);
//! assert!((snapshot.hit_rate - 0.666).abs() < 0.01);
//! ```

mod cost;
mod key_metrics;
mod ring;
mod store;
mod window;

pub use cost::CostSample;
pub use key_metrics::{
    KeyMetrics, COST_SAMPLE_CAPACITY, FAILURE_DECAY_PER_HOUR, FAILURE_INCREMENT,
    LATENCY_EMA_ALPHA, LATENCY_SAMPLE_CAPACITY,
};
pub use ring::RingBuffer;
pub use store::{CleanupReport, MetricsStore};
pub use window::{AccessWindow, WINDOW_HOURS};

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time statistics for one key.
///
/// Produced by [`KeyMetrics::snapshot`] under a single lock, so every field
/// reflects the same instant. This is what tuning algorithms consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Cache key.
    pub key: String,
    /// Number of hits.
    pub hit_count: u64,
    /// Number of misses.
    pub miss_count: u64,
    /// Hits plus misses.
    pub total_accesses: u64,
    /// Number of recorded failures.
    pub failure_count: u64,
    /// Hit rate (0.0-1.0).
    pub hit_rate: f64,
    /// Decayed failure rate (0.0-1.0).
    pub failure_rate: f64,
    /// Average accesses per hour over the last 24 hours.
    pub access_frequency_per_hour: f64,
    /// Factory latency EMA in milliseconds.
    pub average_latency_ms: f64,
    /// 95th-percentile factory latency in milliseconds.
    pub p95_latency_ms: f64,
    /// Mean cost score.
    pub average_cost: f64,
    /// Most recent cost score.
    pub current_cost: f64,
    /// TTL currently in effect.
    pub current_ttl: Duration,
    /// When the key was first tracked.
    pub first_seen: DateTime<Utc>,
    /// Time of the last hit or miss.
    pub last_access: DateTime<Utc>,
    /// When this snapshot was taken.
    pub captured_at: DateTime<Utc>,
}

/// Timer for measuring operation latency.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Elapsed time in fractional milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::traits::RealTimeProvider;
    use std::sync::Arc;

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed() >= Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_timer_default() {
        let timer = Timer::default();
        assert!(timer.elapsed_ms() < 1000.0);
    }

    #[test]
    fn test_snapshot_serialize() {
        let metrics = KeyMetrics::new("k", Duration::from_secs(60), Arc::new(RealTimeProvider));
        metrics.record_hit();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"key\":\"k\""));
        assert!(json.contains("\"hit_count\":1"));

        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hit_count, 1);
        assert_eq!(back.current_ttl, Duration::from_secs(60));
    }
}
