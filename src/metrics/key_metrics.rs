//! Per-key statistics aggregator.
//!
//! One [`KeyMetrics`] exists per tracked cache key. Every field lives behind a
//! single mutex, so unrelated keys never contend with each other. Derived
//! statistics (hit rate, decayed failure rate, p95 latency, average cost,
//! access frequency) are computed on read from the stored counters and
//! buffers.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::cost::CostSample;
use super::ring::RingBuffer;
use super::window::AccessWindow;
use super::MetricsSnapshot;
use crate::traits::TimeProvider;

/// Failure-rate decay base, applied per hour since the last update.
pub const FAILURE_DECAY_PER_HOUR: f64 = 0.95;

/// Amount each failure adds to the decayed failure rate.
pub const FAILURE_INCREMENT: f64 = 0.1;

/// Smoothing factor for the factory latency EMA.
pub const LATENCY_EMA_ALPHA: f64 = 0.1;

/// Number of raw latencies kept for percentile computation.
pub const LATENCY_SAMPLE_CAPACITY: usize = 100;

/// Number of cost samples kept.
pub const COST_SAMPLE_CAPACITY: usize = 100;

const P95: f64 = 0.95;

#[derive(Debug)]
struct Inner {
    hit_count: u64,
    miss_count: u64,
    failure_count: u64,
    failure_rate: f64,
    failure_rate_updated: DateTime<Utc>,
    last_access: DateTime<Utc>,
    latency_ema_ms: f64,
    latency_samples: RingBuffer<f64>,
    costs: RingBuffer<CostSample>,
    accesses: AccessWindow,
    current_ttl: Duration,
}

impl Inner {
    fn total_accesses(&self) -> u64 {
        self.hit_count + self.miss_count
    }

    #[allow(clippy::cast_precision_loss)]
    fn hit_rate(&self) -> f64 {
        let total = self.total_accesses();
        if total == 0 {
            0.0
        } else {
            self.hit_count as f64 / total as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn failure_rate_at(&self, now: DateTime<Utc>) -> f64 {
        let elapsed_ms = (now - self.failure_rate_updated).num_milliseconds().max(0);
        let hours = elapsed_ms as f64 / 3_600_000.0;
        (self.failure_rate * FAILURE_DECAY_PER_HOUR.powf(hours)).clamp(0.0, 1.0)
    }

    fn p95_latency_ms(&self) -> f64 {
        let mut sorted: Vec<f64> = self.latency_samples.iter().copied().collect();
        if sorted.is_empty() {
            return 0.0;
        }
        sorted.sort_by(f64::total_cmp);
        sorted[nearest_rank_index(sorted.len(), P95)]
    }

    #[allow(clippy::cast_precision_loss)]
    fn average_cost(&self) -> f64 {
        if self.costs.is_empty() {
            return 0.0;
        }
        self.costs.iter().map(CostSample::score).sum::<f64>() / self.costs.len() as f64
    }

    fn current_cost(&self) -> f64 {
        self.costs.latest().map_or(0.0, CostSample::score)
    }
}

/// Nearest-rank index: `ceil(p * n) - 1`, clamped to `[0, n - 1]`.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn nearest_rank_index(n: usize, percentile: f64) -> usize {
    let rank = (percentile * n as f64).ceil() as usize;
    rank.saturating_sub(1).min(n.saturating_sub(1))
}

/// Thread-safe statistics for one cache key.
pub struct KeyMetrics {
    key: String,
    first_seen: DateTime<Utc>,
    clock: Arc<dyn TimeProvider>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for KeyMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMetrics")
            .field("key", &self.key)
            .field("first_seen", &self.first_seen)
            .field("inner", &*self.lock())
            .finish_non_exhaustive()
    }
}

impl KeyMetrics {
    /// Create a record for `key` with `initial_ttl` in effect.
    #[must_use]
    pub fn new(key: impl Into<String>, initial_ttl: Duration, clock: Arc<dyn TimeProvider>) -> Self {
        let now = clock.now();
        Self {
            key: key.into(),
            first_seen: now,
            clock,
            inner: Mutex::new(Inner {
                hit_count: 0,
                miss_count: 0,
                failure_count: 0,
                failure_rate: 0.0,
                failure_rate_updated: now,
                last_access: now,
                latency_ema_ms: 0.0,
                latency_samples: RingBuffer::with_capacity(LATENCY_SAMPLE_CAPACITY),
                costs: RingBuffer::with_capacity(COST_SAMPLE_CAPACITY),
                accesses: AccessWindow::new(),
                current_ttl: initial_ttl,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(key = %self.key, "KeyMetrics lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// The cache key this record tracks.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// When the record was created.
    #[must_use]
    pub const fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    /// Record a cache hit.
    pub fn record_hit(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.hit_count += 1;
        inner.last_access = now;
        inner.accesses.record(now);
    }

    /// Record a cache miss.
    pub fn record_miss(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.miss_count += 1;
        inner.last_access = now;
        inner.accesses.record(now);
    }

    /// Record a factory failure: decay the failure rate to now, then add 0.1 (capped at 1).
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        inner.failure_count += 1;
        let decayed = inner.failure_rate_at(now);
        inner.failure_rate = (decayed + FAILURE_INCREMENT).min(1.0);
        inner.failure_rate_updated = now;
    }

    /// Record one factory latency sample in milliseconds.
    ///
    /// The first sample seeds the EMA; later samples blend in at α = 0.1.
    pub fn record_factory_latency(&self, latency_ms: f64) {
        let mut inner = self.lock();
        inner.latency_ema_ms = if inner.latency_samples.is_empty() {
            latency_ms
        } else {
            LATENCY_EMA_ALPHA.mul_add(latency_ms, (1.0 - LATENCY_EMA_ALPHA) * inner.latency_ema_ms)
        };
        inner.latency_samples.push(latency_ms);
    }

    /// Record the cost of producing the value.
    pub fn record_cost(&self, sample: CostSample) {
        self.lock().costs.push(sample);
    }

    /// Average accesses per hour over the trailing 24 hours.
    #[must_use]
    pub fn access_frequency_per_hour(&self) -> f64 {
        let now = self.clock.now();
        self.lock().accesses.frequency_per_hour(now)
    }

    /// Number of hits.
    #[must_use]
    pub fn hit_count(&self) -> u64 {
        self.lock().hit_count
    }

    /// Number of misses.
    #[must_use]
    pub fn miss_count(&self) -> u64 {
        self.lock().miss_count
    }

    /// Hits plus misses.
    #[must_use]
    pub fn total_accesses(&self) -> u64 {
        self.lock().total_accesses()
    }

    /// Number of recorded failures.
    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.lock().failure_count
    }

    /// `hits / accesses`, or 0 with no accesses.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        self.lock().hit_rate()
    }

    /// Failure rate decayed to the current time.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let now = self.clock.now();
        self.lock().failure_rate_at(now)
    }

    /// Exponential moving average of factory latency.
    #[must_use]
    pub fn average_latency_ms(&self) -> f64 {
        self.lock().latency_ema_ms
    }

    /// 95th-percentile factory latency over the last 100 samples.
    #[must_use]
    pub fn p95_latency_ms(&self) -> f64 {
        self.lock().p95_latency_ms()
    }

    /// Mean cost score over the last 100 samples.
    #[must_use]
    pub fn average_cost(&self) -> f64 {
        self.lock().average_cost()
    }

    /// Cost score of the most recent sample.
    #[must_use]
    pub fn current_cost(&self) -> f64 {
        self.lock().current_cost()
    }

    /// Number of cost samples currently held.
    #[must_use]
    pub fn cost_sample_count(&self) -> usize {
        self.lock().costs.len()
    }

    /// Number of latency samples currently held.
    #[must_use]
    pub fn latency_sample_count(&self) -> usize {
        self.lock().latency_samples.len()
    }

    /// Time of the last hit or miss.
    #[must_use]
    pub fn last_access(&self) -> DateTime<Utc> {
        self.lock().last_access
    }

    /// TTL currently in effect.
    #[must_use]
    pub fn current_ttl(&self) -> Duration {
        self.lock().current_ttl
    }

    /// Replace the TTL currently in effect.
    pub fn set_current_ttl(&self, ttl: Duration) {
        self.lock().current_ttl = ttl;
    }

    /// Consistent view of every statistic, taken under one lock.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = self.clock.now();
        let inner = self.lock();
        MetricsSnapshot {
            key: self.key.clone(),
            hit_count: inner.hit_count,
            miss_count: inner.miss_count,
            total_accesses: inner.total_accesses(),
            failure_count: inner.failure_count,
            hit_rate: inner.hit_rate(),
            failure_rate: inner.failure_rate_at(now),
            access_frequency_per_hour: inner.accesses.frequency_per_hour(now),
            average_latency_ms: inner.latency_ema_ms,
            p95_latency_ms: inner.p95_latency_ms(),
            average_cost: inner.average_cost(),
            current_cost: inner.current_cost(),
            current_ttl: inner.current_ttl,
            first_seen: self.first_seen,
            last_access: inner.last_access,
            captured_at: now,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::traits::{ManualClock, RealTimeProvider};
    use chrono::Duration as ChronoDuration;
    use static_assertions::assert_impl_all;

    assert_impl_all!(KeyMetrics: Send, Sync);

    fn metrics_with_clock() -> (KeyMetrics, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let metrics = KeyMetrics::new("user:42", Duration::from_secs(300), clock.clone());
        (metrics, clock)
    }

    #[test]
    fn test_new_record() {
        let (metrics, clock) = metrics_with_clock();
        assert_eq!(metrics.key(), "user:42");
        assert_eq!(metrics.total_accesses(), 0);
        assert_eq!(metrics.hit_rate(), 0.0);
        assert_eq!(metrics.failure_rate(), 0.0);
        assert_eq!(metrics.current_ttl(), Duration::from_secs(300));
        assert_eq!(metrics.first_seen(), clock.now());
        assert_eq!(metrics.last_access(), clock.now());
    }

    #[test]
    fn test_one_miss_nine_hits() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.record_miss();
        for _ in 0..9 {
            metrics.record_hit();
        }
        assert_eq!(metrics.hit_count(), 9);
        assert_eq!(metrics.miss_count(), 1);
        assert_eq!(metrics.total_accesses(), 10);
        assert_eq!(metrics.hit_rate(), 0.9);
    }

    #[test]
    fn test_last_access_updates() {
        let (metrics, clock) = metrics_with_clock();
        clock.advance(ChronoDuration::minutes(3));
        metrics.record_hit();
        assert_eq!(metrics.last_access(), clock.now());
        assert!(metrics.last_access() > metrics.first_seen());
    }

    #[test]
    fn test_failure_rate_increment_and_cap() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.record_failure();
        assert!((metrics.failure_rate() - 0.1).abs() < 1e-9);
        for _ in 0..20 {
            metrics.record_failure();
        }
        assert_eq!(metrics.failure_rate(), 1.0);
        assert_eq!(metrics.failure_count(), 21);
    }

    #[test]
    fn test_failure_rate_decays_hourly() {
        let (metrics, clock) = metrics_with_clock();
        for _ in 0..5 {
            metrics.record_failure();
        }
        let before = metrics.failure_rate();
        assert!((before - 0.5).abs() < 1e-9);

        clock.advance(ChronoDuration::hours(2));
        let after = metrics.failure_rate();
        assert!((after - 0.5 * 0.95 * 0.95).abs() < 1e-9);

        // Next failure decays first, then adds.
        metrics.record_failure();
        assert!((metrics.failure_rate() - (after + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_latency_ema_seeding_and_blending() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.record_factory_latency(100.0);
        assert_eq!(metrics.average_latency_ms(), 100.0);
        metrics.record_factory_latency(200.0);
        assert!((metrics.average_latency_ms() - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_p95_nearest_rank() {
        let (metrics, _clock) = metrics_with_clock();
        for i in 1..=100 {
            metrics.record_factory_latency(f64::from(i));
        }
        // ceil(0.95 * 100) - 1 = 94 -> value 95
        assert_eq!(metrics.p95_latency_ms(), 95.0);
    }

    #[test]
    fn test_p95_small_sample() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.record_factory_latency(7.0);
        assert_eq!(metrics.p95_latency_ms(), 7.0);
        metrics.record_factory_latency(3.0);
        // ceil(1.9) - 1 = 1 -> max of two
        assert_eq!(metrics.p95_latency_ms(), 7.0);
    }

    #[test]
    fn test_latency_window_bounded() {
        let (metrics, _clock) = metrics_with_clock();
        for i in 0..250 {
            metrics.record_factory_latency(f64::from(i));
        }
        assert_eq!(metrics.latency_sample_count(), LATENCY_SAMPLE_CAPACITY);
        // Window holds 150..=249
        assert_eq!(metrics.p95_latency_ms(), 244.0);
    }

    #[test]
    fn test_cost_buffer() {
        let (metrics, _clock) = metrics_with_clock();
        assert_eq!(metrics.average_cost(), 0.0);
        assert_eq!(metrics.current_cost(), 0.0);

        metrics.record_cost(CostSample::new(Duration::from_secs(1), 0, 0.0));
        metrics.record_cost(CostSample::new(Duration::from_secs(3), 0, 0.0));
        assert!((metrics.average_cost() - 2.0).abs() < 1e-9);
        assert!((metrics.current_cost() - 3.0).abs() < 1e-9);

        for _ in 0..200 {
            metrics.record_cost(CostSample::new(Duration::ZERO, 0, 1.0));
        }
        assert_eq!(metrics.cost_sample_count(), COST_SAMPLE_CAPACITY);
        assert!((metrics.average_cost() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_access_frequency() {
        let (metrics, clock) = metrics_with_clock();
        for _ in 0..48 {
            metrics.record_hit();
            clock.advance(ChronoDuration::minutes(5));
        }
        assert!((metrics.access_frequency_per_hour() - 2.0).abs() < 1e-9);

        clock.advance(ChronoDuration::hours(25));
        assert_eq!(metrics.access_frequency_per_hour(), 0.0);
        // Counters are unaffected by window expiry.
        assert_eq!(metrics.total_accesses(), 48);
    }

    #[test]
    fn test_current_ttl_setter() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.set_current_ttl(Duration::from_secs(900));
        assert_eq!(metrics.current_ttl(), Duration::from_secs(900));
    }

    #[test]
    fn test_snapshot_consistency() {
        let (metrics, _clock) = metrics_with_clock();
        metrics.record_miss();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_failure();
        metrics.record_factory_latency(50.0);
        metrics.record_cost(CostSample::new(Duration::from_millis(500), 0, 0.0));

        let snap = metrics.snapshot();
        assert_eq!(snap.key, "user:42");
        assert_eq!(snap.hit_count, 2);
        assert_eq!(snap.miss_count, 1);
        assert_eq!(snap.total_accesses, 3);
        assert_eq!(snap.failure_count, 1);
        assert!((snap.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((snap.failure_rate - 0.1).abs() < 1e-9);
        assert_eq!(snap.average_latency_ms, 50.0);
        assert_eq!(snap.p95_latency_ms, 50.0);
        assert!((snap.average_cost - 0.5).abs() < 1e-9);
        assert!((snap.access_frequency_per_hour - 3.0 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_concurrent_updates() {
        let metrics = Arc::new(KeyMetrics::new(
            "hot",
            Duration::from_secs(60),
            Arc::new(RealTimeProvider),
        ));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for i in 0..1_000 {
                        if (i + t) % 4 == 0 {
                            metrics.record_miss();
                        } else {
                            metrics.record_hit();
                        }
                        metrics.record_factory_latency(f64::from(i));
                        let rate = metrics.hit_rate();
                        assert!((0.0..=1.0).contains(&rate));
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(metrics.total_accesses(), 8_000);
        assert_eq!(metrics.hit_count() + metrics.miss_count(), 8_000);
        assert_eq!(metrics.latency_sample_count(), LATENCY_SAMPLE_CAPACITY);
    }
}
