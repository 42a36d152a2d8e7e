//! Concurrent key to metrics mapping with bounded cardinality.
//!
//! Lookups and inserts go through a sharded [`DashMap`], so the hot path never
//! takes a global lock. [`MetricsStore::cleanup`] is the only full scan and is
//! meant to run off the request path on a timer.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::KeyMetrics;
use crate::config::TunerConfig;
use crate::traits::TimeProvider;

/// Outcome of one cleanup cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    /// Records removed because their last access predates the retention period.
    pub stale_removed: usize,
    /// Records removed to get back under `max_tracked_entries`.
    pub capacity_removed: usize,
    /// Every key removed in this cycle.
    pub removed_keys: Vec<String>,
    /// Records left after cleanup.
    pub remaining: usize,
}

impl CleanupReport {
    /// Total records removed.
    #[must_use]
    pub fn total_removed(&self) -> usize {
        self.stale_removed + self.capacity_removed
    }
}

/// Store of [`KeyMetrics`] records.
pub struct MetricsStore {
    entries: DashMap<String, Arc<KeyMetrics>>,
    base_ttl: Duration,
    retention_period: Duration,
    max_tracked_entries: usize,
    clock: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for MetricsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsStore")
            .field("len", &self.entries.len())
            .field("base_ttl", &self.base_ttl)
            .field("retention_period", &self.retention_period)
            .field("max_tracked_entries", &self.max_tracked_entries)
            .finish_non_exhaustive()
    }
}

impl MetricsStore {
    /// Create an empty store using the sizing and retention settings from `config`.
    #[must_use]
    pub fn new(config: &TunerConfig, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            entries: DashMap::new(),
            base_ttl: config.base_ttl,
            retention_period: config.metrics_retention_period,
            max_tracked_entries: config.max_tracked_entries,
            clock,
        }
    }

    /// Get the record for `key`, creating it with the base TTL if absent.
    pub fn get_or_create(&self, key: &str) -> Arc<KeyMetrics> {
        if let Some(existing) = self.entries.get(key) {
            return Arc::clone(existing.value());
        }

        let entry = self.entries.entry(key.to_owned()).or_insert_with(|| {
            tracing::debug!(key = %key, "Tracking new cache key");
            Arc::new(KeyMetrics::new(key, self.base_ttl, Arc::clone(&self.clock)))
        });
        Arc::clone(entry.value())
    }

    /// Get the record for `key` if it exists.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<KeyMetrics>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Remove a single record.
    pub fn remove(&self, key: &str) -> Option<Arc<KeyMetrics>> {
        self.entries.remove(key).map(|(_, metrics)| metrics)
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tracked keys, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Two-phase cleanup.
    ///
    /// 1. Remove every record whose last access precedes `now - retention`.
    /// 2. If still above `max_tracked_entries`, remove the least recently
    ///    accessed records until at the cap.
    pub fn cleanup(&self) -> CleanupReport {
        let now = self.clock.now();
        let mut report = CleanupReport::default();

        if let Some(cutoff) = retention_cutoff(now, self.retention_period) {
            // Collect first; removing while iterating would deadlock on the shard.
            let stale: Vec<String> = self
                .entries
                .iter()
                .filter(|entry| entry.value().last_access() < cutoff)
                .map(|entry| entry.key().clone())
                .collect();

            for key in stale {
                // Re-check: the key may have been touched since the scan.
                if self
                    .entries
                    .remove_if(&key, |_, metrics| metrics.last_access() < cutoff)
                    .is_some()
                {
                    report.stale_removed += 1;
                    report.removed_keys.push(key);
                }
            }
        }

        let len = self.entries.len();
        if len > self.max_tracked_entries {
            let mut by_age: Vec<(String, DateTime<Utc>)> = self
                .entries
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().last_access()))
                .collect();
            by_age.sort_by_key(|(_, last_access)| *last_access);

            let excess = len - self.max_tracked_entries;
            for (key, _) in by_age.into_iter().take(excess) {
                if self.entries.remove(&key).is_some() {
                    report.capacity_removed += 1;
                    report.removed_keys.push(key);
                }
            }
        }

        report.remaining = self.entries.len();
        report
    }
}

fn retention_cutoff(now: DateTime<Utc>, retention: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(retention)
        .ok()
        .and_then(|retention| now.checked_sub_signed(retention))
}
