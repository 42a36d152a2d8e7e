//! Tuning engine.
//!
//! [`TuningEngine`] binds a [`MetricsStore`], a [`TuningAlgorithm`] and a
//! [`TunerConfig`]. Host caches feed it hits, misses and factory outcomes
//! (directly or through [`CacheObserver`]) and ask it for a recommended TTL
//! per key. [`TuningEngine::wrap`] and [`TuningEngine::wrap_with_size`] layer
//! TTL application and cost capture around a cache-miss factory.
//!
//! The engine is a cheap [`Clone`] handle; every clone shares the same state.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped ──start()──▶ Started ──stop()──▶ Stopped
//! ```
//!
//! While started, a background task runs periodic cleanup and drains events
//! queued through the [`EventSender`] returned by [`TuningEngine::start`].
//! Direct calls work in either state.
//!
//! # Example
//!
//! ```
//! use ttl_tuner::config::TunerConfig;
//! use ttl_tuner::engine::TuningEngine;
//!
//! let engine = TuningEngine::new(TunerConfig::default());
//! engine.on_miss("user:1");
//! for _ in 0..19 {
//!     engine.on_hit("user:1");
//! }
//!
//! let ttl = engine.get_recommended_ttl("user:1").unwrap();
//! assert!(ttl >= engine.config().min_ttl && ttl <= engine.config().max_ttl);
//! ```

mod events;
mod factory;
mod manager;

pub use events::{CacheEvent, CacheObserver, EventSender};
pub use factory::{FactoryContext, TrackedFactory};

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::TunerConfig;
use crate::error::{LifecycleError, TunerError};
use crate::metrics::{CleanupReport, CostSample, MetricsSnapshot, MetricsStore};
use crate::traits::{RealTimeProvider, TimeProvider};
use crate::tuning::{build_algorithm, LearningSnapshot, TuningAlgorithm};

use factory::shallow_size;
use manager::Background;

/// Engine-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Keys currently tracked.
    pub tracked_keys: usize,
    /// Hits recorded.
    pub hits: u64,
    /// Misses recorded.
    pub misses: u64,
    /// Recommendations returned.
    pub recommendations_issued: u64,
    /// Recommendations that failed and were reported as `None`.
    pub recommendations_failed: u64,
    /// Completed cleanup cycles.
    pub cleanup_runs: u64,
    /// Keys removed by cleanup.
    pub keys_evicted: u64,
    /// Whether the background task is running.
    pub running: bool,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    recommendations_issued: AtomicU64,
    recommendations_failed: AtomicU64,
    cleanup_runs: AtomicU64,
    keys_evicted: AtomicU64,
}

struct Inner {
    config: TunerConfig,
    store: MetricsStore,
    algorithm: Arc<dyn TuningAlgorithm>,
    counters: Counters,
    cleanup_lock: Mutex<()>,
    background: Mutex<Option<Background>>,
}

/// Per-key TTL tuner.
#[derive(Clone)]
pub struct TuningEngine {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for TuningEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningEngine")
            .field("algorithm", &self.inner.algorithm.name())
            .field("tracked_keys", &self.inner.store.len())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl TuningEngine {
    /// Create an engine using the algorithm selected in `config`.
    #[must_use]
    pub fn new(config: TunerConfig) -> Self {
        let algorithm = build_algorithm(&config);
        Self::with_algorithm(config, algorithm)
    }

    /// Create an engine with a custom algorithm.
    #[must_use]
    pub fn with_algorithm(config: TunerConfig, algorithm: Arc<dyn TuningAlgorithm>) -> Self {
        Self::with_clock(config, algorithm, Arc::new(RealTimeProvider))
    }

    /// Create an engine with a custom algorithm and clock.
    #[must_use]
    pub fn with_clock(
        config: TunerConfig,
        algorithm: Arc<dyn TuningAlgorithm>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        let store = MetricsStore::new(&config, clock);
        tracing::debug!(
            algorithm = algorithm.name(),
            auto_tuning = config.enable_auto_tuning,
            cost_awareness = config.enable_cost_awareness,
            "Tuning engine created"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                algorithm,
                counters: Counters::default(),
                cleanup_lock: Mutex::new(()),
                background: Mutex::new(None),
            }),
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &TunerConfig {
        &self.inner.config
    }

    /// Name of the active algorithm.
    #[must_use]
    pub fn algorithm_name(&self) -> &'static str {
        self.inner.algorithm.name()
    }

    /// Underlying metrics store.
    #[must_use]
    pub fn metrics_store(&self) -> &MetricsStore {
        &self.inner.store
    }

    /// Record a cache hit for `key`.
    pub fn on_hit(&self, key: &str) {
        self.inner.store.get_or_create(key).record_hit();
        self.inner.counters.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a cache miss for `key`.
    pub fn on_miss(&self, key: &str) {
        self.inner.store.get_or_create(key).record_miss();
        self.inner.counters.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one factory execution for `key`.
    ///
    /// The latency always feeds the latency statistics; `failed` additionally
    /// bumps the failure count and decayed failure rate.
    pub fn on_factory_outcome(&self, key: &str, latency: Duration, failed: bool) {
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let metrics = self.inner.store.get_or_create(key);
        metrics.record_factory_latency(latency_ms);
        if failed {
            metrics.record_failure();
            tracing::debug!(key = %key, latency_ms, "Factory failure recorded");
        }
    }

    /// Record a cost sample for `key`. Does nothing when cost awareness is off.
    pub fn record_cost(&self, key: &str, sample: CostSample) {
        if !self.inner.config.enable_cost_awareness {
            return;
        }
        self.inner.store.get_or_create(key).record_cost(sample);
    }

    /// Apply a host cache notification.
    pub fn handle_event(&self, event: CacheEvent) {
        match event {
            CacheEvent::Hit { key } => self.on_hit(&key),
            CacheEvent::Miss { key } => self.on_miss(&key),
            CacheEvent::FactorySucceeded { key, elapsed } => {
                self.on_factory_outcome(&key, elapsed, false);
            }
            CacheEvent::FactoryFailed { key, elapsed }
            | CacheEvent::FactoryTimedOut { key, elapsed } => {
                self.on_factory_outcome(&key, elapsed, true);
            }
        }
    }

    /// Current statistics for `key`, if tracked.
    #[must_use]
    pub fn get_metrics(&self, key: &str) -> Option<MetricsSnapshot> {
        self.inner.store.get(key).map(|metrics| metrics.snapshot())
    }

    /// Recommended TTL for `key`.
    ///
    /// Returns `None` when auto tuning is disabled, the key is not tracked, or
    /// the algorithm fails. Failures are logged, never propagated.
    #[must_use]
    pub fn get_recommended_ttl(&self, key: &str) -> Option<Duration> {
        if !self.inner.config.enable_auto_tuning {
            return None;
        }
        let snapshot = self.get_metrics(key)?;

        match self.inner.algorithm.recommend(&snapshot, &self.inner.config) {
            Ok(ttl) => {
                self.inner
                    .counters
                    .recommendations_issued
                    .fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    key = %key,
                    algorithm = self.inner.algorithm.name(),
                    hit_rate = snapshot.hit_rate,
                    current_ttl_secs = snapshot.current_ttl.as_secs_f64(),
                    recommended_ttl_secs = ttl.as_secs_f64(),
                    "TTL recommended"
                );
                Some(ttl)
            }
            Err(e) => {
                self.inner
                    .counters
                    .recommendations_failed
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    key = %key,
                    algorithm = self.inner.algorithm.name(),
                    error = %e,
                    "TTL recommendation failed"
                );
                None
            }
        }
    }

    /// Compute a recommendation and make it the key's current TTL.
    pub fn apply_recommendation(&self, key: &str) -> Option<Duration> {
        let ttl = self.get_recommended_ttl(key)?;
        if let Some(metrics) = self.inner.store.get(key) {
            metrics.set_current_ttl(ttl);
        }
        Some(ttl)
    }

    /// Wrap a cache-miss factory for `key`.
    ///
    /// The memory figure recorded on success is the value's inline size
    /// (`size_of_val`), which ignores heap data such as a `Vec`'s buffer.
    /// Use [`wrap_with_size`](Self::wrap_with_size) for values that own heap
    /// memory. See [`TrackedFactory::call`].
    pub fn wrap<F, Fut, T, E>(
        &self,
        key: impl Into<String>,
        factory: F,
    ) -> TrackedFactory<F, fn(&T) -> u64>
    where
        F: FnOnce(FactoryContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        TrackedFactory::new(
            self.clone(),
            key.into(),
            factory,
            shallow_size::<T> as fn(&T) -> u64,
        )
    }

    /// Wrap a cache-miss factory with a caller-supplied footprint in bytes.
    ///
    /// `sizer` runs once on the produced value when the factory succeeds.
    pub fn wrap_with_size<F, Fut, T, E, S>(
        &self,
        key: impl Into<String>,
        factory: F,
        sizer: S,
    ) -> TrackedFactory<F, S>
    where
        F: FnOnce(FactoryContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        S: FnOnce(&T) -> u64,
    {
        TrackedFactory::new(self.clone(), key.into(), factory, sizer)
    }

    /// Learning diagnostics for `key`, if the algorithm keeps any.
    #[must_use]
    pub fn learning_snapshot(&self, key: &str) -> Option<LearningSnapshot> {
        self.inner.algorithm.learning_snapshot(key)
    }

    /// Run one cleanup cycle now.
    ///
    /// Returns `None` if another cleanup is already in progress.
    pub fn run_cleanup(&self) -> Option<CleanupReport> {
        let _guard = match self.inner.cleanup_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(poisoned)) => {
                tracing::warn!("Cleanup lock poisoned, recovering");
                poisoned.into_inner()
            }
            Err(TryLockError::WouldBlock) => {
                tracing::debug!("Cleanup already in progress, skipping");
                return None;
            }
        };

        let report = self.inner.store.cleanup();
        for key in &report.removed_keys {
            self.inner.algorithm.forget(key);
        }

        let counters = &self.inner.counters;
        counters.cleanup_runs.fetch_add(1, Ordering::Relaxed);
        counters.keys_evicted.fetch_add(
            u64::try_from(report.total_removed()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );

        if report.total_removed() > 0 {
            tracing::info!(
                stale_removed = report.stale_removed,
                capacity_removed = report.capacity_removed,
                remaining = report.remaining,
                "Metrics cleanup evicted keys"
            );
        } else {
            tracing::debug!(remaining = report.remaining, "Metrics cleanup found nothing to evict");
        }

        Some(report)
    }

    fn lock_background(&self) -> MutexGuard<'_, Option<Background>> {
        self.inner.background.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Lifecycle lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Start the background task.
    ///
    /// Returns a sender for queued host notifications.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyRunning`] if already started.
    /// - [`LifecycleError::NoRuntime`] if called outside a Tokio runtime.
    pub fn start(&self) -> Result<EventSender, TunerError> {
        let mut background = self.lock_background();
        if background.is_some() {
            return Err(LifecycleError::AlreadyRunning.into());
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?;

        let (tx, rx) = mpsc::channel(self.inner.config.event_channel_capacity.max(1));
        *background = Some(manager::spawn(
            &runtime,
            &self.inner,
            rx,
            self.inner.config.metrics_cleanup_interval,
        ));

        tracing::info!(
            algorithm = self.inner.algorithm.name(),
            cleanup_interval_secs = self.inner.config.metrics_cleanup_interval.as_secs(),
            "Tuning engine started"
        );
        Ok(EventSender::new(tx, self.clone()))
    }

    /// Stop the background task and wait for it to finish.
    ///
    /// Queued events are applied before the task exits. Does nothing when
    /// already stopped.
    pub async fn stop(&self) {
        let Some(background) = self.lock_background().take() else {
            return;
        };

        if background.shutdown_tx.send(true).is_err() {
            tracing::debug!("Background task already gone");
        }
        if let Err(e) = background.task.await {
            tracing::warn!(error = %e, "Background task ended abnormally");
        }
        tracing::info!("Tuning engine stopped");
    }

    /// Whether the background task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.lock_background().is_some()
    }

    /// Snapshot of engine-wide counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let counters = &self.inner.counters;
        EngineStats {
            tracked_keys: self.inner.store.len(),
            hits: counters.hits.load(Ordering::Relaxed),
            misses: counters.misses.load(Ordering::Relaxed),
            recommendations_issued: counters.recommendations_issued.load(Ordering::Relaxed),
            recommendations_failed: counters.recommendations_failed.load(Ordering::Relaxed),
            cleanup_runs: counters.cleanup_runs.load(Ordering::Relaxed),
            keys_evicted: counters.keys_evicted.load(Ordering::Relaxed),
            running: self.is_running(),
        }
    }
}
