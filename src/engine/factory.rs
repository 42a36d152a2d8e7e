//! Cost-tracking wrapper around a cache-miss factory.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use super::TuningEngine;
use crate::metrics::{CostSample, Timer};

/// Entry options handed to a wrapped factory.
///
/// `duration` starts as whatever the host cache would have used and is
/// replaced by the engine's recommendation when one is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryContext {
    /// Cache key being filled.
    pub key: String,
    /// Expiry to apply to the produced entry.
    pub duration: Duration,
}

impl FactoryContext {
    /// Create a context with the host's default expiry.
    #[must_use]
    pub fn new(key: impl Into<String>, duration: Duration) -> Self {
        Self {
            key: key.into(),
            duration,
        }
    }
}

/// Footprint used by [`TuningEngine::wrap`]: the value's inline size only.
///
/// Heap data owned by the value is not counted; use
/// [`TuningEngine::wrap_with_size`] to report it.
pub(super) fn shallow_size<T>(value: &T) -> u64 {
    u64::try_from(std::mem::size_of_val(value)).unwrap_or(u64::MAX)
}

/// A factory wrapped by [`TuningEngine::wrap`] or [`TuningEngine::wrap_with_size`].
///
/// Calling it applies the recommended TTL to the context, runs the inner
/// factory, and on success records a [`CostSample`] whose memory figure comes
/// from the sizer `S`. Errors are logged and returned unchanged. If the
/// returned future is dropped before completion, nothing is recorded.
///
/// Latency and failure counts are left to the host's
/// [`CacheObserver`](super::CacheObserver) notifications so that each factory
/// run is counted once.
#[must_use = "a wrapped factory does nothing until called"]
pub struct TrackedFactory<F, S> {
    engine: TuningEngine,
    key: String,
    factory: F,
    sizer: S,
}

impl<F, S> std::fmt::Debug for TrackedFactory<F, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedFactory")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<F, S> TrackedFactory<F, S> {
    pub(super) const fn new(engine: TuningEngine, key: String, factory: F, sizer: S) -> Self {
        Self {
            engine,
            key,
            factory,
            sizer,
        }
    }

    /// Key this factory fills.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the wrapped factory.
    ///
    /// # Errors
    ///
    /// Returns the inner factory's error as-is.
    pub async fn call<Fut, T, E>(self, mut ctx: FactoryContext) -> Result<T, E>
    where
        F: FnOnce(FactoryContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        S: FnOnce(&T) -> u64,
    {
        let Self {
            engine,
            key,
            factory,
            sizer,
        } = self;

        if let Some(ttl) = engine.apply_recommendation(&key) {
            ctx.duration = ttl;
        }

        let timer = Timer::start();
        let result = factory(ctx).await;
        let elapsed = timer.elapsed();

        match &result {
            Ok(value) => {
                let memory_bytes = sizer(value);
                engine.record_cost(&key, CostSample::new(elapsed, memory_bytes, 0.0));
            }
            Err(e) => {
                tracing::warn!(
                    key = %key,
                    error = %e,
                    elapsed_ms = timer.elapsed_ms(),
                    "Wrapped factory failed"
                );
            }
        }

        result
    }
}
