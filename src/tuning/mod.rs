//! TTL tuning algorithms.
//!
//! A [`TuningAlgorithm`] turns a [`MetricsSnapshot`] plus the active
//! [`TunerConfig`] into a recommended TTL. Two variants ship with the crate:
//!
//! - [`AdaptiveAlgorithm`]: deterministic, stateless heuristic combining
//!   hit-rate, access-frequency and cost factors multiplicatively.
//! - [`ReinforcementLearningAlgorithm`]: epsilon-greedy single-step
//!   Q-learning with per-key [`LearningState`] and an owned, seedable RNG.
//!
//! Both apply the same cold-start guard and clamp every result to
//! `[min_ttl, max_ttl]`.

mod adaptive;
mod reinforcement;

pub use adaptive::AdaptiveAlgorithm;
pub use reinforcement::{
    LearningState, ReinforcementLearningAlgorithm, DEFAULT_EXPLORATION_RATE,
    DEFAULT_LEARNING_RATE, EXPLORATION_DECAY, INITIAL_Q_VALUE, MIN_EXPLORATION_RATE,
};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{AlgorithmKind, TunerConfig};
use crate::error::AlgorithmError;
use crate::metrics::MetricsSnapshot;

/// Read-only view of an algorithm's learning state for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSnapshot {
    /// Current Q-value estimate.
    pub q_value: f64,
    /// Reward computed on the last adjustment.
    pub last_reward: f64,
    /// Current exploration probability.
    pub exploration_rate: f64,
    /// Number of tuned recommendations made for this key.
    pub adjustment_count: u64,
    /// Last TTL recommended for this key.
    pub last_recommendation: Duration,
}

/// A strategy that recommends a TTL for one key.
///
/// Implementations must be cheap to call concurrently; any per-key state is
/// theirs to guard.
#[cfg_attr(test, mockall::automock)]
pub trait TuningAlgorithm: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Recommend a TTL for the key described by `metrics`.
    ///
    /// # Errors
    ///
    /// Returns [`AlgorithmError`] if no sensible TTL can be computed. The
    /// engine logs the error and reports "no recommendation".
    fn recommend(
        &self,
        metrics: &MetricsSnapshot,
        config: &TunerConfig,
    ) -> Result<Duration, AlgorithmError>;

    /// Drop any state held for `key`. Called when the key is evicted.
    fn forget(&self, _key: &str) {}

    /// Learning diagnostics for `key`, if the algorithm keeps any.
    fn learning_snapshot(&self, _key: &str) -> Option<LearningSnapshot> {
        None
    }
}

/// Build the algorithm selected by `config.algorithm`.
#[must_use]
pub fn build_algorithm(config: &TunerConfig) -> Arc<dyn TuningAlgorithm> {
    match config.algorithm {
        AlgorithmKind::Adaptive => Arc::new(AdaptiveAlgorithm::new()),
        AlgorithmKind::ReinforcementLearning => Arc::new(config.rl_seed.map_or_else(
            ReinforcementLearningAlgorithm::new,
            ReinforcementLearningAlgorithm::with_seed,
        )),
    }
}

/// True while a key has too few accesses to be tuned.
#[must_use]
pub const fn is_cold(metrics: &MetricsSnapshot, config: &TunerConfig) -> bool {
    metrics.total_accesses < config.min_accesses_for_tuning
}

/// Convert a raw TTL in seconds to a [`Duration`] clamped to `[min_ttl, max_ttl]`.
///
/// When `min_ttl > max_ttl`, `max_ttl` wins.
///
/// # Errors
///
/// Returns [`AlgorithmError::NonFiniteTtl`] for NaN or infinite input.
pub fn clamp_ttl(key: &str, secs: f64, config: &TunerConfig) -> Result<Duration, AlgorithmError> {
    if !secs.is_finite() {
        return Err(AlgorithmError::NonFiniteTtl {
            key: key.to_owned(),
            value: secs,
        });
    }
    let ttl = Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX);
    Ok(ttl.max(config.min_ttl).min(config.max_ttl))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_within_bounds() {
        let config = TunerConfig::default();
        assert_eq!(clamp_ttl("k", 600.0, &config).unwrap(), Duration::from_secs(600));
    }

    #[test]
    fn test_clamp_low_and_high() {
        let config = TunerConfig::default();
        assert_eq!(clamp_ttl("k", 1.0, &config).unwrap(), config.min_ttl);
        assert_eq!(clamp_ttl("k", -50.0, &config).unwrap(), config.min_ttl);
        assert_eq!(clamp_ttl("k", 1e12, &config).unwrap(), config.max_ttl);
        assert_eq!(clamp_ttl("k", 1e300, &config).unwrap(), config.max_ttl);
    }

    #[test]
    fn test_clamp_rejects_non_finite() {
        let config = TunerConfig::default();
        assert!(matches!(
            clamp_ttl("k", f64::NAN, &config),
            Err(AlgorithmError::NonFiniteTtl { .. })
        ));
        assert!(clamp_ttl("k", f64::INFINITY, &config).is_err());
    }

    #[test]
    fn test_clamp_inverted_bounds_max_wins() {
        let config = TunerConfig {
            min_ttl: Duration::from_secs(500),
            max_ttl: Duration::from_secs(100),
            ..TunerConfig::default()
        };
        assert_eq!(clamp_ttl("k", 300.0, &config).unwrap(), Duration::from_secs(100));
    }

    #[test]
    fn test_build_algorithm_selects_variant() {
        let adaptive = build_algorithm(&TunerConfig::default());
        assert_eq!(adaptive.name(), "adaptive");

        let rl = build_algorithm(&TunerConfig {
            algorithm: AlgorithmKind::ReinforcementLearning,
            rl_seed: Some(7),
            ..TunerConfig::default()
        });
        assert_eq!(rl.name(), "reinforcement_learning");
    }
}
