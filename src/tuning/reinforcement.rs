//! Reinforcement-learning TTL tuner.
//!
//! Each tuned call is one step of a single-state Q-learning loop:
//!
//! 1. reward = 0.6 * hit-rate reward + 0.3 * cost reward + 0.1 * frequency reward
//! 2. `Q += lr * (reward - Q)`
//! 3. epsilon-greedy action: explore with a random scale in `[0.5, 1.5]`,
//!    otherwise exploit `1 + (Q - 0.5) * 0.5` nudged by hit rate and cost
//! 4. epsilon decays by 0.995 per call down to 0.01
//!
//! Per-key state and the random source sit behind one mutex. Seed the RNG with
//! [`ReinforcementLearningAlgorithm::with_seed`] for reproducible runs; with
//! entropy seeding, identical inputs may yield different recommendations.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{clamp_ttl, is_cold, LearningSnapshot, TuningAlgorithm};
use crate::config::TunerConfig;
use crate::error::AlgorithmError;
use crate::metrics::MetricsSnapshot;

/// Starting exploration probability for a new key.
pub const DEFAULT_EXPLORATION_RATE: f64 = 0.1;

/// Fixed TD learning rate.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;

/// Floor for the exploration probability.
pub const MIN_EXPLORATION_RATE: f64 = 0.01;

/// Per-call multiplicative exploration decay.
pub const EXPLORATION_DECAY: f64 = 0.995;

/// Neutral starting Q-value (exploit factor of exactly 1.0).
pub const INITIAL_Q_VALUE: f64 = 0.5;

const HIT_RATE_WEIGHT: f64 = 0.6;
const COST_WEIGHT: f64 = 0.3;
const FREQUENCY_WEIGHT: f64 = 0.1;

/// Access frequency (per hour) that earns the full frequency reward.
const IDEAL_FREQUENCY_PER_HOUR: f64 = 5.0;

const EXPLORE_MIN_SCALE: f64 = 0.5;
const EXPLORE_MAX_SCALE: f64 = 1.5;

/// Learning state kept for one key.
#[derive(Debug, Clone, PartialEq)]
pub struct LearningState {
    /// Q-value estimate, conceptually in `[0, 1]` but not clamped.
    pub q_value: f64,
    /// Probability of exploring on the next call.
    pub exploration_rate: f64,
    /// TD learning rate.
    pub learning_rate: f64,
    /// Reward from the last call.
    pub last_reward: f64,
    /// TTL recommended on the last call.
    pub last_recommendation: Duration,
    /// Number of tuned calls.
    pub adjustment_count: u64,
}

impl Default for LearningState {
    fn default() -> Self {
        Self {
            q_value: INITIAL_Q_VALUE,
            exploration_rate: DEFAULT_EXPLORATION_RATE,
            learning_rate: DEFAULT_LEARNING_RATE,
            last_reward: 0.0,
            last_recommendation: Duration::ZERO,
            adjustment_count: 0,
        }
    }
}

impl From<&LearningState> for LearningSnapshot {
    fn from(state: &LearningState) -> Self {
        Self {
            q_value: state.q_value,
            last_reward: state.last_reward,
            exploration_rate: state.exploration_rate,
            adjustment_count: state.adjustment_count,
            last_recommendation: state.last_recommendation,
        }
    }
}

#[derive(Debug)]
struct Inner {
    states: HashMap<String, LearningState>,
    rng: StdRng,
}

/// Epsilon-greedy Q-learning tuner.
#[derive(Debug)]
pub struct ReinforcementLearningAlgorithm {
    inner: Mutex<Inner>,
}

impl ReinforcementLearningAlgorithm {
    /// Create a tuner seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Create a tuner with a fixed seed for reproducible recommendations.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(Inner {
                states: HashMap::new(),
                rng,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Learning state lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        })
    }

    /// Number of keys with learning state.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().states.len()
    }

    /// Weighted reward for the observed metrics.
    #[must_use]
    pub fn reward(metrics: &MetricsSnapshot, config: &TunerConfig) -> f64 {
        let target = config.target_hit_rate;
        let hit_reward = if target > 0.0 {
            (1.0 - (metrics.hit_rate - target).abs() / target).max(0.0)
        } else {
            1.0 - metrics.hit_rate
        };
        let cost_reward = 1.0 / metrics.average_cost.mul_add(0.1, 1.0);
        let frequency_reward = (1.0
            - (metrics.access_frequency_per_hour - IDEAL_FREQUENCY_PER_HOUR).abs()
                / IDEAL_FREQUENCY_PER_HOUR)
            .max(0.0);

        HIT_RATE_WEIGHT.mul_add(
            hit_reward,
            COST_WEIGHT.mul_add(cost_reward, FREQUENCY_WEIGHT * frequency_reward),
        )
    }

    /// Scale applied to the current TTL when exploiting.
    #[must_use]
    pub fn exploit_scale(q_value: f64, metrics: &MetricsSnapshot, config: &TunerConfig) -> f64 {
        let mut scale = (q_value - 0.5).mul_add(0.5, 1.0);
        scale *= if metrics.hit_rate > config.target_hit_rate {
            1.1
        } else {
            0.9
        };
        if metrics.average_cost > 1.0 {
            scale *= 1.05;
        }
        scale
    }
}

impl Default for ReinforcementLearningAlgorithm {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningAlgorithm for ReinforcementLearningAlgorithm {
    fn name(&self) -> &'static str {
        "reinforcement_learning"
    }

    fn recommend(
        &self,
        metrics: &MetricsSnapshot,
        config: &TunerConfig,
    ) -> Result<Duration, AlgorithmError> {
        if is_cold(metrics, config) {
            return Ok(config.base_ttl);
        }

        let reward = Self::reward(metrics, config);

        let mut guard = self.lock();
        let Inner { states, rng } = &mut *guard;
        let mut state = states.get(&metrics.key).cloned().unwrap_or_default();

        state.q_value += state.learning_rate * (reward - state.q_value);

        let explore = rng.gen::<f64>() < state.exploration_rate;
        let scale = if explore {
            rng.gen_range(EXPLORE_MIN_SCALE..=EXPLORE_MAX_SCALE)
        } else {
            Self::exploit_scale(state.q_value, metrics, config)
        };

        state.exploration_rate = (state.exploration_rate * EXPLORATION_DECAY).max(MIN_EXPLORATION_RATE);

        let ttl = clamp_ttl(&metrics.key, metrics.current_ttl.as_secs_f64() * scale, config)?;

        state.last_reward = reward;
        state.last_recommendation = ttl;
        state.adjustment_count += 1;

        tracing::trace!(
            key = %metrics.key,
            reward,
            q_value = state.q_value,
            explore,
            scale,
            exploration_rate = state.exploration_rate,
            "Reinforcement learning adjustment"
        );

        states.insert(metrics.key.clone(), state);
        Ok(ttl)
    }

    fn forget(&self, key: &str) {
        self.lock().states.remove(key);
    }

    fn learning_snapshot(&self, key: &str) -> Option<LearningSnapshot> {
        self.lock().states.get(key).map(LearningSnapshot::from)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::test_utils::snapshot;
    use static_assertions::assert_impl_all;

    assert_impl_all!(ReinforcementLearningAlgorithm: Send, Sync);

    #[test]
    fn test_cold_start_does_not_touch_state() {
        let algo = ReinforcementLearningAlgorithm::with_seed(1);
        let config = TunerConfig::default();
        let metrics = snapshot("k", 3, 1.0);

        assert_eq!(algo.recommend(&metrics, &config).unwrap(), config.base_ttl);
        assert!(algo.learning_snapshot("k").is_none());
        assert_eq!(algo.tracked_keys(), 0);
    }

    #[test]
    fn test_reward_perfect_conditions() {
        let config = TunerConfig::default();
        let mut metrics = snapshot("k", 100, 0.8);
        metrics.average_cost = 0.0;
        metrics.access_frequency_per_hour = 5.0;
        assert!((ReinforcementLearningAlgorithm::reward(&metrics, &config) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_reward_components() {
        let config = TunerConfig::default();
        let mut metrics = snapshot("k", 100, 0.4);
        metrics.average_cost = 10.0;
        metrics.access_frequency_per_hour = 20.0;
        // hit: 1 - 0.4/0.8 = 0.5; cost: 1/2 = 0.5; freq: max(0, 1 - 3) = 0
        let expected = 0.6 * 0.5 + 0.3 * 0.5;
        assert!((ReinforcementLearningAlgorithm::reward(&metrics, &config) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_reward_zero_target() {
        let config = TunerConfig {
            target_hit_rate: 0.0,
            ..TunerConfig::default()
        };
        let metrics = snapshot("k", 100, 0.25);
        assert!(ReinforcementLearningAlgorithm::reward(&metrics, &config).is_finite());
    }

    #[test]
    fn test_exploit_scale() {
        let config = TunerConfig::default();
        let mut metrics = snapshot("k", 100, 0.9);
        metrics.average_cost = 2.0;
        let scale = ReinforcementLearningAlgorithm::exploit_scale(0.7, &metrics, &config);
        assert!((scale - 1.1 * 1.1 * 1.05).abs() < 1e-12);

        metrics.hit_rate = 0.5;
        metrics.average_cost = 0.5;
        let scale = ReinforcementLearningAlgorithm::exploit_scale(0.5, &metrics, &config);
        assert!((scale - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_q_update_and_bookkeeping() {
        let algo = ReinforcementLearningAlgorithm::with_seed(3);
        let config = TunerConfig::default();
        let metrics = snapshot("k", 100, 0.9);
        let reward = ReinforcementLearningAlgorithm::reward(&metrics, &config);

        let ttl = algo.recommend(&metrics, &config).unwrap();
        let state = algo.learning_snapshot("k").unwrap();

        assert!((state.q_value - (0.5 + 0.1 * (reward - 0.5))).abs() < 1e-12);
        assert!((state.last_reward - reward).abs() < 1e-12);
        assert_eq!(state.adjustment_count, 1);
        assert_eq!(state.last_recommendation, ttl);
        assert!((state.exploration_rate - 0.1 * 0.995).abs() < 1e-12);
    }

    #[test]
    fn test_exploration_rate_non_increasing_with_floor() {
        let algo = ReinforcementLearningAlgorithm::with_seed(11);
        let config = TunerConfig::default();
        let metrics = snapshot("k", 100, 0.7);

        let mut previous = DEFAULT_EXPLORATION_RATE;
        for _ in 0..1_000 {
            algo.recommend(&metrics, &config).unwrap();
            let rate = algo.learning_snapshot("k").unwrap().exploration_rate;
            assert!(rate <= previous);
            assert!(rate >= MIN_EXPLORATION_RATE);
            previous = rate;
        }
        assert_eq!(previous, MIN_EXPLORATION_RATE);
        assert_eq!(algo.learning_snapshot("k").unwrap().adjustment_count, 1_000);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let config = TunerConfig::default();
        let metrics = snapshot("k", 100, 0.6);

        let run = |seed| {
            let algo = ReinforcementLearningAlgorithm::with_seed(seed);
            (0..50)
                .map(|_| algo.recommend(&metrics, &config).unwrap())
                .collect::<Vec<_>>()
        };

        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_always_clamped() {
        let algo = ReinforcementLearningAlgorithm::with_seed(5);
        let config = TunerConfig::default();
        for (hit_rate, ttl_secs) in [(0.0, 60), (1.0, 86_400), (0.5, 10), (0.99, 1_000_000)] {
            let mut metrics = snapshot("k", 100, hit_rate);
            metrics.current_ttl = Duration::from_secs(ttl_secs);
            for _ in 0..100 {
                let ttl = algo.recommend(&metrics, &config).unwrap();
                assert!(ttl >= config.min_ttl && ttl <= config.max_ttl);
            }
        }
    }

    #[test]
    fn test_forget_drops_state() {
        let algo = ReinforcementLearningAlgorithm::with_seed(9);
        let config = TunerConfig::default();
        algo.recommend(&snapshot("a", 100, 0.9), &config).unwrap();
        algo.recommend(&snapshot("b", 100, 0.9), &config).unwrap();
        assert_eq!(algo.tracked_keys(), 2);

        algo.forget("a");
        assert!(algo.learning_snapshot("a").is_none());
        assert!(algo.learning_snapshot("b").is_some());
        assert_eq!(algo.tracked_keys(), 1);
    }
}
