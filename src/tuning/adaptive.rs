//! Deterministic adaptive TTL heuristic.
//!
//! `new = current_ttl * hit_factor * frequency_factor * cost_factor`, clamped.

use std::time::Duration;

use super::{clamp_ttl, is_cold, TuningAlgorithm};
use crate::config::TunerConfig;
use crate::error::AlgorithmError;
use crate::metrics::MetricsSnapshot;

/// Accesses per hour above which a key counts as hot.
pub const HOT_FREQUENCY_PER_HOUR: f64 = 10.0;

/// Accesses per hour below which a key counts as cold.
pub const COLD_FREQUENCY_PER_HOUR: f64 = 1.0;

/// Average cost above which longer TTLs pay off.
pub const EXPENSIVE_COST: f64 = 5.0;

/// Average cost below which recomputation is cheap.
pub const CHEAP_COST: f64 = 0.1;

/// Stateless hit-rate/frequency/cost heuristic.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdaptiveAlgorithm;

impl AdaptiveAlgorithm {
    /// Create the algorithm.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Scale proportionally to how far the hit rate is from target.
    #[must_use]
    pub fn hit_rate_factor(hit_rate: f64, config: &TunerConfig) -> f64 {
        let target = config.target_hit_rate;
        if hit_rate > target {
            (hit_rate - target).mul_add(config.ttl_increase_multiplier - 1.0, 1.0)
        } else {
            (target - hit_rate).mul_add(-(1.0 - config.ttl_decrease_multiplier), 1.0)
        }
    }

    /// Hot keys get 10% longer, rarely-read keys 10% shorter.
    #[must_use]
    pub fn frequency_factor(accesses_per_hour: f64) -> f64 {
        if accesses_per_hour > HOT_FREQUENCY_PER_HOUR {
            1.1
        } else if accesses_per_hour < COLD_FREQUENCY_PER_HOUR {
            0.9
        } else {
            1.0
        }
    }

    /// Expensive values live longer, cheap ones shorter. 1.0 when cost awareness is off.
    #[must_use]
    pub fn cost_factor(average_cost: f64, config: &TunerConfig) -> f64 {
        if !config.enable_cost_awareness {
            return 1.0;
        }
        if average_cost > EXPENSIVE_COST {
            config.cost_sensitivity.mul_add(average_cost.ln(), 1.0)
        } else if average_cost < CHEAP_COST {
            config.cost_sensitivity.mul_add(-2.0, 1.0).max(0.5)
        } else {
            1.0
        }
    }
}

impl TuningAlgorithm for AdaptiveAlgorithm {
    fn name(&self) -> &'static str {
        "adaptive"
    }

    fn recommend(
        &self,
        metrics: &MetricsSnapshot,
        config: &TunerConfig,
    ) -> Result<Duration, AlgorithmError> {
        if is_cold(metrics, config) {
            return Ok(config.base_ttl);
        }

        let hit = Self::hit_rate_factor(metrics.hit_rate, config);
        let frequency = Self::frequency_factor(metrics.access_frequency_per_hour);
        let cost = Self::cost_factor(metrics.average_cost, config);

        let proposed = metrics.current_ttl.as_secs_f64() * hit * frequency * cost;

        tracing::trace!(
            key = %metrics.key,
            hit_factor = hit,
            frequency_factor = frequency,
            cost_factor = cost,
            proposed_secs = proposed,
            "Adaptive adjustment"
        );

        clamp_ttl(&metrics.key, proposed, config)
    }
}
